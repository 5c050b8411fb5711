//! Resources reconciled for every tenant cluster.
//!
//! Create passes run `cpi`, `bridgezone`, `ebsvolume` in that order; delete
//! passes run them in reverse. `cpi` is torn down last: once its stack is
//! deleting or gone every later delete pass stops there, so nothing may come
//! after it. `awsclient` runs before all of them in both directions.

pub mod awsclient;
pub mod bridgezone;
pub mod cpi;
pub mod ebsvolume;

use std::sync::Arc;

use stratus_cloud::{ClientFactory, CredentialResolver};
use stratus_reconcile::{CrudAdapter, Resource, ResourceSet, Result};

use crate::cluster::TenantCluster;
use crate::config::Config;

pub use awsclient::AwsClientInit;
pub use bridgezone::{BridgeZone, BridgeZoneConfig};
pub use cpi::HostSetupStack;
pub use ebsvolume::EbsVolume;

/// Assemble the resource set from configuration and cloud collaborators.
pub fn default_set(
    config: &Config,
    resolver: Arc<dyn CredentialResolver>,
    factory: Arc<dyn ClientFactory>,
) -> Result<ResourceSet<TenantCluster>> {
    let bridgezone = BridgeZone::new(
        BridgeZoneConfig {
            route53_enabled: config.route53_enabled,
            delegation_ttl: config.delegation_ttl_secs,
        },
        Arc::clone(&resolver),
        Arc::clone(&factory),
    )?;

    let resources: Vec<Arc<dyn Resource<TenantCluster>>> = vec![
        Arc::new(HostSetupStack::new()),
        Arc::new(CrudAdapter::new(bridgezone)),
        Arc::new(CrudAdapter::new(EbsVolume::new())),
    ];

    Ok(ResourceSet::new(resources)?.with_init(Arc::new(AwsClientInit::new(resolver, factory))))
}
