//! Account resolution.
//!
//! Resolves the cluster's tenant credential to a role, builds clients for the
//! tenant and control-plane accounts and publishes them for the resources
//! that follow.

use std::sync::Arc;

use async_trait::async_trait;
use stratus_cloud::{ClientFactory, CredentialResolver};
use stratus_reconcile::{Pass, PassInit, Result, ResultExt};
use tracing::debug;

use crate::cluster::TenantCluster;
use crate::keys::{CONTROL_PLANE_CLIENTS, TENANT_ACCOUNT_ID, TENANT_CLIENTS};

pub const NAME: &str = "awsclient";

pub struct AwsClientInit {
    resolver: Arc<dyn CredentialResolver>,
    factory: Arc<dyn ClientFactory>,
}

impl AwsClientInit {
    pub fn new(resolver: Arc<dyn CredentialResolver>, factory: Arc<dyn ClientFactory>) -> Self {
        Self { resolver, factory }
    }
}

#[async_trait]
impl PassInit<TenantCluster> for AwsClientInit {
    fn name(&self) -> &str {
        NAME
    }

    async fn init(&self, pass: &mut Pass, obj: &TenantCluster) -> Result<()> {
        let role = pass
            .guard("resolve tenant credential", self.resolver.resolve(&obj.credential))
            .await
            .with_context(|| format!("resolving credential {:?}", obj.credential))?;

        let tenant = self.factory.for_role(&role)?;
        let control_plane = self.factory.control_plane()?;

        debug!(
            cluster_id = %obj.cluster_id,
            tenant_account = role.account_id(),
            control_plane_account = %control_plane.account_id,
            "resolved accounts"
        );

        let ctx = pass.context_mut();
        ctx.set(NAME, &TENANT_ACCOUNT_ID, role.account_id().to_string())?;
        ctx.set(NAME, &TENANT_CLIENTS, tenant)?;
        ctx.set(NAME, &CONTROL_PLANE_CLIENTS, control_plane)?;
        Ok(())
    }
}
