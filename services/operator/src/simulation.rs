//! Local simulation against the in-memory cloud.
//!
//! A fixture file lists tenant clusters and the credentials they reference.
//! Seeding creates every zone the clusters expect, so the operator converges
//! them without a real provider.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use stratus_cloud::{MemoryCloud, RoleArn};
use tracing::info;

use crate::cluster::TenantCluster;
use crate::config::Config;

/// Contents of `clusters_file`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    /// Principal -> role.
    #[serde(default)]
    pub credentials: BTreeMap<String, RoleArn>,

    #[serde(default)]
    pub clusters: Vec<TenantCluster>,
}

impl Fixture {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Build an in-memory cloud holding the fixture's accounts and zones.
    pub fn seed(&self, config: &Config) -> anyhow::Result<MemoryCloud> {
        let cloud = MemoryCloud::new(config.installation.control_plane_account_id.clone());

        for (principal, role) in &self.credentials {
            cloud.add_principal(principal.clone(), role.clone());
        }

        let principal = &config.installation.default_tenant_principal;
        let default_role = self.credentials.get(principal).ok_or_else(|| {
            anyhow::anyhow!("default tenant principal {principal:?} has no credential in the fixture")
        })?;
        cloud.set_default_tenant_role(default_role.clone());

        let mut intermediate = BTreeSet::new();
        for cluster in &self.clusters {
            if intermediate.insert(cluster.intermediate_zone_name()) {
                cloud.create_hosted_zone(
                    default_role.account_id(),
                    &cluster.intermediate_zone_name(),
                    name_servers("intermediate"),
                );
            }

            let Some(role) = self.credentials.get(&cluster.credential) else {
                continue;
            };
            cloud.create_hosted_zone(
                role.account_id(),
                &cluster.final_zone_name(),
                name_servers(&cluster.cluster_id),
            );
        }

        info!(
            clusters = self.clusters.len(),
            intermediate_zones = intermediate.len(),
            "[SIMULATION] Seeded in-memory cloud"
        );
        Ok(cloud)
    }
}

fn name_servers(label: &str) -> Vec<String> {
    (1..=2)
        .map(|i| format!("ns-{i}.{label}.awsdns.test"))
        .collect()
}
