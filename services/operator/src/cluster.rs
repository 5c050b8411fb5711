//! Tenant cluster object.

use serde::{Deserialize, Serialize};
use stratus_reconcile::{ClusterObject, Operation, ReconcileError, Result};

/// Desired state of a tenant cluster, as handed to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantCluster {
    /// Short cluster identifier, e.g. `c1` or `0tz6i`.
    pub cluster_id: String,

    /// Base domain of the installation, e.g. `example.io`.
    pub base_domain: String,

    /// Principal naming the credential of the tenant account.
    pub credential: String,

    #[serde(default)]
    pub worker_count: u32,

    /// Set once the cluster has been marked for deletion.
    #[serde(default)]
    pub deleting: bool,
}

impl TenantCluster {
    /// Reject objects no resource can work with.
    pub fn validate(&self) -> Result<()> {
        let valid_id = !self.cluster_id.is_empty()
            && self
                .cluster_id
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-');
        if !valid_id {
            return Err(ReconcileError::invalid_config(format!(
                "invalid cluster ID {:?}",
                self.cluster_id
            )));
        }
        if self.base_domain.trim_end_matches('.').is_empty() {
            return Err(ReconcileError::invalid_config(format!(
                "cluster {} has no base domain",
                self.cluster_id
            )));
        }
        if self.credential.is_empty() {
            return Err(ReconcileError::invalid_config(format!(
                "cluster {} has no credential",
                self.cluster_id
            )));
        }
        Ok(())
    }

    /// The pass this object currently needs.
    pub fn operation(&self) -> Operation {
        if self.deleting {
            Operation::Delete
        } else {
            Operation::Create
        }
    }

    /// Shared zone the cluster zone is delegated from: `k8s.<base domain>`.
    pub fn intermediate_zone_name(&self) -> String {
        format!("k8s.{}", self.base_domain.trim_end_matches('.'))
    }

    /// Zone owned by the cluster: `<cluster id>.k8s.<base domain>`.
    pub fn final_zone_name(&self) -> String {
        format!("{}.{}", self.cluster_id, self.intermediate_zone_name())
    }

    /// Host-setup stack in the control-plane account.
    pub fn host_setup_stack_name(&self) -> String {
        format!("cluster-{}-host-setup", self.cluster_id)
    }

    /// Tag key carried by every EBS volume the cluster provisioned.
    pub fn volume_tag_key(&self) -> String {
        format!("kubernetes.io/cluster/{}", self.cluster_id)
    }
}

impl ClusterObject for TenantCluster {
    fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    fn base_domain(&self) -> &str {
        &self.base_domain
    }
}
