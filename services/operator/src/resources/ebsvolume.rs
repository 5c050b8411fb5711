//! Cleanup of EBS volumes left behind by a deleted cluster.
//!
//! Volumes created by the cluster (persistent volumes, etcd data) carry the
//! `kubernetes.io/cluster/<id>` tag. Nothing is created here; on delete,
//! attached volumes are detached and the pass is cancelled until detachment
//! finishes, then the detached volumes are deleted.

use async_trait::async_trait;
use stratus_cloud::{AttachmentState, Volume};
use stratus_reconcile::{CrudResource, Pass, ReconcileError, Result, ResultExt};
use tracing::{debug, info};

use crate::cluster::TenantCluster;
use crate::keys::TENANT_CLIENTS;

pub const NAME: &str = "ebsvolume";

/// What a delete pass has to do with the cluster's volumes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VolumeCleanup {
    /// (volume ID, instance ID) pairs to detach.
    pub detach: Vec<(String, String)>,

    /// Volumes without attachments, ready to delete.
    pub delete: Vec<String>,

    /// Volumes that will still be attached after this pass.
    pub pending: usize,
}

#[derive(Debug, Default)]
pub struct EbsVolume;

impl EbsVolume {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CrudResource<TenantCluster> for EbsVolume {
    type State = Vec<Volume>;
    type Change = VolumeCleanup;

    fn name(&self) -> &str {
        NAME
    }

    async fn current_state(&self, pass: &mut Pass, obj: &TenantCluster) -> Result<Self::State> {
        if !pass.is_delete() {
            return Ok(Vec::new());
        }

        let client = pass.context().require(&TENANT_CLIENTS)?.ec2.clone();
        let tag = obj.volume_tag_key();

        let volumes = pass
            .guard("describe volumes", client.describe_volumes_by_tag(&tag, None))
            .await
            .with_context(|| format!("describing volumes tagged {tag}"))?;

        debug!(cluster_id = %obj.cluster_id, volumes = volumes.len(), "found cluster volumes");
        Ok(volumes)
    }

    async fn desired_state(&self, _pass: &mut Pass, _obj: &TenantCluster) -> Result<Self::State> {
        Ok(Vec::new())
    }

    fn new_create_change(
        &self,
        _obj: &TenantCluster,
        _current: &Self::State,
        _desired: &Self::State,
    ) -> Result<Option<Self::Change>> {
        Ok(None)
    }

    fn new_delete_change(
        &self,
        _obj: &TenantCluster,
        current: &Self::State,
        _desired: &Self::State,
    ) -> Result<Option<Self::Change>> {
        if current.is_empty() {
            return Ok(None);
        }

        let mut cleanup = VolumeCleanup::default();
        for volume in current {
            if !volume.is_attached() {
                cleanup.delete.push(volume.id.clone());
                continue;
            }
            cleanup.pending += 1;
            for attachment in &volume.attachments {
                if attachment.state != AttachmentState::Detaching {
                    cleanup
                        .detach
                        .push((volume.id.clone(), attachment.instance_id.clone()));
                }
            }
        }
        Ok(Some(cleanup))
    }

    async fn apply_create_change(
        &self,
        _pass: &mut Pass,
        _obj: &TenantCluster,
        _change: Self::Change,
    ) -> Result<()> {
        Ok(())
    }

    async fn apply_delete_change(
        &self,
        pass: &mut Pass,
        obj: &TenantCluster,
        change: Self::Change,
    ) -> Result<()> {
        let client = pass.context().require(&TENANT_CLIENTS)?.ec2.clone();

        for (volume_id, instance_id) in &change.detach {
            info!(cluster_id = %obj.cluster_id, %volume_id, %instance_id, "detaching volume");
            match pass
                .guard(
                    "detach volume",
                    client.detach_volume(volume_id, instance_id, false),
                )
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_not_found() => debug!(%volume_id, "volume already detached"),
                Err(e) => return Err(e.context(format!("detaching volume {volume_id}"))),
            }
        }

        for volume_id in &change.delete {
            info!(cluster_id = %obj.cluster_id, %volume_id, "deleting volume");
            match pass
                .guard("delete volume", client.delete_volume(volume_id))
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_not_found() => debug!(%volume_id, "volume already deleted"),
                Err(e) => return Err(e.context(format!("deleting volume {volume_id}"))),
            }
        }

        if change.pending > 0 {
            return Err(ReconcileError::operation_in_progress(format!(
                "waiting for {} volumes to detach",
                change.pending
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use stratus_cloud::{Attachment, MemoryCloud, VolumeState};
    use stratus_reconcile::{CancellationToken, CrudAdapter, Operation, Resource};

    use super::*;

    const TENANT: &str = "222222222222";

    fn cluster() -> TenantCluster {
        TenantCluster {
            cluster_id: "c1".to_string(),
            base_domain: "example.io".to_string(),
            credential: "tenant-a".to_string(),
            worker_count: 1,
            deleting: true,
        }
    }

    fn volume(id: &str, cluster: &str, instance: Option<&str>) -> Volume {
        Volume {
            id: id.to_string(),
            state: if instance.is_some() {
                VolumeState::InUse
            } else {
                VolumeState::Available
            },
            attachments: instance
                .map(|i| Attachment {
                    instance_id: i.to_string(),
                    device: "/dev/xvdf".to_string(),
                    state: AttachmentState::Attached,
                })
                .into_iter()
                .collect(),
            tags: BTreeMap::from([(
                format!("kubernetes.io/cluster/{cluster}"),
                "owned".to_string(),
            )]),
        }
    }

    fn pass(cloud: &MemoryCloud, operation: Operation) -> Pass {
        let mut pass = Pass::new(operation, CancellationToken::new());
        pass.context_mut()
            .set("awsclient", &TENANT_CLIENTS, cloud.account(TENANT).into_clients())
            .unwrap();
        pass
    }

    #[tokio::test]
    async fn test_create_makes_no_calls() {
        let cloud = MemoryCloud::new("000000000001");
        let mut create = pass(&cloud, Operation::Create);

        CrudAdapter::new(EbsVolume::new())
            .ensure_created(&mut create, &cluster())
            .await
            .unwrap();
        assert!(cloud.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_waits_for_detachment() {
        let cloud = MemoryCloud::new("000000000001");
        cloud.put_volume(TENANT, volume("vol-1", "c1", Some("i-1")));
        cloud.put_volume(TENANT, volume("vol-2", "c1", None));
        cloud.put_volume(TENANT, volume("vol-3", "other", None));
        let resource = CrudAdapter::new(EbsVolume::new());

        let mut first = pass(&cloud, Operation::Delete);
        let err = resource
            .ensure_deleted(&mut first, &cluster())
            .await
            .unwrap_err();
        assert!(err.is_operation_in_progress());
        assert!(cloud.volume(TENANT, "vol-2").is_none());
        assert!(cloud.volume(TENANT, "vol-1").is_some());
        assert!(cloud.volume(TENANT, "vol-3").is_some());

        cloud.settle();

        let mut second = pass(&cloud, Operation::Delete);
        resource.ensure_deleted(&mut second, &cluster()).await.unwrap();
        assert!(cloud.volume(TENANT, "vol-1").is_none());
        assert!(cloud.volume(TENANT, "vol-3").is_some());

        cloud.clear_calls();
        let mut third = pass(&cloud, Operation::Delete);
        resource.ensure_deleted(&mut third, &cluster()).await.unwrap();
        assert!(cloud.mutations().is_empty());
    }

    #[test]
    fn test_detaching_volume_is_not_detached_again() {
        let mut detaching = volume("vol-1", "c1", Some("i-1"));
        detaching.attachments[0].state = AttachmentState::Detaching;

        let change = EbsVolume::new()
            .new_delete_change(&cluster(), &vec![detaching], &Vec::new())
            .unwrap()
            .unwrap();
        assert!(change.detach.is_empty());
        assert_eq!(change.pending, 1);
    }
}
