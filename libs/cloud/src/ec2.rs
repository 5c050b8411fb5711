//! EC2 capability: EBS volumes.

use std::collections::BTreeMap;

use async_trait::async_trait;
use stratus_reconcile::{ReconcileError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeState {
    Creating,
    Available,
    InUse,
    Deleting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentState {
    Attaching,
    Attached,
    Detaching,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub instance_id: String,
    pub device: String,
    pub state: AttachmentState,
}

/// An EBS volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub id: String,
    pub state: VolumeState,
    pub attachments: Vec<Attachment>,
    pub tags: BTreeMap<String, String>,
}

impl Volume {
    /// Returns true if any attachment has not finished detaching.
    pub fn is_attached(&self) -> bool {
        !self.attachments.is_empty()
    }
}

/// Volume operations.
///
/// Error contract: operations on an unknown volume return NotFound; deleting
/// a volume that is still attached returns OperationInProgress.
#[async_trait]
pub trait Ec2: Send + Sync {
    /// Volumes carrying tag `key`, optionally with the exact `value`.
    async fn describe_volumes_by_tag(&self, key: &str, value: Option<&str>) -> Result<Vec<Volume>>;

    async fn detach_volume(&self, volume_id: &str, instance_id: &str, force: bool) -> Result<()>;

    async fn delete_volume(&self, volume_id: &str) -> Result<()>;
}

/// Map an EC2 error code to the reconciliation taxonomy.
pub fn classify_error(code: &str, message: &str) -> ReconcileError {
    let detail = format!("{code}: {message}");
    match code {
        "InvalidVolume.NotFound" | "InvalidAttachment.NotFound" => {
            ReconcileError::not_found(detail)
        }
        "VolumeInUse" | "IncorrectState" => ReconcileError::operation_in_progress(detail),
        "RequestLimitExceeded" | "ServiceUnavailable" | "Unavailable" => {
            ReconcileError::transport(detail)
        }
        _ => ReconcileError::execution(detail),
    }
}
