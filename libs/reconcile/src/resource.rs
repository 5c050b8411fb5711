//! The resource contract.

use async_trait::async_trait;

use crate::error::Result;
use crate::pass::Pass;

/// Read access to the cluster object being reconciled.
///
/// Resources only read the object; it is owned by the outer runtime and is
/// immutable for the duration of a pass.
pub trait ClusterObject: Send + Sync {
    /// Stable cluster identifier.
    fn cluster_id(&self) -> &str;

    /// Base DNS domain of the installation the cluster belongs to.
    fn base_domain(&self) -> &str;
}

/// A unit of reconciliation.
///
/// Both operations are idempotent: running either any number of times against
/// the same desired state yields the same live state, and "already converged"
/// is detected and treated as success. Implementations are constructed once
/// and shared across all passes and objects, so they must not keep per-object
/// mutable state; anything discovered during a pass goes into the pass's
/// working context.
///
/// A cancel-pass error (NotFound or OperationInProgress) returned from either
/// operation tells the executor that a precondition is not met yet.
#[async_trait]
pub trait Resource<O: ClusterObject>: Send + Sync {
    /// Stable, non-empty name used in logs.
    fn name(&self) -> &str;

    /// Converge the live system toward the object's desired state.
    async fn ensure_created(&self, pass: &mut Pass, obj: &O) -> Result<()>;

    /// Remove whatever this resource owns for the object.
    async fn ensure_deleted(&self, pass: &mut Pass, obj: &O) -> Result<()>;
}

/// Per-pass setup that runs before any resource, on create and delete alike.
///
/// Used to publish facts every resource needs (e.g. account-scoped clients)
/// into the working context regardless of pass direction.
#[async_trait]
pub trait PassInit<O: ClusterObject>: Send + Sync {
    fn name(&self) -> &str;

    async fn init(&self, pass: &mut Pass, obj: &O) -> Result<()>;
}
