//! Current-state/desired-state resources.
//!
//! A [`CrudResource`] splits convergence into read, diff and apply:
//!
//! 1. read the current state of the cloud object,
//! 2. compute the desired state for the cluster object,
//! 3. diff them into a change (`None` when nothing needs doing),
//! 4. apply the change.
//!
//! Diffing is synchronous and takes no pass, so it cannot reach the network.
//! [`CrudAdapter`] turns a `CrudResource` into a plain [`Resource`] and only
//! calls an apply method when the diff produced a change.

use std::fmt::Debug;

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::pass::Pass;
use crate::resource::{ClusterObject, Resource};

/// A resource expressed as read/diff/apply.
#[async_trait]
pub trait CrudResource<O: ClusterObject>: Send + Sync {
    /// Snapshot of the dimensions this resource manages.
    type State: Debug + Send + Sync;

    /// Minimal action moving current state toward desired state.
    type Change: Debug + Send + Sync;

    /// Stable, non-empty name used in logs.
    fn name(&self) -> &str;

    /// Read the live state. Consult `pass.operation()` when create and
    /// delete need different reads.
    async fn current_state(&self, pass: &mut Pass, obj: &O) -> Result<Self::State>;

    /// Compute the state the live system should be in for this pass.
    async fn desired_state(&self, pass: &mut Pass, obj: &O) -> Result<Self::State>;

    /// Diff for create passes. `None` means current already matches desired.
    fn new_create_change(
        &self,
        obj: &O,
        current: &Self::State,
        desired: &Self::State,
    ) -> Result<Option<Self::Change>>;

    /// Diff for in-place updates on create passes.
    fn new_update_change(
        &self,
        _obj: &O,
        _current: &Self::State,
        _desired: &Self::State,
    ) -> Result<Option<Self::Change>> {
        Ok(None)
    }

    /// Diff for delete passes. `None` means there is nothing left to remove.
    fn new_delete_change(
        &self,
        obj: &O,
        current: &Self::State,
        desired: &Self::State,
    ) -> Result<Option<Self::Change>>;

    async fn apply_create_change(&self, pass: &mut Pass, obj: &O, change: Self::Change)
        -> Result<()>;

    async fn apply_update_change(
        &self,
        _pass: &mut Pass,
        _obj: &O,
        _change: Self::Change,
    ) -> Result<()> {
        Ok(())
    }

    async fn apply_delete_change(&self, pass: &mut Pass, obj: &O, change: Self::Change)
        -> Result<()>;
}

/// Runs a [`CrudResource`] through the [`Resource`] contract.
pub struct CrudAdapter<R> {
    inner: R,
}

impl<R> CrudAdapter<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }
}

#[async_trait]
impl<O, R> Resource<O> for CrudAdapter<R>
where
    O: ClusterObject,
    R: CrudResource<O>,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn ensure_created(&self, pass: &mut Pass, obj: &O) -> Result<()> {
        let name = self.inner.name();

        let current = self.inner.current_state(pass, obj).await?;
        let desired = self.inner.desired_state(pass, obj).await?;
        debug!(resource = name, ?current, ?desired, "computed states");

        let create = self.inner.new_create_change(obj, &current, &desired)?;
        let update = self.inner.new_update_change(obj, &current, &desired)?;

        match create {
            Some(change) => {
                debug!(resource = name, ?change, "applying create change");
                self.inner.apply_create_change(pass, obj, change).await?;
            }
            None => debug!(resource = name, "no create change"),
        }

        match update {
            Some(change) => {
                debug!(resource = name, ?change, "applying update change");
                self.inner.apply_update_change(pass, obj, change).await?;
            }
            None => debug!(resource = name, "no update change"),
        }

        Ok(())
    }

    async fn ensure_deleted(&self, pass: &mut Pass, obj: &O) -> Result<()> {
        let name = self.inner.name();

        let current = self.inner.current_state(pass, obj).await?;
        let desired = self.inner.desired_state(pass, obj).await?;
        debug!(resource = name, ?current, ?desired, "computed states");

        match self.inner.new_delete_change(obj, &current, &desired)? {
            Some(change) => {
                debug!(resource = name, ?change, "applying delete change");
                self.inner.apply_delete_change(pass, obj, change).await
            }
            None => {
                debug!(resource = name, "no delete change");
                Ok(())
            }
        }
    }
}
