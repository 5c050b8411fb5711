//! Ordered execution of a resource set for one pass.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{ReconcileError, Result};
use crate::pass::{Operation, Pass};
use crate::resource::{ClusterObject, PassInit, Resource};

/// How a pass that did not fail ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Every resource ran.
    Completed,

    /// A resource reported an unmet precondition; the remaining resources
    /// were skipped and will run on the next pass.
    Canceled { resource: String },
}

impl PassOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// An ordered list of resources reconciled against one cluster object at a
/// time.
///
/// Create passes run resources in declared order; delete passes run them in
/// reverse so dependents are removed before what they depend on. Resources
/// within a pass always run sequentially. An optional [`PassInit`] runs
/// before the first resource in both directions.
pub struct ResourceSet<O: ClusterObject> {
    init: Option<Arc<dyn PassInit<O>>>,
    resources: Vec<Arc<dyn Resource<O>>>,
}

impl<O: ClusterObject> ResourceSet<O> {
    /// Build a set, rejecting empty or duplicate resource names.
    pub fn new(resources: Vec<Arc<dyn Resource<O>>>) -> Result<Self> {
        let mut seen = HashSet::new();
        for resource in &resources {
            let name = resource.name();
            if name.is_empty() {
                return Err(ReconcileError::invalid_config(
                    "resource name must not be empty",
                ));
            }
            if !seen.insert(name.to_string()) {
                return Err(ReconcileError::invalid_config(format!(
                    "duplicate resource name {name:?}"
                )));
            }
        }

        Ok(Self {
            init: None,
            resources,
        })
    }

    /// Run `init` at the start of every pass.
    pub fn with_init(mut self, init: Arc<dyn PassInit<O>>) -> Self {
        self.init = Some(init);
        self
    }

    /// Resource names in declared order.
    pub fn names(&self) -> Vec<&str> {
        self.resources.iter().map(|r| r.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Run a create pass with a fresh working context, bounded by `timeout`
    /// when one is given.
    pub async fn ensure_created(
        &self,
        obj: &O,
        cancel: CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<PassOutcome> {
        let mut pass = start(Operation::Create, cancel, timeout);
        self.run(&mut pass, obj).await
    }

    /// Run a delete pass with a fresh working context, bounded by `timeout`
    /// when one is given.
    pub async fn ensure_deleted(
        &self,
        obj: &O,
        cancel: CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<PassOutcome> {
        let mut pass = start(Operation::Delete, cancel, timeout);
        self.run(&mut pass, obj).await
    }

    /// Run every resource for the pass's operation.
    ///
    /// Stops at the first error. Cancel-pass errors end the pass as
    /// [`PassOutcome::Canceled`]; any other error is returned with the
    /// failing resource added as context.
    #[instrument(
        name = "reconcile_pass",
        skip_all,
        fields(cluster_id = %obj.cluster_id(), operation = %pass.operation())
    )]
    pub async fn run(&self, pass: &mut Pass, obj: &O) -> Result<PassOutcome> {
        let operation = pass.operation();
        let ordered: Vec<&Arc<dyn Resource<O>>> = match operation {
            Operation::Create => self.resources.iter().collect(),
            Operation::Delete => self.resources.iter().rev().collect(),
        };

        debug!(resources = ordered.len(), "starting pass");

        if let Some(init) = &self.init {
            let name = init.name();
            pass.check()?;

            match init.init(pass, obj).await {
                Ok(()) => debug!(init = name, "initialized pass"),
                Err(e) if e.is_cancel_pass() => {
                    info!(resource = name, reason = %e, "canceling reconciliation pass");
                    return Ok(PassOutcome::Canceled {
                        resource: name.to_string(),
                    });
                }
                Err(e) => {
                    warn!(init = name, error = %e, "pass init failed");
                    return Err(e.context(format!("{operation} {name}")));
                }
            }
        }

        for resource in ordered {
            let name = resource.name();
            pass.check()?;

            debug!(resource = name, "reconciling resource");
            let result = match operation {
                Operation::Create => resource.ensure_created(pass, obj).await,
                Operation::Delete => resource.ensure_deleted(pass, obj).await,
            };

            match result {
                Ok(()) => debug!(resource = name, "reconciled resource"),
                Err(e) if e.is_cancel_pass() => {
                    info!(
                        resource = name,
                        reason = %e,
                        "canceling reconciliation pass"
                    );
                    return Ok(PassOutcome::Canceled {
                        resource: name.to_string(),
                    });
                }
                Err(e) => {
                    warn!(resource = name, error = %e, "resource failed");
                    return Err(e.context(format!("{operation} {name}")));
                }
            }
        }

        debug!("pass completed");
        Ok(PassOutcome::Completed)
    }
}

fn start(operation: Operation, cancel: CancellationToken, timeout: Option<Duration>) -> Pass {
    let pass = Pass::new(operation, cancel);
    match timeout {
        Some(timeout) => pass.with_timeout(timeout),
        None => pass,
    }
}

impl<O: ClusterObject> std::fmt::Debug for ResourceSet<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.resources.iter().map(|r| r.name()).collect();
        f.debug_struct("ResourceSet")
            .field("init", &self.init.as_ref().map(|i| i.name()))
            .field("resources", &names)
            .finish()
    }
}
