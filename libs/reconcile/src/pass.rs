//! A single reconciliation pass over one cluster object.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::context::WorkingContext;
use crate::error::{ReconcileError, Result};

/// Direction of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Converge toward the object's desired state.
    Create,
    /// Tear down everything the object owns.
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => f.write_str("create"),
            Self::Delete => f.write_str("delete"),
        }
    }
}

/// State owned by one pass: the working context plus cancellation.
///
/// Resources receive the pass by mutable reference and run strictly one at a
/// time, so the context needs no locking.
pub struct Pass {
    operation: Operation,
    context: WorkingContext,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl Pass {
    /// Start a pass with an empty working context.
    pub fn new(operation: Operation, cancel: CancellationToken) -> Self {
        Self {
            operation,
            context: WorkingContext::new(),
            cancel,
            deadline: None,
        }
    }

    /// Bound the pass by an absolute deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Bound the pass by a timeout starting now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn is_delete(&self) -> bool {
        self.operation == Operation::Delete
    }

    pub fn context(&self) -> &WorkingContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut WorkingContext {
        &mut self.context
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns true if the pass was cancelled or its deadline has passed.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fail fast if the pass is already cancelled.
    pub fn check(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ReconcileError::cancelled("pass cancelled"));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(ReconcileError::cancelled("pass deadline exceeded"));
        }
        Ok(())
    }

    /// Run a cloud call, abandoning it if the pass is cancelled or times out.
    ///
    /// The call future is dropped on cancellation, which aborts any request
    /// still in flight.
    pub async fn guard<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let deadline = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;

            _ = self.cancel.cancelled() => {
                Err(ReconcileError::cancelled(format!("{operation}: pass cancelled")))
            }
            _ = deadline => {
                Err(ReconcileError::cancelled(format!("{operation}: pass deadline exceeded")))
            }
            result = call => result,
        }
    }
}

impl fmt::Debug for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pass")
            .field("operation", &self.operation)
            .field("context", &self.context)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("deadline", &self.deadline)
            .finish()
    }
}
