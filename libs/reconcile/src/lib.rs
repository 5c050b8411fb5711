//! Resource reconciliation engine.
//!
//! A reconciliation pass runs an ordered set of independent resources against
//! one cluster object. Key concepts:
//!
//! - **Resource**: a named component that converges one slice of cloud
//!   infrastructure on create passes and tears it down on delete passes.
//! - **Working context**: per-pass scratch space where earlier resources
//!   publish facts (client handles, account IDs) for later ones.
//! - **Cancel-pass**: a NotFound or OperationInProgress error at a
//!   precondition check; the pass stops early and reports success, and the
//!   remaining work resumes on the next scheduled pass.
//!
//! # Invariants
//!
//! - All resource operations are idempotent
//! - Resources in a pass run sequentially in declared order (reverse on delete)
//! - Working contexts never outlive their pass
//! - Control flow depends on error classification, never on messages

pub mod context;
pub mod crud;
pub mod error;
pub mod executor;
pub mod pass;
pub mod resource;
pub mod retry;

pub use context::{ContextKey, WorkingContext};
pub use crud::{CrudAdapter, CrudResource};
pub use error::{BoxError, ErrorKind, ReconcileError, Result, ResultExt};
pub use executor::{PassOutcome, ResourceSet};
pub use pass::{Operation, Pass};
pub use resource::{ClusterObject, PassInit, Resource};
pub use retry::{BackoffPolicy, Retry, RetryTracker};

pub use tokio_util::sync::CancellationToken;
