//! CloudFormation capability: stack lifecycle.

use std::collections::BTreeMap;

use async_trait::async_trait;
use stratus_reconcile::{ReconcileError, Result};

/// Lifecycle status of a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackStatus {
    CreateInProgress,
    CreateComplete,
    CreateFailed,
    UpdateInProgress,
    UpdateComplete,
    RollbackComplete,
    DeleteInProgress,
    DeleteFailed,
}

impl StackStatus {
    pub fn is_delete_in_progress(self) -> bool {
        self == Self::DeleteInProgress
    }

    pub fn is_in_progress(self) -> bool {
        matches!(
            self,
            Self::CreateInProgress | Self::UpdateInProgress | Self::DeleteInProgress
        )
    }
}

/// A stack as described by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stack {
    pub name: String,
    pub status: StackStatus,
    pub termination_protection: bool,
    pub outputs: BTreeMap<String, String>,
}

/// Parameters for stack creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateStackInput {
    pub name: String,
    pub template_body: String,
    pub enable_termination_protection: bool,
    pub tags: BTreeMap<String, String>,
}

/// Stack operations.
///
/// Error contract:
/// - `describe_stack` on a missing stack: NotFound.
/// - `create_stack` on an existing stack: AlreadyExists.
/// - `update_termination_protection` on a missing stack: NotFound; on a
///   stack being deleted: OperationInProgress. Disabling protection that is
///   already disabled succeeds.
/// - `delete_stack` on a stack already being deleted succeeds.
#[async_trait]
pub trait CloudFormation: Send + Sync {
    async fn describe_stack(&self, name: &str) -> Result<Stack>;

    async fn create_stack(&self, input: CreateStackInput) -> Result<()>;

    async fn update_termination_protection(&self, name: &str, enabled: bool) -> Result<()>;

    async fn delete_stack(&self, name: &str) -> Result<()>;
}

/// Map a CloudFormation error code and message to the reconciliation taxonomy.
///
/// CloudFormation reports most conditions as `ValidationError` and only the
/// message tells them apart.
pub fn classify_error(code: &str, message: &str) -> ReconcileError {
    let detail = format!("{code}: {message}");
    match code {
        "AlreadyExistsException" => ReconcileError::already_exists(detail),
        "ValidationError" if message.contains("does not exist") => {
            ReconcileError::not_found(detail)
        }
        "ValidationError" if message.contains("DELETE_IN_PROGRESS") => {
            ReconcileError::operation_in_progress(detail)
        }
        "Throttling" | "RequestTimeout" | "ServiceUnavailable" => {
            ReconcileError::transport(detail)
        }
        _ => ReconcileError::execution(detail),
    }
}
