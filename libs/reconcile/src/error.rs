//! Error taxonomy for reconciliation.
//!
//! Every error a resource returns is classified into one of a small, closed
//! set of kinds. The executor and the resources decide control flow only via
//! the classification predicates, never by matching on messages, so errors can
//! be wrapped with context at any boundary without changing behavior.

use std::fmt;

use thiserror::Error;

/// Boxed underlying cause carried by a classified error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for reconciliation operations.
pub type Result<T, E = ReconcileError> = std::result::Result<T, E>;

/// Classification of a [`ReconcileError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The object a step depends on does not exist.
    NotFound,
    /// The object a step wants to create already exists.
    AlreadyExists,
    /// The cloud provider is still working on the object.
    OperationInProgress,
    /// A step failed in a way that should be retried on the next pass.
    Execution,
    /// A resource was constructed with invalid configuration.
    InvalidConfig,
    /// An underlying client or transport failure.
    Transport,
    /// The pass was cancelled or ran past its deadline.
    Cancelled,
}

impl ErrorKind {
    /// Kinds that end a pass early without marking it failed.
    pub fn is_cancel_pass(self) -> bool {
        matches!(self, Self::NotFound | Self::OperationInProgress)
    }

    /// Kinds that are surfaced as failures and retried by the outer runtime.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Execution | Self::Transport)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not found",
            Self::AlreadyExists => "already exists",
            Self::OperationInProgress => "operation in progress",
            Self::Execution => "execution",
            Self::InvalidConfig => "invalid config",
            Self::Transport => "transport",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Something a step depends on does not exist.
    #[error("not found: {message}")]
    NotFound {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Something a step wants to create already exists.
    #[error("already exists: {message}")]
    AlreadyExists {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The provider is still processing a previous request for the object.
    #[error("operation in progress: {message}")]
    OperationInProgress {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Execution failure.
    #[error("execution error: {message}")]
    Execution {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Invalid configuration, raised at construction time.
    #[error("invalid config: {message}")]
    InvalidConfig {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Underlying client or transport failure.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The pass was cancelled or its deadline expired.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Another error with added context. Classification is that of `source`.
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<ReconcileError>,
    },
}

impl ReconcileError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            source: None,
        }
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::AlreadyExists {
            message: message.into(),
            source: None,
        }
    }

    pub fn operation_in_progress(message: impl Into<String>) -> Self {
        Self::OperationInProgress {
            message: message.into(),
            source: None,
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
            source: None,
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
            source: None,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled(message.into())
    }

    /// Attach an underlying cause without changing the classification.
    ///
    /// `Cancelled` carries no cause; for `Context` the cause is attached to
    /// the innermost classified error.
    pub fn with_source(self, cause: impl Into<BoxError>) -> Self {
        let cause = cause.into();
        match self {
            Self::NotFound { message, .. } => Self::NotFound {
                message,
                source: Some(cause),
            },
            Self::AlreadyExists { message, .. } => Self::AlreadyExists {
                message,
                source: Some(cause),
            },
            Self::OperationInProgress { message, .. } => Self::OperationInProgress {
                message,
                source: Some(cause),
            },
            Self::Execution { message, .. } => Self::Execution {
                message,
                source: Some(cause),
            },
            Self::InvalidConfig { message, .. } => Self::InvalidConfig {
                message,
                source: Some(cause),
            },
            Self::Transport { message, .. } => Self::Transport {
                message,
                source: Some(cause),
            },
            Self::Cancelled(message) => Self::Cancelled(message),
            Self::Context { context, source } => Self::Context {
                context,
                source: Box::new(source.with_source(cause)),
            },
        }
    }

    /// Wrap this error with context describing the failed operation.
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Classification of this error, looking through any context layers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::OperationInProgress { .. } => ErrorKind::OperationInProgress,
            Self::Execution { .. } => ErrorKind::Execution,
            Self::InvalidConfig { .. } => ErrorKind::InvalidConfig,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Context { source, .. } => source.kind(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_already_exists(&self) -> bool {
        self.kind() == ErrorKind::AlreadyExists
    }

    pub fn is_operation_in_progress(&self) -> bool {
        self.kind() == ErrorKind::OperationInProgress
    }

    pub fn is_execution(&self) -> bool {
        self.kind() == ErrorKind::Execution
    }

    pub fn is_invalid_config(&self) -> bool {
        self.kind() == ErrorKind::InvalidConfig
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }

    /// Returns true if this error should end the pass early as a success.
    pub fn is_cancel_pass(&self) -> bool {
        self.kind().is_cancel_pass()
    }

    /// Returns true if this error should be retried by the outer runtime.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Reclassify a precondition error at a point where the object must exist.
    ///
    /// NotFound and OperationInProgress become Execution errors so they fail
    /// the pass instead of cancelling it; other kinds pass through unchanged.
    pub fn into_execution(self) -> Self {
        if self.is_cancel_pass() {
            let message = self.to_string();
            Self::execution(message).with_source(self)
        } else {
            self
        }
    }
}

/// Extension for adding context to reconciliation results.
pub trait ResultExt<T> {
    /// Wrap the error, if any, with a static context message.
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Wrap the error, if any, with a lazily built context message.
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(context))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|e| e.context(f()))
    }
}
