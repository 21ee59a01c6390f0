//! Unified error handling for ModelGate
//!
//! This module provides a centralized error type that consolidates the
//! domain-specific errors raised by the registry, scheduler, dispatch pool,
//! and HTTP layer. Errors carry a category that drives handling decisions:
//! - User errors (bad requests, actionable by callers)
//! - NotFound errors (unknown models, versions, request ids)
//! - Recoverable errors (capacity limits, deadline misses; retry later)
//! - Backend errors (model backend failures)
//! - Model errors (repository/configuration problems)
//! - Internal errors (bugs, system failures)

use std::fmt;

use crate::dispatch::BackendError;
use crate::registry::RegistryError;
use crate::scheduler::SchedulerError;

/// Unified error type for ModelGate
///
/// Consolidates the module-level errors into a single type that the HTTP
/// layer can map onto status codes via [`ModelGateError::category`].
#[derive(Debug, thiserror::Error)]
pub enum ModelGateError {
    // ========== Registry Errors ==========
    /// Requested model is not known to the registry
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Requested model version is not known
    #[error("Version {version} of model {model} not found")]
    VersionNotFound { model: String, version: u64 },

    /// Model version exists but is not ready to serve
    #[error("Model {model} version {version} is not ready")]
    ModelNotReady { model: String, version: u64 },

    /// Input or output tensors do not match the declared schema
    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    /// Malformed model configuration
    #[error("Invalid model configuration: {0}")]
    InvalidModelConfig(String),

    // ========== Scheduler Errors ==========
    /// Request id is not tracked by the scheduler
    #[error("Request not found: {0}")]
    RequestNotFound(u32),

    /// Pending queue for the target model is full
    #[error("Queue capacity exceeded for model {0}")]
    QueueCapacityExceeded(String),

    /// Request state machine violation
    #[error("Invalid request state transition")]
    InvalidStateTransition,

    // ========== Dispatch/Backend Errors ==========
    /// Backend temporarily unavailable
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Backend execution failed
    #[error("Backend execution failed: {0}")]
    BackendFailed(String),

    /// Backend produced outputs that fail registry validation
    #[error("Output validation failed: {0}")]
    OutputValidationFailed(String),

    // ========== Gateway/HTTP Errors ==========
    /// Invalid client request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Request did not finish within the caller's deadline
    #[error("Request {0} did not complete before the deadline")]
    DeadlineExceeded(u32),

    /// Gateway is not accepting requests
    #[error("Gateway is not running")]
    GatewayNotRunning,

    // ========== I/O and Internal Errors ==========
    /// File I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Internal error (indicates a bug)
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ModelGateError {
    /// Categorize the error for handling decisions
    pub fn category(&self) -> ErrorCategory {
        match self {
            // User errors - actionable by callers
            ModelGateError::InvalidRequest(_) | ModelGateError::SchemaViolation(_) => {
                ErrorCategory::User
            }

            // NotFound - unknown names and ids
            ModelGateError::ModelNotFound(_)
            | ModelGateError::VersionNotFound { .. }
            | ModelGateError::RequestNotFound(_) => ErrorCategory::NotFound,

            // Recoverable - temporary conditions, retry later
            ModelGateError::QueueCapacityExceeded(_)
            | ModelGateError::ModelNotReady { .. }
            | ModelGateError::DeadlineExceeded(_)
            | ModelGateError::GatewayNotRunning => ErrorCategory::Recoverable,

            // Backend - model backend failures
            ModelGateError::BackendUnavailable(_)
            | ModelGateError::BackendFailed(_)
            | ModelGateError::OutputValidationFailed(_) => ErrorCategory::Backend,

            // Model - repository and configuration problems
            ModelGateError::InvalidModelConfig(_) | ModelGateError::IoError(_) => {
                ErrorCategory::Model
            }

            // Internal - bugs
            ModelGateError::InvalidStateTransition | ModelGateError::InternalError(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// Check if this error is recoverable (temporary condition)
    ///
    /// The caller may retry the operation after waiting.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Recoverable | ErrorCategory::Backend
        )
    }

    /// Check if this is a user-facing error (actionable by callers)
    pub fn is_user_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::User)
    }
}

/// Error category for handling decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// User error - invalid input
    User,
    /// Unknown model, version, or request id
    NotFound,
    /// Recoverable error - temporary condition
    Recoverable,
    /// Backend error - model backend failure
    Backend,
    /// Model error - repository or configuration issue
    Model,
    /// Internal error - indicates a bug
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::User => write!(f, "User"),
            ErrorCategory::NotFound => write!(f, "NotFound"),
            ErrorCategory::Recoverable => write!(f, "Recoverable"),
            ErrorCategory::Backend => write!(f, "Backend"),
            ErrorCategory::Model => write!(f, "Model"),
            ErrorCategory::Internal => write!(f, "Internal"),
        }
    }
}

/// Result type alias for gateway operations
pub type GateResult<T> = Result<T, ModelGateError>;

// ========== Conversions from module-level error types ==========

impl From<RegistryError> for ModelGateError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::ModelNotFound(name) => ModelGateError::ModelNotFound(name),
            RegistryError::VersionNotFound { model, version } => {
                ModelGateError::VersionNotFound { model, version }
            }
            RegistryError::ModelNotReady { model, version } => {
                ModelGateError::ModelNotReady { model, version }
            }
            RegistryError::MissingInput { .. }
            | RegistryError::UnknownTensor { .. }
            | RegistryError::DtypeMismatch { .. }
            | RegistryError::ShapeMismatch { .. }
            | RegistryError::ElementCountMismatch { .. } => {
                ModelGateError::SchemaViolation(err.to_string())
            }
            RegistryError::InvalidConfig(msg) => ModelGateError::InvalidModelConfig(msg),
        }
    }
}

impl From<SchedulerError> for ModelGateError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::RequestNotFound(id) => ModelGateError::RequestNotFound(id),
            SchedulerError::QueueCapacityExceeded { model } => {
                ModelGateError::QueueCapacityExceeded(model)
            }
            SchedulerError::InvalidStateTransition => ModelGateError::InvalidStateTransition,
        }
    }
}

impl From<BackendError> for ModelGateError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unavailable(msg) => ModelGateError::BackendUnavailable(msg),
            BackendError::Execution(msg) => ModelGateError::BackendFailed(msg),
            BackendError::OutputMismatch { expected, actual } => ModelGateError::BackendFailed(
                format!("backend returned {actual} result sets, expected {expected}"),
            ),
        }
    }
}
