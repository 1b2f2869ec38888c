//! Error types for the control plane.

use thiserror::Error;

use crate::driver::DriverError;

/// Result type alias for control plane operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by provisioning, registration and lifecycle control.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or missing input, detected before any side effect.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("the {kind} '{id}' already exists in namespace '{namespace}'")]
    Conflict {
        namespace: String,
        kind: String,
        id: String,
    },

    #[error("the {kind} '{id}' referenced by this request does not exist in namespace '{namespace}'")]
    DependencyNotFound {
        namespace: String,
        kind: String,
        id: String,
    },

    #[error("driver call {operation} on connection '{connection}' failed: {source}")]
    Driver {
        operation: String,
        connection: String,
        #[source]
        source: DriverError,
    },

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("unsupported action '{action}' for {target}")]
    UnsupportedAction { action: String, target: String },

    /// Recorded status does not allow the action and `force` was not set.
    #[error("action '{action}' is not allowed: {reason}")]
    Precondition { action: String, reason: String },

    #[error("{0} not found")]
    NotFound(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn persistence(msg: impl std::fmt::Display) -> Self {
        Self::Persistence(msg.to_string())
    }

    /// Short machine-friendly name of the error class.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::Conflict { .. } => "ConflictError",
            Self::DependencyNotFound { .. } => "DependencyNotFoundError",
            Self::Driver { .. } => "DriverError",
            Self::Persistence(_) => "PersistenceError",
            Self::UnsupportedAction { .. } => "UnsupportedActionError",
            Self::Precondition { .. } => "PreconditionError",
            Self::NotFound(_) => "NotFoundError",
        }
    }
}
