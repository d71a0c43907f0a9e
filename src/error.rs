//! # Errors
//!
//! One error type for the whole runtime. The registry, the syscall layer and the
//! actor core all return [`RosixError`], so a failure raised deep inside a behavior
//! step reaches the syscall caller with its kind intact.
//!
//! The type is `Clone`: an actor publishes a failed function call on its response
//! log *and* hands the same error back to the waiting caller.

use std::fmt;

/// Protocol extension points that this runtime declares but does not provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Link,
    Unlink,
    Relations,
    Pipe,
    Fork,
    Batch,
    Transaction,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Link => "link",
            Capability::Unlink => "unlink",
            Capability::Relations => "relations",
            Capability::Pipe => "pipe",
            Capability::Fork => "fork",
            Capability::Batch => "batch",
            Capability::Transaction => "transaction",
        };
        f.write_str(name)
    }
}

/// Numeric error codes, HTTP-flavoured like the rest of the protocol surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidParameter = 400,
    PermissionDenied = 403,
    NotFound = 404,
    ResourceBusy = 409,
    Validation = 422,
    InternalError = 500,
    NotImplemented = 501,
    Unavailable = 503,
}

/// Errors surfaced by the registry, the syscall layer and the actor core.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RosixError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Resource busy: {0}")]
    ResourceBusy(String),
    #[error("Not implemented: {0}")]
    NotImplemented(String),
    #[error("Unsupported capability: {0}")]
    Unsupported(Capability),
    #[error("Actor unavailable: {0}")]
    ActorUnavailable(String),
    #[error("Execution error: {0}")]
    Execution(String),
    #[error("Cancelled: {0}")]
    Cancelled(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("{} actor(s) failed to stop: {}", .failures.len(), join_failures(.failures))]
    Shutdown { failures: Vec<(String, RosixError)> },
}

fn join_failures(failures: &[(String, RosixError)]) -> String {
    failures
        .iter()
        .map(|(id, e)| format!("{id}: {e}"))
        .collect::<Vec<_>>()
        .join("; ")
}

impl RosixError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RosixError::NotFound(_) => ErrorCode::NotFound,
            RosixError::AlreadyExists(_) | RosixError::ResourceBusy(_) => ErrorCode::ResourceBusy,
            RosixError::PermissionDenied(_) => ErrorCode::PermissionDenied,
            RosixError::InvalidParameter(_) | RosixError::Configuration(_) => {
                ErrorCode::InvalidParameter
            }
            RosixError::Validation(_) => ErrorCode::Validation,
            RosixError::NotImplemented(_) | RosixError::Unsupported(_) => {
                ErrorCode::NotImplemented
            }
            RosixError::ActorUnavailable(_) | RosixError::Cancelled(_) => ErrorCode::Unavailable,
            RosixError::Execution(_) | RosixError::Internal(_) | RosixError::Shutdown { .. } => {
                ErrorCode::InternalError
            }
        }
    }

    /// Short machine-readable name, carried in failure response payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            RosixError::NotFound(_) => "not_found",
            RosixError::AlreadyExists(_) => "already_exists",
            RosixError::PermissionDenied(_) => "permission_denied",
            RosixError::InvalidParameter(_) => "invalid_parameter",
            RosixError::Validation(_) => "validation_error",
            RosixError::ResourceBusy(_) => "resource_busy",
            RosixError::NotImplemented(_) => "not_implemented",
            RosixError::Unsupported(_) => "unsupported",
            RosixError::ActorUnavailable(_) => "actor_unavailable",
            RosixError::Execution(_) => "execution_error",
            RosixError::Cancelled(_) => "cancelled",
            RosixError::Configuration(_) => "configuration_error",
            RosixError::Internal(_) => "internal_error",
            RosixError::Shutdown { .. } => "shutdown_error",
        }
    }
}

impl From<serde_json::Error> for RosixError {
    fn from(e: serde_json::Error) -> Self {
        RosixError::InvalidParameter(e.to_string())
    }
}

impl From<config::ConfigError> for RosixError {
    fn from(e: config::ConfigError) -> Self {
        RosixError::Configuration(e.to_string())
    }
}

pub type Result<T, E = RosixError> = std::result::Result<T, E>;
