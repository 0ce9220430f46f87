//! Error taxonomy for the hub.
//!
//! Expected conditions (unknown ids, ineligible executors, capability gaps,
//! failed executions) are surfaced as values: either a [`HubError`] from the
//! registry/cache APIs or an [`ErrorKind`] carried inside a
//! [`TaskResponse`](crate::delegation::TaskResponse).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for hub operations
pub type Result<T> = std::result::Result<T, HubError>;

/// Hub errors
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Executor unavailable: {0}")]
    Unavailable(String),

    #[error("Executor {executor_id} is missing required tools: {}", missing.join(", "))]
    MissingTools {
        executor_id: String,
        missing: Vec<String>,
    },

    #[error("Execution failed: {0}")]
    ExecutionFailure(String),

    #[error("Invalid request: {0}")]
    ValidationFailure(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HubError {
    /// Classify this error for structured responses
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Unavailable(_) => ErrorKind::Unavailable,
            Self::MissingTools { .. } => ErrorKind::MissingTools,
            Self::ExecutionFailure(_) | Self::Other(_) => ErrorKind::ExecutionFailure,
            Self::ValidationFailure(_) | Self::Config(_) => ErrorKind::ValidationFailure,
        }
    }
}

/// Serializable classification of a failed operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unknown executor or task id
    NotFound,

    /// Executor exists but is not eligible for work
    Unavailable,

    /// Executor does not declare every required tool
    MissingTools,

    /// The execution call failed, timed out, or was cancelled
    ExecutionFailure,

    /// The request itself is malformed
    ValidationFailure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotFound => "not_found",
            Self::Unavailable => "unavailable",
            Self::MissingTools => "missing_tools",
            Self::ExecutionFailure => "execution_failure",
            Self::ValidationFailure => "validation_failure",
        };
        f.write_str(name)
    }
}
