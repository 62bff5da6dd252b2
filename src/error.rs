//! Error types for upload-batch
//!
//! Two layers of errors exist:
//! - [`Error`] rejects a whole batch (invalid options, I/O while preparing inputs,
//!   HTTP client construction). It is returned before any worker starts.
//! - [`TaskError`] is carried by a single task. It never aborts the batch; it is
//!   recorded in that task's [`TaskResult`](crate::types::TaskResult) instead.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for upload-batch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for upload-batch
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "concurrency")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a [`Error::Config`] naming the offending key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// Failure of a single unit of work
///
/// The variant is the classification the retry policy acts on:
/// only [`TaskError::Transient`] is ever retried.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum TaskError {
    /// I/O timeout, server busy, malformed response. Retried with backoff.
    #[error("{0}")]
    Transient(String),

    /// Known in advance to be non-retryable (e.g. the input failed validation).
    /// Consumes one attempt and is recorded without delay.
    #[error("rejected: {0}")]
    Terminal(String),

    /// The batch was cancelled before this task was started
    #[error("cancelled before start")]
    Cancelled,
}

impl TaskError {
    /// Shorthand for [`TaskError::Transient`]
    pub fn transient(message: impl Into<String>) -> Self {
        TaskError::Transient(message.into())
    }

    /// Shorthand for [`TaskError::Terminal`]
    pub fn terminal(message: impl Into<String>) -> Self {
        TaskError::Terminal(message.into())
    }

    /// The human-readable message without the classification prefix
    pub fn message(&self) -> &str {
        match self {
            TaskError::Transient(msg) | TaskError::Terminal(msg) => msg,
            TaskError::Cancelled => "cancelled before start",
        }
    }
}
