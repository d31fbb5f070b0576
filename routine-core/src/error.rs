//! Error types for routine-core.
//!
//! Validation failures are recoverable: the rejected operation leaves the
//! task list untouched. Persistence failures are surfaced to the caller while
//! the in-memory mutation that triggered them stands.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Core error type for routine-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A mutation was rejected; prior state is retained.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The persistence collaborator failed to load or save.
    #[error("Persistence error during {operation}: {message}")]
    Persistence { operation: String, message: String },
}

impl CoreError {
    pub fn persistence(operation: impl Into<String>, err: impl std::fmt::Display) -> Self {
        CoreError::Persistence {
            operation: operation.into(),
            message: err.to_string(),
        }
    }
}

/// Reasons a task mutation is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Task '{task_id}' would overlap task '{conflicting_id}'")]
    Overlap {
        task_id: String,
        conflicting_id: String,
    },

    #[error("Task title must not be empty")]
    EmptyTitle,

    #[error("Invalid time range: end ({end}) must be after start ({start})")]
    InvalidTimeRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Duration for '{title}' must be positive (got {minutes} min)")]
    NonPositiveDuration { title: String, minutes: i64 },

    #[error("Invalid time '{input}': {reason}")]
    InvalidTime { input: String, reason: String },

    #[error("Task already exists: {0}")]
    DuplicateTask(String),

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Index {index} out of bounds for task list (length: {len})")]
    IndexOutOfBounds { index: usize, len: usize },
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
