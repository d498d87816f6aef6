//! Store error types.

use std::fmt;

use thiserror::Error;

/// Kind of record an id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Job,
    Execution,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Job => write!(f, "Job"),
            RecordKind::Execution => write!(f, "Execution"),
        }
    }
}

/// Errors raised by a [`JobStore`](crate::JobStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested record does not exist.
    #[error("{kind} {id} does not exist")]
    NotFound { kind: RecordKind, id: i64 },

    /// The storage engine failed to read or write.
    #[error("Persistence failure: {0}")]
    Persistence(String),
}

impl StoreError {
    /// Shorthand for a missing job.
    pub fn job_not_found(id: i64) -> Self {
        StoreError::NotFound {
            kind: RecordKind::Job,
            id,
        }
    }

    /// Shorthand for a missing execution.
    pub fn execution_not_found(id: i64) -> Self {
        StoreError::NotFound {
            kind: RecordKind::Execution,
            id,
        }
    }

    /// Whether this is a `NotFound` error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// A stored status string did not name a known status.
#[derive(Debug, Clone, Error)]
#[error("Unknown {field} value: {value:?}")]
pub struct ParseStatusError {
    pub field: &'static str,
    pub value: String,
}
