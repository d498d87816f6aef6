//! Scheduler error types.

use cronwarden_protocols::{RecordKind, StoreError};
use thiserror::Error;

/// Errors from parsing or evaluating a cron expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CronError {
    /// The text fails the grammar or a field is out of bounds.
    #[error("Invalid cron expression '{expr}': {reason}")]
    InvalidExpression { expr: String, reason: String },

    /// The expression is valid but never fires again.
    #[error("Cron expression '{0}' has no upcoming fire time")]
    NoUpcomingFire(String),
}

/// Errors surfaced by the engine, recorder and lifecycle manager.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    InvalidExpression(#[from] CronError),

    #[error("Command cannot be empty")]
    EmptyCommand,

    #[error("{kind} {id} does not exist")]
    NotFound { kind: RecordKind, id: i64 },

    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// Armed set and store disagree. Logged and repaired, never expected.
    #[error("Scheduling conflict: {0}")]
    SchedulingConflict(String),

    #[error("Scheduler is shutting down")]
    ShuttingDown,
}

impl SchedulerError {
    /// Whether the caller supplied invalid input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SchedulerError::InvalidExpression(_) | SchedulerError::EmptyCommand
        )
    }
}

impl From<StoreError> for SchedulerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, id } => SchedulerError::NotFound { kind, id },
            StoreError::Persistence(message) => SchedulerError::Persistence(message),
        }
    }
}
