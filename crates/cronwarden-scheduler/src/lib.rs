//! # cronwarden Scheduler
//!
//! Turns stored jobs into running commands.
//!
//! ## Components
//!
//! - [`CronExpression`] - validation and next-fire computation
//! - [`ShellExecutor`] - runs command text through a shell
//! - [`ExecutionRecorder`] - persists each outcome as an execution
//! - [`SchedulerEngine`] - armed triggers, the clock and the worker pool
//! - [`JobManager`] - create/edit/toggle/delete/run-now, keeping the
//!   engine in step with the store

mod cron_expr;
mod engine;
mod error;
mod executor;
mod lifecycle;
mod recorder;

#[cfg(test)]
mod test_support;

pub use cron_expr::{CronExpression, next_fire_time, validate};
pub use engine::{EngineConfig, EngineStats, ReloadReport, ScheduleTimezone, SchedulerEngine};
pub use error::{CronError, SchedulerError};
pub use executor::{CommandExecutor, ShellExecutor};
pub use lifecycle::{JobManager, LogExport};
pub use recorder::ExecutionRecorder;
