//! Job and execution records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ParseStatusError;

/// Job identifier, assigned by the store in insertion order.
pub type JobId = i64;

/// Execution identifier, assigned by the store in insertion order.
pub type ExecutionId = i64;

/// Job status. Only active jobs are armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    /// Job is armed and fires on schedule.
    Active,
    /// Job is kept but never fires.
    Inactive,
}

impl JobStatus {
    /// Stored/displayed name.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Active => "Active",
            JobStatus::Inactive => "Inactive",
        }
    }

    /// The opposite status.
    pub fn toggled(self) -> Self {
        match self {
            JobStatus::Active => JobStatus::Inactive,
            JobStatus::Inactive => JobStatus::Active,
        }
    }
}

impl Default for JobStatus {
    fn default() -> Self {
        JobStatus::Active
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(JobStatus::Active),
            "Inactive" => Ok(JobStatus::Inactive),
            other => Err(ParseStatusError {
                field: "job status",
                value: other.to_string(),
            }),
        }
    }
}

/// Result status of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Command exited with code 0.
    Success,
    /// Command exited nonzero, was killed, or could not be launched.
    Failed,
}

impl ExecutionStatus {
    /// Stored/displayed name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "Success",
            ExecutionStatus::Failed => "Failed",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Success" => Ok(ExecutionStatus::Success),
            "Failed" => Ok(ExecutionStatus::Failed),
            other => Err(ParseStatusError {
                field: "execution status",
                value: other.to_string(),
            }),
        }
    }
}

/// A scheduled command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID.
    pub id: JobId,
    /// Cron expression the job fires on.
    pub cron_expression: String,
    /// Shell command text.
    pub command: String,
    /// Cached next fire time, refreshed on create/edit/re-activation only.
    pub next_run_time: Option<DateTime<Utc>>,
    /// Current status.
    pub status: JobStatus,
}

impl Job {
    /// Check if the job should be armed.
    pub fn is_active(&self) -> bool {
        self.status == JobStatus::Active
    }
}

/// A job that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub cron_expression: String,
    pub command: String,
    pub next_run_time: Option<DateTime<Utc>>,
    pub status: JobStatus,
}

impl NewJob {
    /// Create a new active job.
    pub fn new(cron_expression: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            cron_expression: cron_expression.into(),
            command: command.into(),
            next_run_time: None,
            status: JobStatus::Active,
        }
    }

    /// Set the cached next run time.
    pub fn with_next_run_time(mut self, next_run_time: DateTime<Utc>) -> Self {
        self.next_run_time = Some(next_run_time);
        self
    }

    /// Set the initial status.
    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = status;
        self
    }

    /// Attach the store-assigned id.
    pub fn into_job(self, id: JobId) -> Job {
        Job {
            id,
            cron_expression: self.cron_expression,
            command: self.command,
            next_run_time: self.next_run_time,
            status: self.status,
        }
    }
}

/// The immutable record of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    /// Unique execution ID.
    pub id: ExecutionId,
    /// Owning job.
    pub job_id: JobId,
    /// When the run was dispatched.
    pub execution_time: DateTime<Utc>,
    /// Run status.
    pub status: ExecutionStatus,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

/// An execution that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewExecution {
    pub job_id: JobId,
    pub execution_time: DateTime<Utc>,
    pub status: ExecutionStatus,
    pub stdout: String,
    pub stderr: String,
}

impl NewExecution {
    /// Build an execution record from a command outcome.
    pub fn from_outcome(job_id: JobId, outcome: Outcome) -> Self {
        Self {
            job_id,
            execution_time: outcome.started_at,
            status: outcome.status,
            stdout: outcome.stdout,
            stderr: outcome.stderr,
        }
    }

    /// Attach the store-assigned id.
    pub fn into_execution(self, id: ExecutionId) -> Execution {
        Execution {
            id,
            job_id: self.job_id,
            execution_time: self.execution_time,
            status: self.status,
            stdout: self.stdout,
            stderr: self.stderr,
        }
    }
}

/// Normalized result of one command invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    /// `Success` iff the process exited with code 0.
    pub status: ExecutionStatus,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error, or a diagnostic if the launch failed.
    pub stderr: String,
    /// Exit code, when the process exited normally.
    pub exit_code: Option<i32>,
    /// Stamped right before the process was launched.
    pub started_at: DateTime<Utc>,
}

impl Outcome {
    /// Outcome of a process that could not be launched or completed.
    pub fn launch_failure(started_at: DateTime<Utc>, diagnostic: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            stdout: String::new(),
            stderr: diagnostic.into(),
            exit_code: None,
            started_at,
        }
    }

    /// Check if the run succeeded.
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}

/// Filter for listing jobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobFilter {
    /// Only jobs with this status.
    pub status: Option<JobStatus>,
}

impl JobFilter {
    /// All jobs.
    pub fn all() -> Self {
        Self::default()
    }

    /// Only active jobs.
    pub fn active() -> Self {
        Self {
            status: Some(JobStatus::Active),
        }
    }

    /// Check if a job passes the filter.
    pub fn matches(&self, job: &Job) -> bool {
        self.status.is_none_or(|status| job.status == status)
    }
}

/// A job together with the status of its most recent run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub job: Job,
    /// `None` when the job has never been executed.
    pub last_status: Option<ExecutionStatus>,
}

impl JobSummary {
    /// Display label for the last run.
    pub fn last_status_label(&self) -> &'static str {
        match self.last_status {
            Some(status) => status.as_str(),
            None => "Never Executed",
        }
    }
}
