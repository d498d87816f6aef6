//! Execution recording.

use std::sync::Arc;

use tracing::{debug, error};

use cronwarden_protocols::{Execution, JobId, JobStore, NewExecution, Outcome};

use crate::error::SchedulerError;
use crate::executor::CommandExecutor;

/// Persists command outcomes as execution records.
#[derive(Clone)]
pub struct ExecutionRecorder {
    store: Arc<dyn JobStore>,
}

impl ExecutionRecorder {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Persist `outcome` as an execution of `job_id`.
    ///
    /// The execution time is the moment the command was launched. On a
    /// store failure the outcome is logged in full before the error is
    /// returned; it is not retried.
    pub async fn record(&self, job_id: JobId, outcome: Outcome) -> Result<Execution, SchedulerError> {
        let started_at = outcome.started_at;
        let status = outcome.status;
        let exit_code = outcome.exit_code;
        let new = NewExecution::from_outcome(job_id, outcome);
        let stdout = new.stdout.clone();
        let stderr = new.stderr.clone();

        match self.store.create_execution(new).await {
            Ok(execution) => {
                debug!(job_id, execution_id = execution.id, %status, "Recorded execution");
                Ok(execution)
            }
            Err(e) => {
                error!(
                    job_id,
                    %started_at,
                    %status,
                    ?exit_code,
                    stdout = %stdout,
                    stderr = %stderr,
                    error = %e,
                    "Failed to record execution; outcome dropped"
                );
                Err(e.into())
            }
        }
    }

    /// Run `command` to completion and record the outcome.
    pub async fn invoke(
        &self,
        executor: &dyn CommandExecutor,
        job_id: JobId,
        command: &str,
    ) -> Result<Execution, SchedulerError> {
        let outcome = executor.run(command).await;
        self.record(job_id, outcome).await
    }
}
