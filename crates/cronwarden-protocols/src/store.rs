//! Job store trait for persistence.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{Execution, ExecutionId, Job, JobFilter, JobId, NewExecution, NewJob};

/// Persistence interface for jobs and their executions.
///
/// Implementations must make every operation atomic with respect to the
/// others: no partially written job or execution is ever observable.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job and return it with its assigned id.
    async fn create_job(&self, job: NewJob) -> Result<Job, StoreError>;

    /// Load a job by ID.
    async fn get_job(&self, id: JobId) -> Result<Job, StoreError>;

    /// List jobs matching the filter, by id ascending.
    async fn list_jobs(&self, filter: JobFilter) -> Result<Vec<Job>, StoreError>;

    /// Overwrite a job's fields.
    async fn update_job(&self, job: &Job) -> Result<(), StoreError>;

    /// Delete a job together with all of its executions.
    async fn delete_job(&self, id: JobId) -> Result<(), StoreError>;

    /// Persist a new execution for an existing job.
    async fn create_execution(&self, execution: NewExecution) -> Result<Execution, StoreError>;

    /// List a job's executions, newest first, ties by id ascending.
    async fn list_executions(&self, job_id: JobId) -> Result<Vec<Execution>, StoreError>;

    /// Load an execution by ID.
    async fn get_execution(&self, id: ExecutionId) -> Result<Execution, StoreError>;

    /// The first execution in `list_executions` order, if any.
    async fn last_execution(&self, job_id: JobId) -> Result<Option<Execution>, StoreError>;
}
