//! In-memory job store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::SubsecRound;
use tokio::sync::RwLock;

use cronwarden_protocols::{
    Execution, ExecutionId, Job, JobFilter, JobId, JobStore, NewExecution, NewJob, StoreError,
};

#[derive(Default)]
struct Inner {
    jobs: BTreeMap<JobId, Job>,
    executions: BTreeMap<ExecutionId, Execution>,
    last_job_id: JobId,
    last_execution_id: ExecutionId,
}

impl Inner {
    fn executions_of(&self, job_id: JobId) -> Vec<Execution> {
        let mut executions: Vec<Execution> = self
            .executions
            .values()
            .filter(|e| e.job_id == job_id)
            .cloned()
            .collect();
        executions.sort_by(|a, b| {
            b.execution_time
                .cmp(&a.execution_time)
                .then(a.id.cmp(&b.id))
        });
        executions
    }
}

/// In-memory job store for tests and throwaway runs.
///
/// Behaves like [`SqliteJobStore`](crate::SqliteJobStore): ids are never
/// reused, timestamps keep microsecond precision, and deleting a job
/// removes its executions.
pub struct MemoryJobStore {
    inner: RwLock<Inner>,
}

impl MemoryJobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(&self, job: NewJob) -> Result<Job, StoreError> {
        let mut inner = self.inner.write().await;
        inner.last_job_id += 1;
        let id = inner.last_job_id;

        let job = NewJob {
            next_run_time: job.next_run_time.map(|t| t.trunc_subsecs(6)),
            ..job
        }
        .into_job(id);
        inner.jobs.insert(id, job.clone());
        Ok(job)
    }

    async fn get_job(&self, id: JobId) -> Result<Job, StoreError> {
        let inner = self.inner.read().await;
        inner
            .jobs
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::job_not_found(id))
    }

    async fn list_jobs(&self, filter: JobFilter) -> Result<Vec<Job>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .jobs
            .values()
            .filter(|job| filter.matches(job))
            .cloned()
            .collect())
    }

    async fn update_job(&self, job: &Job) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let slot = inner
            .jobs
            .get_mut(&job.id)
            .ok_or_else(|| StoreError::job_not_found(job.id))?;
        *slot = Job {
            next_run_time: job.next_run_time.map(|t| t.trunc_subsecs(6)),
            ..job.clone()
        };
        Ok(())
    }

    async fn delete_job(&self, id: JobId) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.jobs.remove(&id).is_none() {
            return Err(StoreError::job_not_found(id));
        }
        inner.executions.retain(|_, e| e.job_id != id);
        Ok(())
    }

    async fn create_execution(&self, execution: NewExecution) -> Result<Execution, StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.jobs.contains_key(&execution.job_id) {
            return Err(StoreError::job_not_found(execution.job_id));
        }
        inner.last_execution_id += 1;
        let id = inner.last_execution_id;

        let execution = NewExecution {
            execution_time: execution.execution_time.trunc_subsecs(6),
            ..execution
        }
        .into_execution(id);
        inner.executions.insert(id, execution.clone());
        Ok(execution)
    }

    async fn list_executions(&self, job_id: JobId) -> Result<Vec<Execution>, StoreError> {
        let inner = self.inner.read().await;
        if !inner.jobs.contains_key(&job_id) {
            return Err(StoreError::job_not_found(job_id));
        }
        Ok(inner.executions_of(job_id))
    }

    async fn get_execution(&self, id: ExecutionId) -> Result<Execution, StoreError> {
        let inner = self.inner.read().await;
        inner
            .executions
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::execution_not_found(id))
    }

    async fn last_execution(&self, job_id: JobId) -> Result<Option<Execution>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.executions_of(job_id).into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use cronwarden_protocols::{ExecutionStatus, JobStatus};

    fn run(job_id: JobId, seconds: i64) -> NewExecution {
        NewExecution {
            job_id,
            execution_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                + Duration::seconds(seconds),
            status: ExecutionStatus::Success,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    #[tokio::test]
    async fn test_ids_are_not_reused() {
        let store = MemoryJobStore::new();
        let first = store.create_job(NewJob::new("* * * * *", "a")).await.unwrap();
        store.delete_job(first.id).await.unwrap();
        let second = store.create_job(NewJob::new("* * * * *", "b")).await.unwrap();
        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn test_filter_and_update() {
        let store = MemoryJobStore::new();
        let mut job = store.create_job(NewJob::new("* * * * *", "a")).await.unwrap();
        job.status = JobStatus::Inactive;
        store.update_job(&job).await.unwrap();

        assert!(store.list_jobs(JobFilter::active()).await.unwrap().is_empty());
        assert_eq!(store.list_jobs(JobFilter::all()).await.unwrap(), vec![job]);
    }

    #[tokio::test]
    async fn test_missing_records() {
        let store = MemoryJobStore::new();
        let ghost = NewJob::new("* * * * *", "a").into_job(5);
        assert!(store.update_job(&ghost).await.unwrap_err().is_not_found());
        assert!(store.delete_job(5).await.unwrap_err().is_not_found());
        assert!(store.list_executions(5).await.unwrap_err().is_not_found());
        assert!(store.create_execution(run(5, 0)).await.unwrap_err().is_not_found());
        assert!(store.get_execution(1).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_execution_order_and_cascade() {
        let store = MemoryJobStore::new();
        let job = store.create_job(NewJob::new("* * * * *", "a")).await.unwrap();

        let old = store.create_execution(run(job.id, 0)).await.unwrap();
        let new_a = store.create_execution(run(job.id, 60)).await.unwrap();
        let new_b = store.create_execution(run(job.id, 60)).await.unwrap();

        let ids: Vec<ExecutionId> = store
            .list_executions(job.id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![new_a.id, new_b.id, old.id]);
        assert_eq!(
            store.last_execution(job.id).await.unwrap().map(|e| e.id),
            Some(new_a.id)
        );

        store.delete_job(job.id).await.unwrap();
        assert!(store.get_execution(old.id).await.unwrap_err().is_not_found());
    }
}
