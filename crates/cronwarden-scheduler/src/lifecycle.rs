//! Job lifecycle management.
//!
//! Every mutating operation updates the store and the engine together.
//! When the second step fails the first is undone, so the armed set keeps
//! matching the stored `Active` jobs.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use cronwarden_protocols::{
    Execution, ExecutionId, Job, JobFilter, JobId, JobStatus, JobStore, JobSummary, NewJob,
    log_file_name, render_log,
};

use crate::cron_expr::CronExpression;
use crate::engine::{ReloadReport, ScheduleTimezone, SchedulerEngine};
use crate::error::SchedulerError;

/// A rendered execution log ready for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogExport {
    pub file_name: String,
    pub content: String,
}

/// Orchestrates job changes against the store and the engine.
pub struct JobManager {
    store: Arc<dyn JobStore>,
    engine: Arc<SchedulerEngine>,
    /// Serializes writers per job id.
    locks: DashMap<JobId, Arc<Mutex<()>>>,
}

impl JobManager {
    pub fn new(store: Arc<dyn JobStore>, engine: Arc<SchedulerEngine>) -> Self {
        Self {
            store,
            engine,
            locks: DashMap::new(),
        }
    }

    pub fn engine(&self) -> &Arc<SchedulerEngine> {
        &self.engine
    }

    fn lock_for(&self, job_id: JobId) -> Arc<Mutex<()>> {
        self.locks.entry(job_id).or_default().clone()
    }

    /// Check input before anything is written.
    fn validate(cron_expression: &str, command: &str) -> Result<String, SchedulerError> {
        CronExpression::parse(cron_expression)?;
        if command.trim().is_empty() {
            return Err(SchedulerError::EmptyCommand);
        }
        Ok(cron_expression.trim().to_string())
    }

    /// Arm every stored active job. Run once before [`SchedulerEngine::start`].
    pub async fn reload(&self) -> Result<ReloadReport, SchedulerError> {
        let jobs = self.store.list_jobs(JobFilter::active()).await?;
        Ok(self.engine.reload_all(&jobs))
    }

    /// Create an active job and arm it.
    pub async fn create(&self, cron_expression: &str, command: &str) -> Result<Job, SchedulerError> {
        let cron_expression = Self::validate(cron_expression, command)?;
        let next_run_time = self.engine.preview_next(&cron_expression)?;

        let created = self
            .store
            .create_job(NewJob::new(cron_expression, command).with_next_run_time(next_run_time))
            .await?;

        let lock = self.lock_for(created.id);
        let _guard = lock.lock().await;

        // Another writer may have changed the row before the lock was taken.
        let mut job = self.store.get_job(created.id).await?;
        if !job.is_active() {
            info!(job_id = job.id, status = %job.status, "Created job left unarmed");
            return Ok(job);
        }

        match self.engine.arm(&job) {
            Ok(next) => self.refresh_next_run_time(&mut job, next).await?,
            Err(e) => {
                if let Err(cleanup) = self.store.delete_job(job.id).await {
                    error!(job_id = job.id, error = %cleanup, "Failed to remove unarmed job");
                }
                return Err(e);
            }
        }

        info!(job_id = job.id, cron = %job.cron_expression, "Created job");
        Ok(job)
    }

    /// Replace a job's schedule and command. Active jobs are re-armed.
    pub async fn edit(
        &self,
        job_id: JobId,
        cron_expression: &str,
        command: &str,
    ) -> Result<Job, SchedulerError> {
        let cron_expression = Self::validate(cron_expression, command)?;
        let lock = self.lock_for(job_id);
        let _guard = lock.lock().await;

        let previous = self.store.get_job(job_id).await?;
        let mut job = Job {
            cron_expression,
            command: command.to_string(),
            next_run_time: None,
            ..previous.clone()
        };
        job.next_run_time = Some(self.engine.preview_next(&job.cron_expression)?);
        self.store.update_job(&job).await?;

        if job.is_active() {
            match self.engine.arm(&job) {
                Ok(next) => self.refresh_next_run_time(&mut job, next).await?,
                Err(e) => {
                    self.restore(&previous).await;
                    return Err(e);
                }
            }
        }

        info!(job_id, cron = %job.cron_expression, "Edited job");
        Ok(job)
    }

    /// Flip a job between active and inactive.
    pub async fn toggle(&self, job_id: JobId) -> Result<Job, SchedulerError> {
        let lock = self.lock_for(job_id);
        let _guard = lock.lock().await;

        let previous = self.store.get_job(job_id).await?;
        let mut job = Job {
            status: previous.status.toggled(),
            ..previous.clone()
        };

        match job.status {
            JobStatus::Inactive => {
                self.store.update_job(&job).await?;
                self.engine.disarm(job_id);
            }
            JobStatus::Active => {
                job.next_run_time = Some(self.engine.preview_next(&job.cron_expression)?);
                self.store.update_job(&job).await?;
                match self.engine.arm(&job) {
                    Ok(next) => self.refresh_next_run_time(&mut job, next).await?,
                    Err(e) => {
                        self.restore(&previous).await;
                        return Err(e);
                    }
                }
            }
        }

        info!(job_id, status = %job.status, "Toggled job");
        Ok(job)
    }

    /// Disarm a job and delete it together with its executions.
    pub async fn delete(&self, job_id: JobId) -> Result<(), SchedulerError> {
        let lock = self.lock_for(job_id);
        let guard = lock.lock().await;

        let job = self.store.get_job(job_id).await?;
        let was_armed = self.engine.disarm(job_id);

        if let Err(e) = self.store.delete_job(job_id).await {
            if was_armed {
                if let Err(rearm) = self.engine.arm(&job) {
                    error!(job_id, error = %rearm, "Failed to re-arm job after failed delete");
                }
            }
            return Err(e.into());
        }

        drop(guard);
        self.locks.remove(&job_id);
        info!(job_id, "Deleted job");
        Ok(())
    }

    /// Run a job's command now, regardless of its status, and record it.
    ///
    /// Blocks until the command finishes. No job lock is held meanwhile.
    pub async fn run_now(&self, job_id: JobId) -> Result<Execution, SchedulerError> {
        let job = self.store.get_job(job_id).await?;
        self.engine.execute_now(job.id, &job.command).await
    }

    /// Compare the armed set with the stored active jobs and repair drift.
    ///
    /// Returns the ids that needed repair. Any repair is a bug elsewhere
    /// and is logged as a scheduling conflict.
    pub async fn reconcile(&self) -> Result<Vec<JobId>, SchedulerError> {
        let stored: HashSet<JobId> = self
            .store
            .list_jobs(JobFilter::active())
            .await?
            .into_iter()
            .map(|job| job.id)
            .collect();
        let armed: HashSet<JobId> = self.engine.armed_ids().into_iter().collect();

        let mut suspects: Vec<JobId> = stored.symmetric_difference(&armed).copied().collect();
        suspects.sort_unstable();

        let mut repaired = Vec::new();
        for job_id in suspects {
            let lock = self.lock_for(job_id);
            let _guard = lock.lock().await;

            // Re-read under the lock; a concurrent operation may have settled it.
            let should_arm = match self.store.get_job(job_id).await {
                Ok(job) if job.is_active() => Some(job),
                Ok(_) => None,
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e.into()),
            };

            match (should_arm, self.engine.is_armed(job_id)) {
                (Some(job), false) => {
                    let conflict = SchedulerError::SchedulingConflict(format!(
                        "active job {} was not armed",
                        job_id
                    ));
                    error!(job_id, error = %conflict, "Repairing schedule");
                    if let Err(e) = self.engine.arm(&job) {
                        warn!(job_id, error = %e, "Could not arm job during reconcile");
                        continue;
                    }
                    repaired.push(job_id);
                }
                (None, true) => {
                    let conflict = SchedulerError::SchedulingConflict(format!(
                        "job {} was armed but is not active",
                        job_id
                    ));
                    error!(job_id, error = %conflict, "Repairing schedule");
                    self.engine.disarm(job_id);
                    repaired.push(job_id);
                }
                _ => {}
            }
        }

        info!(repaired = repaired.len(), "Reconciled schedule");
        Ok(repaired)
    }

    pub async fn get_job(&self, job_id: JobId) -> Result<Job, SchedulerError> {
        Ok(self.store.get_job(job_id).await?)
    }

    pub async fn list_jobs(&self, filter: JobFilter) -> Result<Vec<Job>, SchedulerError> {
        Ok(self.store.list_jobs(filter).await?)
    }

    /// Every job with the status of its latest execution.
    pub async fn job_summaries(&self) -> Result<Vec<JobSummary>, SchedulerError> {
        let jobs = self.store.list_jobs(JobFilter::all()).await?;
        let mut summaries = Vec::with_capacity(jobs.len());
        for job in jobs {
            let last_status = self
                .store
                .last_execution(job.id)
                .await?
                .map(|execution| execution.status);
            summaries.push(JobSummary { job, last_status });
        }
        Ok(summaries)
    }

    /// A job's executions, newest first.
    pub async fn list_executions(&self, job_id: JobId) -> Result<Vec<Execution>, SchedulerError> {
        Ok(self.store.list_executions(job_id).await?)
    }

    pub async fn get_execution(&self, execution_id: ExecutionId) -> Result<Execution, SchedulerError> {
        Ok(self.store.get_execution(execution_id).await?)
    }

    /// Render an execution as a plain-text log.
    pub async fn export_log(&self, execution_id: ExecutionId) -> Result<LogExport, SchedulerError> {
        let execution = self.store.get_execution(execution_id).await?;
        let job = self.store.get_job(execution.job_id).await?;
        Ok(LogExport {
            file_name: log_file_name(&execution),
            content: match self.engine.timezone() {
                ScheduleTimezone::Local => render_log(&job.command, &execution, &Local),
                ScheduleTimezone::Utc => render_log(&job.command, &execution, &Utc),
            },
        })
    }

    /// Keep the cached next run time in line with what the engine armed.
    async fn refresh_next_run_time(
        &self,
        job: &mut Job,
        armed_next: DateTime<Utc>,
    ) -> Result<(), SchedulerError> {
        if job.next_run_time == Some(armed_next) {
            return Ok(());
        }
        job.next_run_time = Some(armed_next);
        self.store.update_job(job).await?;
        Ok(())
    }

    /// Put back a job record after a failed arm.
    async fn restore(&self, previous: &Job) {
        if let Err(e) = self.store.update_job(previous).await {
            error!(job_id = previous.id, error = %e, "Failed to restore job after failed arm");
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
