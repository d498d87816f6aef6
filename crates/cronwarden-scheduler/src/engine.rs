//! Scheduler engine.
//!
//! One clock task owns fire detection for every armed job. Due fires are
//! handed to a bounded worker pool so a slow command never delays the
//! clock:
//!
//! ```text
//! arm/disarm ──► triggers (job id → next fire) ◄── clock loop
//!                                                   │ due
//!                                                   ▼
//!                                    worker pool (semaphore)
//!                                                   │
//!                                   executor ──► recorder ──► store
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use cronwarden_protocols::{Execution, Job, JobId};

use crate::cron_expr::CronExpression;
use crate::error::{CronError, SchedulerError};
use crate::executor::CommandExecutor;
use crate::recorder::ExecutionRecorder;

/// Longest the clock sleeps before re-reading the wall clock.
const MAX_CLOCK_SLEEP: Duration = Duration::from_secs(60);

/// Zone cron expressions are evaluated in. Fire times are always UTC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScheduleTimezone {
    #[default]
    Local,
    Utc,
}

impl ScheduleTimezone {
    /// Next fire of `expression` strictly after `after`.
    pub fn next_fire(&self, expression: &CronExpression, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            ScheduleTimezone::Local => expression
                .next_after(&after.with_timezone(&Local))
                .map(|t| t.with_timezone(&Utc)),
            ScheduleTimezone::Utc => expression.next_after(&after),
        }
    }
}

/// Engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of commands running at once.
    pub max_workers: usize,
    pub timezone: ScheduleTimezone,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: 20,
            timezone: ScheduleTimezone::default(),
        }
    }
}

/// Counters since the engine was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    pub armed: usize,
    pub fired: u64,
    pub recorded: u64,
    pub record_failures: u64,
}

/// Outcome of [`SchedulerEngine::reload_all`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReloadReport {
    pub armed: Vec<JobId>,
    /// Jobs that could not be armed, with the reason.
    pub skipped: Vec<(JobId, String)>,
}

struct Trigger {
    expression: CronExpression,
    /// Command as of arm time.
    command: Arc<str>,
    next_fire: DateTime<Utc>,
    /// Last fire time dispatched for this job id. Carried over when the
    /// trigger is replaced so a re-arm never schedules it again.
    last_fired: Option<DateTime<Utc>>,
}

impl Trigger {
    /// Earliest instant the next fire may be computed from.
    fn floor(last_fired: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
        match last_fired {
            Some(fired) if fired > now => fired,
            _ => now,
        }
    }
}

struct Fire {
    job_id: JobId,
    command: Arc<str>,
    scheduled_at: DateTime<Utc>,
}

/// Live set of armed triggers plus the clock that fires them.
pub struct SchedulerEngine {
    config: EngineConfig,
    executor: Arc<dyn CommandExecutor>,
    recorder: ExecutionRecorder,
    triggers: Mutex<HashMap<JobId, Trigger>>,
    wakeup: Notify,
    workers: Semaphore,
    tasks: TaskTracker,
    shutdown: CancellationToken,
    started: AtomicBool,
    fired: AtomicU64,
    recorded: AtomicU64,
    record_failures: AtomicU64,
}

impl SchedulerEngine {
    pub fn new(
        config: EngineConfig,
        executor: Arc<dyn CommandExecutor>,
        recorder: ExecutionRecorder,
    ) -> Self {
        let permits = config.max_workers.max(1);
        Self {
            config,
            executor,
            recorder,
            triggers: Mutex::new(HashMap::new()),
            wakeup: Notify::new(),
            workers: Semaphore::new(permits),
            tasks: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            started: AtomicBool::new(false),
            fired: AtomicU64::new(0),
            recorded: AtomicU64::new(0),
            record_failures: AtomicU64::new(0),
        }
    }

    /// Zone schedules are evaluated in.
    pub fn timezone(&self) -> ScheduleTimezone {
        self.config.timezone
    }

    /// Next fire time of `expr` from now, without arming anything.
    pub fn preview_next(&self, expr: &str) -> Result<DateTime<Utc>, SchedulerError> {
        let expression = CronExpression::parse(expr)?;
        self.config
            .timezone
            .next_fire(&expression, Utc::now())
            .ok_or_else(|| CronError::NoUpcomingFire(expr.to_string()).into())
    }

    /// Arm `job`, replacing any trigger it already has.
    ///
    /// The replacement happens under the trigger lock, so the old trigger
    /// can never fire once this returns. Returns the first fire time.
    pub fn arm(&self, job: &Job) -> Result<DateTime<Utc>, SchedulerError> {
        self.arm_at(job, Utc::now)
    }

    /// `now` is read only after the trigger lock is held, so the clock
    /// cannot dispatch a fire between reading it and the replacement.
    fn arm_at(
        &self,
        job: &Job,
        now: impl FnOnce() -> DateTime<Utc>,
    ) -> Result<DateTime<Utc>, SchedulerError> {
        if self.shutdown.is_cancelled() {
            return Err(SchedulerError::ShuttingDown);
        }

        let expression = CronExpression::parse(&job.cron_expression)?;
        let command: Arc<str> = Arc::from(job.command.as_str());

        let (next_fire, replaced) = {
            let mut triggers = self.triggers.lock();
            let last_fired = triggers.get(&job.id).and_then(|t| t.last_fired);
            let next_fire = self
                .config
                .timezone
                .next_fire(&expression, Trigger::floor(last_fired, now()))
                .ok_or_else(|| CronError::NoUpcomingFire(job.cron_expression.clone()))?;
            let replaced = triggers
                .insert(
                    job.id,
                    Trigger {
                        expression,
                        command,
                        next_fire,
                        last_fired,
                    },
                )
                .is_some();
            (next_fire, replaced)
        };
        self.wakeup.notify_one();

        info!(job_id = job.id, %next_fire, replaced, "Armed job");
        Ok(next_fire)
    }

    /// Remove the trigger for `job_id`. Returns whether one existed.
    ///
    /// Running commands are not interrupted.
    pub fn disarm(&self, job_id: JobId) -> bool {
        let removed = self.triggers.lock().remove(&job_id).is_some();
        if removed {
            info!(job_id, "Disarmed job");
        } else {
            debug!(job_id, "Disarm of unarmed job ignored");
        }
        removed
    }

    /// Arm every active job in `jobs`. Invalid ones are skipped and reported.
    pub fn reload_all(&self, jobs: &[Job]) -> ReloadReport {
        let mut report = ReloadReport::default();
        for job in jobs.iter().filter(|job| job.is_active()) {
            match self.arm(job) {
                Ok(_) => report.armed.push(job.id),
                Err(e) => {
                    warn!(job_id = job.id, cron = %job.cron_expression, error = %e, "Skipping job on reload");
                    report.skipped.push((job.id, e.to_string()));
                }
            }
        }
        info!(
            armed = report.armed.len(),
            skipped = report.skipped.len(),
            "Reloaded jobs"
        );
        report
    }

    pub fn is_armed(&self, job_id: JobId) -> bool {
        self.triggers.lock().contains_key(&job_id)
    }

    /// Ids of all armed jobs, ascending.
    pub fn armed_ids(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self.triggers.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn armed_count(&self) -> usize {
        self.triggers.lock().len()
    }

    /// When the armed trigger for `job_id` fires next.
    pub fn next_fire_time(&self, job_id: JobId) -> Option<DateTime<Utc>> {
        self.triggers.lock().get(&job_id).map(|t| t.next_fire)
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            armed: self.armed_count(),
            fired: self.fired.load(Ordering::SeqCst),
            recorded: self.recorded.load(Ordering::SeqCst),
            record_failures: self.record_failures.load(Ordering::SeqCst),
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Run a command immediately, outside the schedule, and record it.
    ///
    /// Blocks until the command completes. Holds no engine lock and does
    /// not take a worker slot.
    pub async fn execute_now(&self, job_id: JobId, command: &str) -> Result<Execution, SchedulerError> {
        info!(job_id, "Running job now");
        self.recorder
            .invoke(self.executor.as_ref(), job_id, command)
            .await
    }

    /// Start the clock. Calling it again has no effect.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(
            max_workers = self.config.max_workers,
            timezone = ?self.config.timezone,
            armed = self.armed_count(),
            "Scheduler engine started"
        );
        self.tasks.spawn(Arc::clone(self).run_clock());
    }

    /// Stop the clock without waiting. Further arms fail with
    /// [`SchedulerError::ShuttingDown`].
    ///
    /// Fires still waiting for a worker slot are dropped. Running commands
    /// are left to finish; [`shutdown`](Self::shutdown) waits for them.
    pub fn stop_firing(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Scheduler engine shutting down");
            self.shutdown.cancel();
        }
    }

    /// Stop firing and wait for running commands to finish.
    pub async fn shutdown(&self) {
        self.stop_firing();
        self.tasks.close();
        self.tasks.wait().await;
        info!("Scheduler engine stopped");
    }

    async fn run_clock(self: Arc<Self>) {
        while !self.shutdown.is_cancelled() {
            let (due, next_wake) = self.take_due(Utc::now());
            for fire in due {
                self.dispatch(fire);
            }

            let sleep_for = next_wake
                .map(|at| (at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
                .unwrap_or(MAX_CLOCK_SLEEP)
                .min(MAX_CLOCK_SLEEP);

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = self.wakeup.notified() => {}
                _ = tokio::time::sleep(sleep_for) => {}
            }
        }
        debug!("Scheduler clock stopped");
    }

    /// Collect due fires and advance their triggers past `now`.
    ///
    /// Missed fire times are coalesced into a single fire.
    fn take_due(&self, now: DateTime<Utc>) -> (Vec<Fire>, Option<DateTime<Utc>>) {
        let mut triggers = self.triggers.lock();
        let mut due = Vec::new();
        let mut exhausted = Vec::new();

        for (job_id, trigger) in triggers.iter_mut() {
            if trigger.next_fire > now {
                continue;
            }
            due.push(Fire {
                job_id: *job_id,
                command: Arc::clone(&trigger.command),
                scheduled_at: trigger.next_fire,
            });
            trigger.last_fired = Some(trigger.next_fire);
            let from = Trigger::floor(trigger.last_fired, now);
            match self.config.timezone.next_fire(&trigger.expression, from) {
                Some(next) => trigger.next_fire = next,
                None => exhausted.push(*job_id),
            }
        }

        for job_id in exhausted {
            warn!(job_id, "Cron expression has no further fire times; disarming");
            triggers.remove(&job_id);
        }

        let next_wake = triggers.values().map(|t| t.next_fire).min();
        (due, next_wake)
    }

    fn dispatch(self: &Arc<Self>, fire: Fire) {
        self.fired.fetch_add(1, Ordering::SeqCst);
        debug!(job_id = fire.job_id, scheduled_at = %fire.scheduled_at, "Dispatching fire");

        let engine = Arc::clone(self);
        self.tasks.spawn(async move {
            let _permit = tokio::select! {
                biased;
                _ = engine.shutdown.cancelled() => {
                    debug!(job_id = fire.job_id, "Dropping queued fire on shutdown");
                    return;
                }
                permit = engine.workers.acquire() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };

            let result = engine
                .recorder
                .invoke(engine.executor.as_ref(), fire.job_id, &fire.command)
                .await;
            match result {
                Ok(_) => {
                    engine.recorded.fetch_add(1, Ordering::SeqCst);
                }
                Err(_) => {
                    engine.record_failures.fetch_add(1, Ordering::SeqCst);
                }
            }
        });
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
