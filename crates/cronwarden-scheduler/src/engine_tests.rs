use super::*;
use std::collections::HashSet;

use chrono::TimeZone;

use cronwarden_protocols::{JobStatus, JobStore, NewJob};
use cronwarden_store::MemoryJobStore;

use crate::test_support::ScriptedExecutor;

const EVERY_SECOND: &str = "* * * * * *";

struct Harness {
    store: Arc<MemoryJobStore>,
    executor: Arc<ScriptedExecutor>,
    engine: Arc<SchedulerEngine>,
}

fn harness_with(executor: ScriptedExecutor, max_workers: usize) -> Harness {
    let store = Arc::new(MemoryJobStore::new());
    let executor = Arc::new(executor);
    let engine = Arc::new(SchedulerEngine::new(
        EngineConfig {
            max_workers,
            timezone: ScheduleTimezone::Utc,
        },
        executor.clone(),
        ExecutionRecorder::new(store.clone()),
    ));
    Harness {
        store,
        executor,
        engine,
    }
}

fn harness() -> Harness {
    harness_with(ScriptedExecutor::new(), 20)
}

async fn stored_job(store: &MemoryJobStore, cron: &str, command: &str) -> Job {
    store.create_job(NewJob::new(cron, command)).await.unwrap()
}

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test]
async fn test_arm_and_disarm() {
    let h = harness();
    let job = stored_job(&h.store, "0 0 1 1 *", "false").await;

    let next = h.engine.arm(&job).unwrap();
    assert!(next > Utc::now());
    assert!(h.engine.is_armed(job.id));
    assert_eq!(h.engine.next_fire_time(job.id), Some(next));
    assert_eq!(h.engine.armed_ids(), vec![job.id]);

    assert!(h.engine.disarm(job.id));
    assert!(!h.engine.is_armed(job.id));
    assert_eq!(h.engine.armed_count(), 0);
}

#[tokio::test]
async fn test_disarm_unarmed_is_noop() {
    let h = harness();
    assert!(!h.engine.disarm(42));
    assert!(!h.engine.disarm(42));
}

#[tokio::test]
async fn test_arm_rejects_invalid_expression() {
    let h = harness();
    let job = NewJob::new("61 * * * *", "true").into_job(1);

    let err = h.engine.arm(&job).unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidExpression(_)));
    assert!(!h.engine.is_armed(1));
}

#[tokio::test]
async fn test_preview_next_does_not_arm() {
    let h = harness();
    let next = h.engine.preview_next("@hourly").unwrap();
    assert!(next > Utc::now());
    assert_eq!(h.engine.armed_count(), 0);
    assert!(h.engine.preview_next("nope").is_err());
}

#[tokio::test]
async fn test_reload_all_skips_invalid_and_inactive() {
    let h = harness();
    let valid = NewJob::new("*/5 * * * *", "true").into_job(1);
    let inactive = NewJob::new("*/5 * * * *", "true")
        .with_status(JobStatus::Inactive)
        .into_job(2);
    let broken = NewJob::new("99 * * * *", "true").into_job(3);

    let report = h.engine.reload_all(&[valid, inactive, broken]);
    assert_eq!(report.armed, vec![1]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].0, 3);
    assert!(report.skipped[0].1.contains("99 * * * *"));
    assert_eq!(h.engine.armed_ids(), vec![1]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fires_and_records() {
    let h = harness();
    let job = stored_job(&h.store, EVERY_SECOND, "echo hi").await;
    h.engine.arm(&job).unwrap();
    h.engine.start();

    sleep_ms(2500).await;
    h.engine.shutdown().await;

    let executions = h.store.list_executions(job.id).await.unwrap();
    assert!(!executions.is_empty());
    assert_eq!(executions.len(), h.executor.run_count());
    assert!(executions.iter().all(|e| e.stdout == "echo hi\n"));

    let stats = h.engine.stats();
    assert!(stats.fired as usize >= executions.len());
    assert_eq!(stats.recorded as usize, executions.len());
    assert_eq!(stats.record_failures, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_double_arm_never_double_fires() {
    let h = harness();
    let job = stored_job(&h.store, EVERY_SECOND, "tick").await;
    h.engine.arm(&job).unwrap();
    h.engine.arm(&job).unwrap();
    h.engine.start();
    sleep_ms(1200).await;
    h.engine.arm(&job).unwrap();
    sleep_ms(2000).await;
    h.engine.shutdown().await;

    let seconds: Vec<i64> = h.executor.started().iter().map(|t| t.timestamp()).collect();
    let unique: HashSet<i64> = seconds.iter().copied().collect();
    assert!(!seconds.is_empty());
    assert_eq!(seconds.len(), unique.len(), "duplicate fires: {:?}", seconds);
    assert_eq!(h.engine.armed_count(), 1);
}

#[test]
fn test_rearm_reads_clock_under_trigger_lock() {
    let h = harness();
    let job = NewJob::new(EVERY_SECOND, "tick").into_job(1);
    let engine = &h.engine;

    engine
        .arm_at(&job, || {
            assert!(engine.triggers.try_lock().is_none());
            Utc::now()
        })
        .unwrap();
    assert!(engine.is_armed(1));
}

#[test]
fn test_rearm_at_fire_boundary_never_repeats_fire() {
    let h = harness();
    let job = NewJob::new(EVERY_SECOND, "tick").into_job(1);
    let boundary = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let before = boundary - chrono::Duration::microseconds(1);
    let after = boundary + chrono::Duration::microseconds(1);

    assert_eq!(h.engine.arm_at(&job, || before).unwrap(), boundary);
    let (due, _) = h.engine.take_due(after);
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].scheduled_at, boundary);

    // Clock reading taken before the fire was dispatched.
    let next = h.engine.arm_at(&job, || before).unwrap();
    assert_eq!(next, boundary + chrono::Duration::seconds(1));
    let (due, next_wake) = h.engine.take_due(after);
    assert!(due.is_empty());
    assert_eq!(next_wake, Some(next));

    let (due, _) = h.engine.take_due(next);
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].scheduled_at, next);
}

#[test]
fn test_take_due_coalesces_missed_fires() {
    let h = harness();
    let job = NewJob::new(EVERY_SECOND, "tick").into_job(1);
    let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

    h.engine.arm_at(&job, || start).unwrap();
    let late = start + chrono::Duration::seconds(10);
    let (due, next_wake) = h.engine.take_due(late);
    assert_eq!(due.len(), 1);
    assert_eq!(next_wake, Some(late + chrono::Duration::seconds(1)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rearm_uses_new_command() {
    let h = harness();
    let mut job = stored_job(&h.store, EVERY_SECOND, "old").await;
    h.engine.arm(&job).unwrap();

    job.command = "new".to_string();
    h.engine.arm(&job).unwrap();
    h.engine.start();
    sleep_ms(1500).await;
    h.engine.shutdown().await;

    let commands = h.executor.commands();
    assert!(!commands.is_empty());
    assert!(commands.iter().all(|c| c == "new"), "{:?}", commands);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disarm_stops_future_fires() {
    let h = harness();
    let job = stored_job(&h.store, EVERY_SECOND, "tick").await;
    h.engine.arm(&job).unwrap();
    h.engine.start();

    sleep_ms(1500).await;
    h.engine.disarm(job.id);
    sleep_ms(200).await;
    let after_disarm = h.executor.run_count();
    assert!(after_disarm >= 1);

    sleep_ms(1500).await;
    assert_eq!(h.executor.run_count(), after_disarm);
    h.engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_arming_wakes_idle_clock() {
    let h = harness();
    h.engine.start();
    sleep_ms(100).await;

    // The clock is asleep with nothing armed.
    let job = stored_job(&h.store, EVERY_SECOND, "tick").await;
    h.engine.arm(&job).unwrap();
    sleep_ms(1500).await;
    h.engine.shutdown().await;

    assert!(h.executor.run_count() >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_worker_pool_is_bounded() {
    let h = harness_with(
        ScriptedExecutor::new().with_delay(Duration::from_millis(1500)),
        2,
    );
    for i in 0..5 {
        let job = stored_job(&h.store, EVERY_SECOND, &format!("job-{}", i)).await;
        h.engine.arm(&job).unwrap();
    }
    h.engine.start();
    sleep_ms(2500).await;

    assert!(h.executor.run_count() >= 2);
    assert!(h.executor.peak() <= 2, "peak {}", h.executor.peak());
    h.engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_waits_for_running_commands() {
    let h = harness_with(
        ScriptedExecutor::new().with_delay(Duration::from_millis(800)),
        20,
    );
    let job = stored_job(&h.store, EVERY_SECOND, "slow").await;
    h.engine.arm(&job).unwrap();
    h.engine.start();

    sleep_ms(1300).await;
    h.engine.shutdown().await;

    // Every command that started has been recorded.
    let executions = h.store.list_executions(job.id).await.unwrap();
    assert!(!executions.is_empty());
    assert_eq!(executions.len(), h.executor.run_count());

    let err = h.engine.arm(&job).unwrap_err();
    assert!(matches!(err, SchedulerError::ShuttingDown));
    assert!(h.engine.is_shutting_down());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_firing_halts_dispatch_before_wait() {
    let h = harness_with(
        ScriptedExecutor::new().with_delay(Duration::from_millis(300)),
        20,
    );
    let job = stored_job(&h.store, EVERY_SECOND, "tick").await;
    h.engine.arm(&job).unwrap();
    h.engine.start();
    sleep_ms(1500).await;

    h.engine.stop_firing();
    assert!(h.engine.is_shutting_down());
    sleep_ms(50).await;
    let runs = h.executor.run_count();
    let fired = h.engine.stats().fired;
    assert!(runs >= 1);

    // Nothing new starts while running commands are still being awaited.
    sleep_ms(1500).await;
    assert_eq!(h.executor.run_count(), runs);
    assert_eq!(h.engine.stats().fired, fired);
    assert!(matches!(
        h.engine.arm(&job),
        Err(SchedulerError::ShuttingDown)
    ));

    h.engine.shutdown().await;
    assert_eq!(h.executor.run_count(), runs);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_record_failure_keeps_job_armed() {
    let h = harness();
    // Armed but never stored, so every record fails.
    let ghost = NewJob::new(EVERY_SECOND, "tick").into_job(999);
    h.engine.arm(&ghost).unwrap();
    h.engine.start();

    sleep_ms(2500).await;
    h.engine.shutdown().await;

    let stats = h.engine.stats();
    assert!(stats.fired >= 2);
    assert!(stats.record_failures >= 1);
    assert_eq!(stats.recorded, 0);
    assert!(h.engine.is_armed(999));
}

#[tokio::test]
async fn test_execute_now_ignores_armed_state() {
    let h = harness();
    let job = stored_job(&h.store, "0 0 1 1 *", "false").await;

    let execution = h.engine.execute_now(job.id, &job.command).await.unwrap();
    assert_eq!(execution.status, cronwarden_protocols::ExecutionStatus::Failed);
    assert!(!h.engine.is_armed(job.id));
    assert_eq!(h.engine.stats().fired, 0);
}

#[test]
fn test_timezone_next_fire() {
    let expression = CronExpression::parse("0 9 * * *").unwrap();
    let from = Utc::now();

    let utc = ScheduleTimezone::Utc.next_fire(&expression, from).unwrap();
    assert!(utc > from);
    assert_eq!(utc.format("%H:%M:%S").to_string(), "09:00:00");

    let local = ScheduleTimezone::Local.next_fire(&expression, from).unwrap();
    assert!(local > from);
    assert_eq!(
        local.with_timezone(&Local).format("%H:%M").to_string(),
        "09:00"
    );
}
