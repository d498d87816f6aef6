//! Read-only commands against the job database.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Local, TimeZone, Utc};

use cronwarden_config::{Config, TimezoneSetting};
use cronwarden_protocols::{Execution, JobSummary};
use cronwarden_scheduler::{CronExpression, ExecutionRecorder, JobManager, SchedulerEngine};
use cronwarden_store::SqliteJobStore;

use crate::server::{engine_config, shell_executor};

/// A manager over the configured database. The engine is never started.
async fn open_manager(config: &Config) -> Result<JobManager, Box<dyn std::error::Error>> {
    let store = Arc::new(SqliteJobStore::open(config.database.resolved_path()).await?);
    let engine = Arc::new(SchedulerEngine::new(
        engine_config(&config.scheduler),
        Arc::new(shell_executor(&config.scheduler)),
        ExecutionRecorder::new(store.clone()),
    ));
    Ok(JobManager::new(store, engine))
}

fn format_time(time: Option<DateTime<Utc>>) -> String {
    match time {
        Some(time) => time
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => "-".to_string(),
    }
}

fn render_job_table(summaries: &[JobSummary]) -> String {
    let mut out = format!(
        "{:<6} {:<20} {:<9} {:<20} {:<15} {}\n",
        "ID", "CRON", "STATUS", "NEXT RUN", "LAST RUN", "COMMAND"
    );
    for summary in summaries {
        let job = &summary.job;
        let _ = writeln!(
            out,
            "{:<6} {:<20} {:<9} {:<20} {:<15} {}",
            job.id,
            job.cron_expression,
            job.status,
            format_time(job.next_run_time),
            summary.last_status_label(),
            job.command
        );
    }
    out
}

fn render_execution_table(executions: &[Execution]) -> String {
    let mut out = format!("{:<6} {:<20} {:<8} {}\n", "ID", "TIME", "STATUS", "OUTPUT");
    for execution in executions {
        let first_line = execution
            .stdout
            .lines()
            .next()
            .or_else(|| execution.stderr.lines().next())
            .unwrap_or("");
        let _ = writeln!(
            out,
            "{:<6} {:<20} {:<8} {}",
            execution.id,
            format_time(Some(execution.execution_time)),
            execution.status,
            first_line
        );
    }
    out
}

/// `cronwarden jobs`
pub(crate) async fn list_jobs(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let manager = open_manager(config).await?;
    let summaries = manager.job_summaries().await?;
    if summaries.is_empty() {
        println!("No jobs.");
        return Ok(());
    }
    print!("{}", render_job_table(&summaries));
    Ok(())
}

/// `cronwarden executions <job-id>`
pub(crate) async fn list_executions(
    config: &Config,
    job_id: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    let manager = open_manager(config).await?;
    let executions = manager.list_executions(job_id).await?;
    if executions.is_empty() {
        println!("Job {} has not been executed.", job_id);
        return Ok(());
    }
    print!("{}", render_execution_table(&executions));
    Ok(())
}

/// `cronwarden log <execution-id>`
pub(crate) async fn show_log(
    config: &Config,
    execution_id: i64,
    save: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let manager = open_manager(config).await?;
    let export = manager.export_log(execution_id).await?;
    if save {
        tokio::fs::write(&export.file_name, &export.content).await?;
        println!("Saved {}", export.file_name);
    } else {
        print!("{}", export.content);
    }
    Ok(())
}

fn render_upcoming<Tz: TimeZone>(expression: &CronExpression, from: &DateTime<Tz>, count: usize) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let mut out = format!("{} is valid. Next fire times:\n", expression);
    for time in expression.upcoming(from, count) {
        let _ = writeln!(out, "  {}", time.format("%Y-%m-%d %H:%M:%S %Z"));
    }
    out
}

/// `cronwarden check <expression>`
pub(crate) fn check_expression(
    config: &Config,
    expression: &str,
    count: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let expression = CronExpression::parse(expression)?;
    let rendered = match config.scheduler.timezone {
        TimezoneSetting::Local => render_upcoming(&expression, &Local::now(), count),
        TimezoneSetting::Utc => render_upcoming(&expression, &Utc::now(), count),
    };
    print!("{}", rendered);
    Ok(())
}
