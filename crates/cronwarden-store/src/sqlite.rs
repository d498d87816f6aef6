//! SQLite job store implementation.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use std::path::Path;
use tokio_rusqlite::Connection;
use tracing::debug;

use cronwarden_protocols::{
    Execution, ExecutionId, JobStore, Job, JobFilter, JobId, NewExecution, NewJob, StoreError,
};

use crate::schema::init_schema;

#[cfg(test)]
#[path = "sqlite_tests.rs"]
mod tests;

const JOB_COLUMNS: &str = "id, cron_expression, command, next_run_time, status";
const EXECUTION_COLUMNS: &str = "id, job_id, execution_time, status, stdout, stderr";

/// SQLite-backed job store.
///
/// All statements run on one background connection, so operations are
/// serialized and each is atomic with respect to the others.
pub struct SqliteJobStore {
    conn: Connection,
}

impl SqliteJobStore {
    /// Create a new in-memory database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await.map_err(persistence)?;
        Self::init(conn).await
    }

    /// Open (or create) a file-backed database.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::Persistence(format!(
                    "Failed to create database directory {:?}: {}",
                    parent, e
                ))
            })?;
        }

        debug!("Opening job database at {:?}", path);
        let conn = Connection::open(path).await.map_err(persistence)?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| Ok(init_schema(conn)?))
            .await
            .map_err(persistence)?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn create_job(&self, job: NewJob) -> Result<Job, StoreError> {
        let job = NewJob {
            next_run_time: job.next_run_time.map(|t| t.trunc_subsecs(6)),
            ..job
        };
        let cron_expression = job.cron_expression.clone();
        let command = job.command.clone();
        let next_run_time = job.next_run_time.as_ref().map(encode_time);
        let status = job.status.as_str();

        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO jobs (cron_expression, command, next_run_time, status)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![cron_expression, command, next_run_time, status],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(persistence)?;

        debug!("Created job {}", id);
        Ok(job.into_job(id))
    }

    async fn get_job(&self, id: JobId) -> Result<Job, StoreError> {
        self.conn
            .call(move |conn| {
                let job = conn
                    .query_row(
                        &format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS),
                        [id],
                        job_from_row,
                    )
                    .optional()?;
                Ok(job)
            })
            .await
            .map_err(persistence)?
            .ok_or_else(|| StoreError::job_not_found(id))
    }

    async fn list_jobs(&self, filter: JobFilter) -> Result<Vec<Job>, StoreError> {
        let status = filter.status.map(|s| s.as_str());
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM jobs WHERE (?1 IS NULL OR status = ?1) ORDER BY id ASC",
                    JOB_COLUMNS
                ))?;
                let jobs = stmt
                    .query_map(params![status], job_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(jobs)
            })
            .await
            .map_err(persistence)
    }

    async fn update_job(&self, job: &Job) -> Result<(), StoreError> {
        let id = job.id;
        let cron_expression = job.cron_expression.clone();
        let command = job.command.clone();
        let next_run_time = job.next_run_time.as_ref().map(encode_time);
        let status = job.status.as_str();

        let updated = self
            .conn
            .call(move |conn| {
                let rows = conn.execute(
                    "UPDATE jobs SET cron_expression = ?1, command = ?2, next_run_time = ?3,
                     status = ?4 WHERE id = ?5",
                    params![cron_expression, command, next_run_time, status, id],
                )?;
                Ok(rows)
            })
            .await
            .map_err(persistence)?;

        if updated == 0 {
            return Err(StoreError::job_not_found(id));
        }
        Ok(())
    }

    async fn delete_job(&self, id: JobId) -> Result<(), StoreError> {
        let deleted = self
            .conn
            .call(move |conn| Ok(conn.execute("DELETE FROM jobs WHERE id = ?1", [id])?))
            .await
            .map_err(persistence)?;

        if deleted == 0 {
            return Err(StoreError::job_not_found(id));
        }
        debug!("Deleted job {} and its executions", id);
        Ok(())
    }

    async fn create_execution(&self, execution: NewExecution) -> Result<Execution, StoreError> {
        let execution = NewExecution {
            execution_time: execution.execution_time.trunc_subsecs(6),
            ..execution
        };
        let job_id = execution.job_id;
        let execution_time = encode_time(&execution.execution_time);
        let status = execution.status.as_str();
        let stdout = execution.stdout.clone();
        let stderr = execution.stderr.clone();

        let id = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                if !job_exists(&tx, job_id)? {
                    return Ok(None);
                }
                tx.execute(
                    "INSERT INTO job_executions (job_id, execution_time, status, stdout, stderr)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![job_id, execution_time, status, stdout, stderr],
                )?;
                let id = tx.last_insert_rowid();
                tx.commit()?;
                Ok(Some(id))
            })
            .await
            .map_err(persistence)?
            .ok_or_else(|| StoreError::job_not_found(job_id))?;

        Ok(execution.into_execution(id))
    }

    async fn list_executions(&self, job_id: JobId) -> Result<Vec<Execution>, StoreError> {
        self.conn
            .call(move |conn| {
                if !job_exists(conn, job_id)? {
                    return Ok(None);
                }
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM job_executions WHERE job_id = ?1
                     ORDER BY execution_time DESC, id ASC",
                    EXECUTION_COLUMNS
                ))?;
                let executions = stmt
                    .query_map([job_id], execution_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Some(executions))
            })
            .await
            .map_err(persistence)?
            .ok_or_else(|| StoreError::job_not_found(job_id))
    }

    async fn get_execution(&self, id: ExecutionId) -> Result<Execution, StoreError> {
        self.conn
            .call(move |conn| {
                let execution = conn
                    .query_row(
                        &format!("SELECT {} FROM job_executions WHERE id = ?1", EXECUTION_COLUMNS),
                        [id],
                        execution_from_row,
                    )
                    .optional()?;
                Ok(execution)
            })
            .await
            .map_err(persistence)?
            .ok_or_else(|| StoreError::execution_not_found(id))
    }

    async fn last_execution(&self, job_id: JobId) -> Result<Option<Execution>, StoreError> {
        self.conn
            .call(move |conn| {
                let execution = conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM job_executions WHERE job_id = ?1
                             ORDER BY execution_time DESC, id ASC LIMIT 1",
                            EXECUTION_COLUMNS
                        ),
                        [job_id],
                        execution_from_row,
                    )
                    .optional()?;
                Ok(execution)
            })
            .await
            .map_err(persistence)
    }
}

fn persistence(e: tokio_rusqlite::Error) -> StoreError {
    StoreError::Persistence(e.to_string())
}

fn job_exists(conn: &rusqlite::Connection, id: JobId) -> rusqlite::Result<bool> {
    conn.prepare_cached("SELECT 1 FROM jobs WHERE id = ?1")?
        .exists([id])
}

/// Fixed-width RFC 3339 so text order equals time order.
fn encode_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_time(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<Job> {
    let next_run_time: Option<String> = row.get(3)?;
    let status: String = row.get(4)?;

    Ok(Job {
        id: row.get(0)?,
        cron_expression: row.get(1)?,
        command: row.get(2)?,
        next_run_time: next_run_time
            .map(|value| decode_time(3, &value))
            .transpose()?,
        status: status
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?,
    })
}

fn execution_from_row(row: &Row<'_>) -> rusqlite::Result<Execution> {
    let execution_time: String = row.get(2)?;
    let status: String = row.get(3)?;

    Ok(Execution {
        id: row.get(0)?,
        job_id: row.get(1)?,
        execution_time: decode_time(2, &execution_time)?,
        status: status
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?,
        stdout: row.get(4)?,
        stderr: row.get(5)?,
    })
}
