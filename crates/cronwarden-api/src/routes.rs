//! HTTP routes.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::info;

use cronwarden_protocols::{ExecutionId, Job, JobId, JobSummary};

use crate::error::ApiError;
use crate::state::AppState;

/// Body of create and edit requests.
#[derive(Debug, Deserialize)]
pub struct JobRequest {
    pub cron_expression: String,
    pub command: String,
}

/// One row of the job listing.
#[derive(Debug, Serialize)]
pub struct JobListEntry {
    #[serde(flatten)]
    pub job: Job,
    pub last_status: &'static str,
}

impl From<JobSummary> for JobListEntry {
    fn from(summary: JobSummary) -> Self {
        let last_status = summary.last_status_label();
        Self {
            job: summary.job,
            last_status,
        }
    }
}

type Shared = State<Arc<AppState>>;

/// Build the API router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/jobs", get(list_jobs).post(create_job))
        .route("/jobs/{id}", get(get_job).put(edit_job).delete(delete_job))
        .route("/jobs/{id}/toggle", post(toggle_job))
        .route("/jobs/{id}/run", post(run_job))
        .route("/jobs/{id}/executions", get(list_executions))
        .route("/executions/{id}", get(get_execution))
        .route("/executions/{id}/log", get(download_log))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health
async fn health(State(state): Shared) -> impl IntoResponse {
    let engine = state.manager.engine();
    let stats = engine.stats();
    Json(serde_json::json!({
        "status": if engine.is_shutting_down() { "stopping" } else { "ok" },
        "armed": stats.armed,
        "fired": stats.fired,
        "recorded": stats.recorded,
        "record_failures": stats.record_failures,
    }))
}

/// GET /jobs
async fn list_jobs(State(state): Shared) -> Result<impl IntoResponse, ApiError> {
    let jobs: Vec<JobListEntry> = state
        .manager
        .job_summaries()
        .await?
        .into_iter()
        .map(JobListEntry::from)
        .collect();
    Ok(Json(serde_json::json!({
        "count": jobs.len(),
        "jobs": jobs,
    })))
}

/// POST /jobs
async fn create_job(
    State(state): Shared,
    Json(req): Json<JobRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state
        .manager
        .create(&req.cron_expression, &req.command)
        .await?;
    info!(job_id = job.id, "Job created via API");
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "job": job }))))
}

/// GET /jobs/{id}
async fn get_job(
    State(state): Shared,
    Path(id): Path<JobId>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state.manager.get_job(id).await?;
    Ok(Json(serde_json::json!({ "job": job })))
}

/// PUT /jobs/{id}
async fn edit_job(
    State(state): Shared,
    Path(id): Path<JobId>,
    Json(req): Json<JobRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state
        .manager
        .edit(id, &req.cron_expression, &req.command)
        .await?;
    Ok(Json(serde_json::json!({ "job": job })))
}

/// DELETE /jobs/{id}
async fn delete_job(
    State(state): Shared,
    Path(id): Path<JobId>,
) -> Result<impl IntoResponse, ApiError> {
    state.manager.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /jobs/{id}/toggle
async fn toggle_job(
    State(state): Shared,
    Path(id): Path<JobId>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state.manager.toggle(id).await?;
    Ok(Json(serde_json::json!({ "job": job })))
}

/// POST /jobs/{id}/run
///
/// Responds once the command has finished.
async fn run_job(
    State(state): Shared,
    Path(id): Path<JobId>,
) -> Result<impl IntoResponse, ApiError> {
    let execution = state.manager.run_now(id).await?;
    Ok(Json(serde_json::json!({ "execution": execution })))
}

/// GET /jobs/{id}/executions
async fn list_executions(
    State(state): Shared,
    Path(id): Path<JobId>,
) -> Result<impl IntoResponse, ApiError> {
    let executions = state.manager.list_executions(id).await?;
    Ok(Json(serde_json::json!({
        "job_id": id,
        "count": executions.len(),
        "executions": executions,
    })))
}

/// GET /executions/{id}
async fn get_execution(
    State(state): Shared,
    Path(id): Path<ExecutionId>,
) -> Result<impl IntoResponse, ApiError> {
    let execution = state.manager.get_execution(id).await?;
    Ok(Json(serde_json::json!({ "execution": execution })))
}

/// GET /executions/{id}/log
async fn download_log(
    State(state): Shared,
    Path(id): Path<ExecutionId>,
) -> Result<impl IntoResponse, ApiError> {
    let export = state.manager.export_log(id).await?;
    let disposition = format!("attachment; filename=\"{}\"", export.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        export.content,
    ))
}

#[cfg(test)]
#[path = "routes_tests.rs"]
mod tests;
