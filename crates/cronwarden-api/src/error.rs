//! API error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use cronwarden_scheduler::SchedulerError;

/// A failed request, rendered as `{"error": "..."}`.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub SchedulerError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            err if err.is_validation() => StatusCode::BAD_REQUEST,
            SchedulerError::NotFound { .. } => StatusCode::NOT_FOUND,
            SchedulerError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        (status, Json(serde_json::json!({"error": self.0.to_string()}))).into_response()
    }
}

/// Errors starting or running the HTTP server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid listen address {0}: {1}")]
    InvalidAddress(String, std::net::AddrParseError),

    #[error("Failed to bind {0}: {1}")]
    Bind(String, std::io::Error),

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}
