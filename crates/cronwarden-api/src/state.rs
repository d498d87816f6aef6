//! Shared handler state.

use std::sync::Arc;

use cronwarden_scheduler::JobManager;

/// State shared by all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<JobManager>,
}

impl AppState {
    pub fn new(manager: Arc<JobManager>) -> Self {
        Self { manager }
    }
}
