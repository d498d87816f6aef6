//! # cronwarden API
//!
//! JSON HTTP interface over the job lifecycle manager.
//!
//! ```text
//! GET    /health                   - engine counters
//! GET    /jobs                     - jobs with last run status
//! POST   /jobs                     - create job
//! GET    /jobs/{id}                - get job
//! PUT    /jobs/{id}                - edit job
//! DELETE /jobs/{id}                - delete job and its history
//! POST   /jobs/{id}/toggle         - activate/deactivate
//! POST   /jobs/{id}/run            - run now, wait for the result
//! GET    /jobs/{id}/executions     - execution history, newest first
//! GET    /executions/{id}          - one execution
//! GET    /executions/{id}/log      - plain-text log download
//! ```

pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use error::{ApiError, ServerError};
pub use routes::create_router;
pub use server::{ApiConfig, ApiServer};
pub use state::AppState;
