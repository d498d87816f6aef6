//! # cronwarden Store
//!
//! Persistence for jobs and their execution history.
//!
//! ## Backends
//!
//! - [`SqliteJobStore`] - durable store (`jobs` / `job_executions` tables,
//!   executions cascade-deleted with their job)
//! - [`MemoryJobStore`] - in-process store for tests and throwaway runs

mod memory;
mod schema;
mod sqlite;

pub use memory::MemoryJobStore;
pub use sqlite::SqliteJobStore;
