//! # cronwarden Protocols
//!
//! Records and interfaces shared by every cronwarden crate.
//! Contains only definitions - no storage or scheduling logic.
//!
//! ## Contents
//!
//! - [`Job`] / [`Execution`] - the two persisted records
//! - [`Outcome`] - the normalized result of one command invocation
//! - [`JobStore`] - persistence interface implemented by the store crate
//! - [`render_log`] - byte-exact plain-text log export

pub mod error;
pub mod export;
pub mod store;
pub mod types;

pub use error::{ParseStatusError, RecordKind, StoreError};
pub use export::{log_file_name, render_log};
pub use store::JobStore;
pub use types::*;
