//! Incremental activity cache sync for a running log
//!
//! Two independent feeds (a device-sync API and a historical export) are
//! folded into one canonical JSON store. The merge never loses activities,
//! every save is atomic and preceded by a backup, and read-only queries turn
//! the store into weekly and monthly volume summaries.

pub mod cli;
pub mod client;
pub mod config;
pub mod enrich;
pub mod error;
pub mod integrity;
pub mod logging;
pub mod merge;
pub mod models;
pub mod query;
pub mod sources;
pub mod storage;
pub mod sync;

pub use error::{format_user_error, Result, StrideError};
