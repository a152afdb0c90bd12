//! Storage layer for the canonical activity cache
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/stride/
//! ├── unified-cache.json                    # canonical store, newest activity first
//! ├── .data-integrity-baseline.json         # last accepted integrity snapshot
//! └── backups/
//!     ├── unified-cache-20260104_060509_123.json
//!     └── ...
//! ```
//!
//! ## Concurrent Access
//!
//! The cache file is written atomically (temp file + rename), so readers
//! always see a complete document.

mod cache;
mod cache_file;

pub use cache::{CanonicalStore, DateRange, SourceCounts, StoreMetadata};
pub use cache_file::{CacheFile, SaveOutcome, StagedWrite, BACKUP_DIR_NAME, CACHE_FILE_NAME};

use std::path::PathBuf;

/// Integrity baseline file name inside the storage directory
pub const BASELINE_FILE_NAME: &str = ".data-integrity-baseline.json";

/// Get the default storage path
pub fn default_storage_path() -> PathBuf {
    crate::config::data_dir().unwrap_or_else(|_| PathBuf::from("stride"))
}

/// Get the default canonical cache path
pub fn default_cache_path() -> PathBuf {
    default_storage_path().join(CACHE_FILE_NAME)
}
