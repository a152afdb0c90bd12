//! Atomic persistence of the canonical store
//!
//! Every save snapshots the current file into `backups/`, refuses to write a
//! store with fewer activities than before, writes a temp file next to the
//! canonical path, verifies it parses, then renames it into place. Readers
//! therefore only ever see the previous or the new complete file.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{error, info, warn};

use crate::error::{Result, StrideError};

use super::cache::CanonicalStore;

/// Canonical file name inside the storage directory
pub const CACHE_FILE_NAME: &str = "unified-cache.json";

/// Backup directory name inside the storage directory
pub const BACKUP_DIR_NAME: &str = "backups";

const BACKUP_PREFIX: &str = "unified-cache-";

/// Owner of the canonical cache file and its backups
#[derive(Debug, Clone)]
pub struct CacheFile {
    path: PathBuf,
    backup_dir: PathBuf,
}

/// A fully written and verified temp file waiting to replace the canonical file
#[derive(Debug)]
#[must_use = "a staged write does nothing until committed"]
pub struct StagedWrite {
    temp_path: PathBuf,
    target: PathBuf,
    backup: Option<PathBuf>,
    count: usize,
}

/// Result of a committed save
#[derive(Debug, Clone, PartialEq)]
pub struct SaveOutcome {
    pub path: PathBuf,
    pub backup: Option<PathBuf>,
    pub count: usize,
}

impl CacheFile {
    /// Cache file at `<dir>/unified-cache.json` with backups in `<dir>/backups`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            path: dir.join(CACHE_FILE_NAME),
            backup_dir: dir.join(BACKUP_DIR_NAME),
        }
    }

    /// Cache file at an explicit path; backups go next to it
    pub fn at(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let backup_dir = path
            .parent()
            .map(|p| p.join(BACKUP_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from(BACKUP_DIR_NAME));
        Self { path, backup_dir }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }

    /// Read the canonical file; a missing file is an empty store
    pub fn load(&self) -> Result<CanonicalStore> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "no cache yet, starting empty");
            return Ok(CanonicalStore::new());
        }
        self.read_store(&self.path).map_err(|e| match e {
            StrideError::Json(parse) => StrideError::StoreCorrupted {
                path: self.path.clone(),
                reason: parse.to_string(),
                latest_backup: self.latest_backup().ok().flatten(),
            },
            other => other,
        })
    }

    fn read_store(&self, path: &Path) -> Result<CanonicalStore> {
        let file = File::open(path)?;
        let store = serde_json::from_reader(BufReader::new(file))?;
        Ok(store)
    }

    /// Back up, guard, write and verify; the canonical file is not touched yet
    pub fn stage(&self, store: &CanonicalStore, previous_count: usize) -> Result<StagedWrite> {
        let backup = self.snapshot()?;

        let count = store.len();
        if count < previous_count {
            error!(
                before = previous_count,
                after = count,
                "refusing to save a smaller store"
            );
            return Err(StrideError::DataLossDetected {
                before: previous_count,
                after: count,
            });
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.temp_path();
        discard_temp(&temp_path, write_temp(&temp_path, store))?;

        let written = discard_temp(&temp_path, self.read_store(&temp_path)).map_err(|e| {
            StrideError::StoreCorrupted {
                path: temp_path.clone(),
                reason: format!("staged file failed verification: {}", e),
                latest_backup: backup.clone(),
            }
        })?;
        if written.len() != count {
            return discard_temp(
                &temp_path,
                Err(StrideError::StoreCorrupted {
                    path: temp_path.clone(),
                    reason: format!("staged file holds {} activities, expected {}", written.len(), count),
                    latest_backup: backup,
                }),
            );
        }

        Ok(StagedWrite {
            temp_path,
            target: self.path.clone(),
            backup,
            count,
        })
    }

    /// Persist `store`, refusing to shrink below `previous_count`
    pub fn save(&self, store: &CanonicalStore, previous_count: usize) -> Result<SaveOutcome> {
        self.stage(store, previous_count)?.commit()
    }

    /// Copy the current canonical file to a new timestamped backup
    ///
    /// Returns `None` when there is nothing on disk to back up.
    pub fn snapshot(&self) -> Result<Option<PathBuf>> {
        if !self.path.exists() {
            return Ok(None);
        }
        fs::create_dir_all(&self.backup_dir)?;

        let stamp = backup_stamp(Local::now());
        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                format!("{}{}.json", BACKUP_PREFIX, stamp)
            } else {
                format!("{}{}-{}.json", BACKUP_PREFIX, stamp, attempt)
            };
            let backup_path = self.backup_dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&backup_path) {
                Ok(mut out) => {
                    let mut input = File::open(&self.path)?;
                    io::copy(&mut input, &mut out)?;
                    out.sync_all()?;
                    info!(backup = %backup_path.display(), "created backup");
                    return Ok(Some(backup_path));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Backups, newest first
    pub fn list_backups(&self) -> Result<Vec<PathBuf>> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }
        let mut backups: Vec<(std::time::SystemTime, PathBuf)> = Vec::new();
        for entry in fs::read_dir(&self.backup_dir)? {
            let entry = entry?;
            let path = entry.path();
            let is_backup = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(BACKUP_PREFIX) && n.ends_with(".json"))
                .unwrap_or(false);
            if is_backup {
                let modified = entry.metadata()?.modified()?;
                backups.push((modified, path));
            }
        }
        backups.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
        Ok(backups.into_iter().map(|(_, p)| p).collect())
    }

    pub fn latest_backup(&self) -> Result<Option<PathBuf>> {
        Ok(self.list_backups()?.into_iter().next())
    }

    /// Replace the canonical file with a backup
    ///
    /// This is the explicit operator override of the shrink guard. The
    /// current file is itself backed up first.
    pub fn restore(&self, backup: &Path) -> Result<SaveOutcome> {
        let store = self.read_store(backup).map_err(|e| StrideError::StoreCorrupted {
            path: backup.to_path_buf(),
            reason: e.to_string(),
            latest_backup: None,
        })?;
        warn!(backup = %backup.display(), activities = store.len(), "restoring cache from backup");
        self.save(&store, 0)
    }
}

impl StagedWrite {
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn backup(&self) -> Option<&Path> {
        self.backup.as_deref()
    }

    /// Atomically move the staged file over the canonical path
    pub fn commit(self) -> Result<SaveOutcome> {
        fs::rename(&self.temp_path, &self.target)?;
        info!(path = %self.target.display(), activities = self.count, "saved cache");
        Ok(SaveOutcome {
            path: self.target,
            backup: self.backup,
            count: self.count,
        })
    }
}

fn backup_stamp(now: DateTime<Local>) -> String {
    now.format("%Y%m%d_%H%M%S_%3f").to_string()
}

fn write_temp(temp_path: &Path, store: &CanonicalStore) -> Result<()> {
    let file = File::create(temp_path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, store)?;
    writer.write_all(b"\n")?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}

/// Remove a half-written temp file when `result` is an error
fn discard_temp<T>(temp_path: &Path, result: Result<T>) -> Result<T> {
    if result.is_err() {
        if let Err(e) = fs::remove_file(temp_path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %temp_path.display(), error = %e, "could not remove staged file");
            }
        }
    }
    result
}
