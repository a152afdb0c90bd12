//! Backup listing and restore commands

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;

use crate::cli::OutputFormat;
use crate::config::Settings;
use crate::error::{Result, StrideError};

use super::print_json;

/// List backups, newest first
pub async fn list(settings: Settings, format: OutputFormat) -> Result<()> {
    let cache = settings.cache_file();
    let backups = cache.list_backups()?;

    if format.is_json() {
        let entries: Vec<_> = backups
            .iter()
            .map(|p| {
                json!({
                    "path": p.display().to_string(),
                    "bytes": fs::metadata(p).map(|m| m.len()).ok(),
                })
            })
            .collect();
        return print_json(&entries);
    }

    if backups.is_empty() {
        println!("No backups in {}", cache.backup_dir().display());
        return Ok(());
    }

    println!("Backups in {} (newest first):", cache.backup_dir().display());
    for path in &backups {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("?");
        let size = fs::metadata(path)
            .map(|m| format!("{:.1} KB", m.len() as f64 / 1024.0))
            .unwrap_or_else(|_| "-".to_string());
        println!("  {:<45} {:>10}", name, size);
    }
    Ok(())
}

/// Resolve a bare backup file name against the backup directory
fn resolve(backup_dir: &Path, file: &Path) -> PathBuf {
    if file.exists() || file.components().count() > 1 {
        file.to_path_buf()
    } else {
        backup_dir.join(file)
    }
}

/// Replace the cache with a backup
pub async fn restore(settings: Settings, file: PathBuf) -> Result<()> {
    let cache = settings.cache_file();
    let backup = resolve(cache.backup_dir(), &file);
    if !backup.exists() {
        return Err(StrideError::invalid_param(format!(
            "Backup not found: {}",
            backup.display()
        )));
    }

    let outcome = cache.restore(&backup)?;
    println!(
        "Restored {} activities from {}",
        outcome.count,
        backup.display()
    );
    if let Some(previous) = &outcome.backup {
        println!("Previous cache saved to {}", previous.display());
    }
    Ok(())
}
