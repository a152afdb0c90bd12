mod settings;

pub use settings::{Settings, SETTINGS_FILE_NAME};

use crate::error::{Result, StrideError};
use std::path::{Path, PathBuf};

/// Default configuration directory name
const CONFIG_DIR_NAME: &str = "stride";

/// Get the configuration directory path
/// Returns ~/.config/stride on Unix, ~/Library/Application Support/stride on macOS
pub fn config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|p| p.join(CONFIG_DIR_NAME))
        .ok_or_else(|| StrideError::config("Could not determine config directory"))
}

/// Get the data directory path for the cache and its backups
/// Returns ~/.local/share/stride on Unix, ~/Library/Application Support/stride on macOS
pub fn data_dir() -> Result<PathBuf> {
    dirs::data_local_dir()
        .map(|p| p.join(CONFIG_DIR_NAME))
        .ok_or_else(|| StrideError::config("Could not determine data directory"))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
