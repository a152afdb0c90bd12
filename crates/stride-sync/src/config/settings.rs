//! User settings loaded from `settings.json`

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::DEFAULT_BASE_URL;
use crate::enrich::EnrichmentPolicy;
use crate::error::{Result, StrideError};
use crate::merge::MatchTolerance;
use crate::query::VolumeThresholds;
use crate::storage::{default_storage_path, CacheFile, BASELINE_FILE_NAME};

pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// Every field is optional in the file; missing ones take their defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding the cache, its backups and the integrity baseline
    pub storage_dir: Option<PathBuf>,
    /// Explicit cache file; backups and baseline then live next to it
    pub cache_path: Option<PathBuf>,
    pub api_base_url: String,
    /// Secondary export file; the secondary feed is skipped when unset
    pub archive_path: Option<PathBuf>,
    pub activity_types: Vec<String>,
    pub match_tolerance: MatchTolerance,
    pub thresholds: VolumeThresholds,
    pub enrichment: EnrichmentPolicy,
    pub lookback_days: u32,
    pub request_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage_dir: None,
            cache_path: None,
            api_base_url: DEFAULT_BASE_URL.to_string(),
            archive_path: None,
            activity_types: vec!["running".to_string()],
            match_tolerance: MatchTolerance::default(),
            thresholds: VolumeThresholds::default(),
            enrichment: EnrichmentPolicy::default(),
            lookback_days: 7,
            request_delay_ms: 2000,
        }
    }
}

impl Settings {
    /// Load from the default config directory, falling back to defaults
    pub fn load() -> Result<Self> {
        let path = super::config_dir()?.join(SETTINGS_FILE_NAME);
        Self::load_from(&path)
    }

    /// Load from an explicit path; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content).map_err(|e| {
            StrideError::config(format!("Invalid settings in {}: {}", path.display(), e))
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.match_tolerance.time_window_minutes < 0 {
            return Err(StrideError::config("match_tolerance.time_window_minutes must be >= 0"));
        }
        if !(self.match_tolerance.distance_km >= 0.0) {
            return Err(StrideError::config("match_tolerance.distance_km must be >= 0"));
        }
        if self.thresholds.floor_km > self.thresholds.target_km {
            return Err(StrideError::config("thresholds.floor_km must not exceed target_km"));
        }
        Ok(())
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.storage_dir.clone().unwrap_or_else(default_storage_path)
    }

    pub fn cache_file(&self) -> CacheFile {
        match &self.cache_path {
            Some(path) => CacheFile::at(path.clone()),
            None => CacheFile::in_dir(self.storage_dir()),
        }
    }

    pub fn baseline_path(&self) -> PathBuf {
        match self.cache_path.as_deref().and_then(Path::parent) {
            Some(dir) => dir.join(BASELINE_FILE_NAME),
            None => self.storage_dir().join(BASELINE_FILE_NAME),
        }
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let settings = Settings::load_from(&temp.path().join(SETTINGS_FILE_NAME)).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.match_tolerance.time_window_minutes, 120);
        assert_eq!(settings.lookback_days, 7);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(SETTINGS_FILE_NAME);
        fs::write(
            &path,
            r#"{"storage_dir": "/tmp/stride", "match_tolerance": {"distance_km": 0.25}}"#,
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.storage_dir(), PathBuf::from("/tmp/stride"));
        assert_eq!(settings.match_tolerance.distance_km, 0.25);
        assert_eq!(settings.match_tolerance.time_window_minutes, 120);
        assert_eq!(settings.thresholds.floor_km, 15.0);
        assert!(settings
            .cache_file()
            .path()
            .ends_with("stride/unified-cache.json"));
    }

    #[test]
    fn test_cache_path_override() {
        let settings = Settings {
            cache_path: Some(PathBuf::from("/data/run/cache.json")),
            ..Default::default()
        };
        assert_eq!(settings.cache_file().path(), Path::new("/data/run/cache.json"));
        assert_eq!(settings.cache_file().backup_dir(), Path::new("/data/run/backups"));
        assert_eq!(
            settings.baseline_path(),
            PathBuf::from("/data/run/.data-integrity-baseline.json")
        );
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(SETTINGS_FILE_NAME);
        fs::write(&path, r#"{"thresholds": {"floor_km": 30, "target_km": 20}}"#).unwrap();
        assert!(matches!(
            Settings::load_from(&path).unwrap_err(),
            StrideError::Config(_)
        ));
    }
}
