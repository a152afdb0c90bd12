//! Secondary adapter: historical-import export file
//!
//! The export is a JSON document `{"activities": [...]}` produced by a
//! separate import job. Each entry carries the secondary service's id, a
//! local start timestamp, distance in kilometers and optional effort data.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, StrideError};
use crate::models::activity::parse_start_time;
use crate::models::{ActivityDetail, FetchedActivity, Source, Split};

use super::{ActivitySource, FetchWindow};

/// Export ids are numeric in some dumps and strings in others
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArchiveId {
    Number(u64),
    Text(String),
}

impl std::fmt::Display for ArchiveId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveId::Number(n) => write!(f, "{}", n),
            ArchiveId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveSplit {
    pub distance_km: f64,
    #[serde(default, alias = "moving_time")]
    pub duration_seconds: f64,
    #[serde(default, alias = "average_speed")]
    pub avg_speed_mps: Option<f64>,
    #[serde(default, alias = "average_heartrate")]
    pub avg_hr: Option<f64>,
}

/// One activity in the export file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveActivity {
    #[serde(alias = "id")]
    pub strava_id: ArchiveId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub activity_type: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub distance_km: Option<f64>,
    #[serde(default, alias = "moving_time")]
    pub duration_seconds: Option<f64>,
    #[serde(default)]
    pub avg_hr: Option<f64>,
    #[serde(default)]
    pub max_hr: Option<f64>,
    #[serde(default)]
    pub elevation_gain_m: Option<f64>,
    #[serde(default)]
    pub calories: Option<f64>,
    #[serde(default)]
    pub suffer_score: Option<f64>,
    #[serde(default)]
    pub splits: Vec<ArchiveSplit>,
}

#[derive(Debug, Deserialize)]
struct ArchiveDocument {
    #[serde(default)]
    activities: Vec<ArchiveActivity>,
}

impl ArchiveSplit {
    fn to_split(&self) -> Split {
        Split {
            distance_km: self.distance_km,
            duration_seconds: self.duration_seconds,
            avg_speed_mps: self.avg_speed_mps.filter(|s| *s > 0.0),
            avg_heart_rate: self.avg_hr.filter(|hr| *hr > 0.0).map(|hr| hr.round() as u32),
        }
    }
}

impl ArchiveActivity {
    pub fn start_time(&self) -> Option<chrono::NaiveDateTime> {
        self.date.as_deref().and_then(parse_start_time)
    }

    /// Convert into an adapter record tagged as secondary
    pub fn into_fetched(self) -> FetchedActivity {
        let start_time = self.start_time();
        let splits = self.splits.iter().map(ArchiveSplit::to_split).collect();
        FetchedActivity {
            id: self.strava_id.to_string(),
            source: Source::Secondary,
            start_time,
            distance_km: self.distance_km,
            detail: ActivityDetail {
                name: self.name,
                activity_type: self.activity_type,
                duration_seconds: self.duration_seconds,
                avg_heart_rate: self.avg_hr.filter(|hr| *hr > 0.0).map(|hr| hr.round() as u32),
                max_heart_rate: self.max_hr.filter(|hr| *hr > 0.0).map(|hr| hr.round() as u32),
                elevation_gain_m: self.elevation_gain_m,
                calories: self.calories.map(|c| c.round() as u32),
                suffer_score: self.suffer_score,
                splits,
                ..Default::default()
            },
        }
    }
}

/// Reads the secondary export file
#[derive(Debug, Clone)]
pub struct ArchiveSource {
    path: PathBuf,
}

impl ArchiveSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<ArchiveDocument> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            StrideError::source_unavailable(self.name(), format!("{}: {}", self.path.display(), e))
        })?;
        serde_json::from_slice(&bytes).map_err(|e| {
            StrideError::source_unavailable(
                self.name(),
                format!("{} is not a valid export: {}", self.path.display(), e),
            )
        })
    }
}

#[async_trait]
impl ActivitySource for ArchiveSource {
    fn name(&self) -> &str {
        "archive"
    }

    fn source(&self) -> Source {
        Source::Secondary
    }

    async fn fetch(&self, window: &FetchWindow) -> Result<Vec<FetchedActivity>> {
        let doc = self.read_document().await?;
        let total = doc.activities.len();

        // Undated entries pass through so the merge step can reject them loudly.
        let fetched: Vec<FetchedActivity> = doc
            .activities
            .into_iter()
            .filter(|a| a.start_time().map_or(true, |t| window.contains(t)))
            .map(ArchiveActivity::into_fetched)
            .collect();

        debug!(total, in_window = fetched.len(), "filtered export by window");
        info!(path = %self.path.display(), count = fetched.len(), "read archive activities");
        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    const EXPORT: &str = r#"{
        "activities": [
            {"strava_id": 7001, "name": "Long Run", "date": "2026-01-04T06:05:00",
             "distance_km": 21.1, "avg_hr": 151, "suffer_score": 88,
             "splits": [{"distance_km": 1.0, "moving_time": 300, "average_heartrate": 140.4}]},
            {"strava_id": "7002", "date": "2025-06-01T07:00:00", "distance_km": 8.0},
            {"strava_id": 7003, "distance_km": 5.0}
        ]
    }"#;

    fn window() -> FetchWindow {
        let day = |d| NaiveDate::from_ymd_opt(2026, 1, d).unwrap();
        FetchWindow::new(
            day(1).and_hms_opt(0, 0, 0).unwrap(),
            day(8).and_hms_opt(0, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_fetch_filters_by_window() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("export.json");
        std::fs::write(&path, EXPORT).unwrap();

        let fetched = ArchiveSource::new(&path).fetch(&window()).await.unwrap();
        let ids: Vec<&str> = fetched.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["7001", "7003"]);

        let long_run = &fetched[0];
        assert_eq!(long_run.source, Source::Secondary);
        assert_eq!(long_run.detail.suffer_score, Some(88.0));
        assert_eq!(long_run.detail.splits[0].avg_heart_rate, Some(140));
        assert!(fetched[1].start_time.is_none());
    }

    #[tokio::test]
    async fn test_missing_file_is_source_unavailable() {
        let temp = TempDir::new().unwrap();
        let source = ArchiveSource::new(temp.path().join("nope.json"));
        let err = source.fetch(&window()).await.unwrap_err();
        assert!(matches!(err, StrideError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_garbage_file_is_source_unavailable() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("export.json");
        std::fs::write(&path, "<html>").unwrap();
        let err = ArchiveSource::new(&path).fetch(&window()).await.unwrap_err();
        assert!(matches!(err, StrideError::SourceUnavailable { .. }));
    }
}
