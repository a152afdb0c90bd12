//! Activity data models for the device-sync API
//!
//! These structures mirror the JSON returned by the activity list, split and
//! detail endpoints, and convert into the canonical record shape.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::record::{ActivityDetail, FetchedActivity, Source, Split};

/// Timestamp formats seen in `startTimeLocal`
const START_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%SZ",
];

/// Parse a source-local timestamp in any of the known formats
pub fn parse_start_time(value: &str) -> Option<NaiveDateTime> {
    START_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

/// Activity summary returned from the activity list endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySummary {
    /// Unique activity identifier
    pub activity_id: u64,

    /// User-provided or auto-generated activity name
    #[serde(default)]
    pub activity_name: Option<String>,

    /// Start time in local timezone
    #[serde(default)]
    pub start_time_local: Option<String>,

    /// Activity type information
    #[serde(default)]
    pub activity_type: Option<ActivityType>,

    /// Distance in meters
    #[serde(default)]
    pub distance: Option<f64>,

    /// Duration in seconds
    #[serde(default)]
    pub duration: Option<f64>,

    /// Calories burned
    #[serde(default)]
    pub calories: Option<f64>,

    /// Average heart rate in bpm
    #[serde(default, rename = "averageHR")]
    pub average_hr: Option<f64>,

    /// Maximum heart rate in bpm
    #[serde(default, rename = "maxHR")]
    pub max_hr: Option<f64>,

    /// Average speed in m/s
    #[serde(default)]
    pub average_speed: Option<f64>,

    /// Total elevation gain in meters
    #[serde(default)]
    pub elevation_gain: Option<f64>,

    /// Average running cadence in steps per minute
    #[serde(default)]
    pub average_running_cadence_in_steps_per_minute: Option<f64>,
}

/// Activity type information
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityType {
    /// Type key (e.g., "running", "cycling", "walking")
    pub type_key: String,

    #[serde(default)]
    pub type_id: Option<u64>,
}

/// Lap breakdown from the splits endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySplits {
    #[serde(default)]
    pub activity_id: Option<u64>,

    #[serde(default, rename = "lapDTOs")]
    pub lap_dtos: Vec<LapDto>,
}

/// One lap as reported by the device
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LapDto {
    #[serde(default)]
    pub lap_index: Option<u32>,

    /// Distance in meters
    #[serde(default)]
    pub distance: Option<f64>,

    /// Duration in seconds
    #[serde(default)]
    pub duration: Option<f64>,

    /// Average speed in m/s
    #[serde(default)]
    pub average_speed: Option<f64>,

    #[serde(default, rename = "averageHR")]
    pub average_hr: Option<f64>,

    #[serde(default, rename = "maxHR")]
    pub max_hr: Option<f64>,

    #[serde(default)]
    pub average_run_cadence: Option<f64>,
}

impl LapDto {
    /// Convert to a split; laps without a distance are dropped
    pub fn to_split(&self) -> Option<Split> {
        let distance_m = self.distance?;
        Some(Split {
            distance_km: distance_m / 1000.0,
            duration_seconds: self.duration.unwrap_or(0.0),
            avg_speed_mps: self.average_speed.filter(|s| *s > 0.0),
            avg_heart_rate: self.average_hr.filter(|hr| *hr > 0.0).map(|hr| hr.round() as u32),
        })
    }
}

/// Descriptor of one metric column in the detail endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricDescriptor {
    pub key: String,
    pub metrics_index: usize,
}

/// One sample row in the detail endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailSample {
    #[serde(default)]
    pub metrics: Vec<Option<f64>>,
}

/// Raw response of the activity detail endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDetailMetrics {
    #[serde(default)]
    pub metric_descriptors: Vec<MetricDescriptor>,

    #[serde(default)]
    pub activity_detail_metrics: Vec<DetailSample>,
}

/// Per-second heart rate and cumulative distance streams
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailStreams {
    /// Heart rate per sample, 0 when missing
    pub heart_rate: Vec<u32>,
    /// Cumulative distance in meters per sample
    pub distance_m: Vec<f64>,
}

impl ActivityDetailMetrics {
    /// Extract heart-rate and distance streams; `None` when either is missing
    pub fn streams(&self) -> Option<DetailStreams> {
        let index_of = |key: &str| {
            self.metric_descriptors
                .iter()
                .find(|d| d.key == key)
                .map(|d| d.metrics_index)
        };
        let hr_index = index_of("directHeartRate")?;
        let distance_index = index_of("sumDistance")?;

        if self.activity_detail_metrics.is_empty() {
            return None;
        }

        let mut streams = DetailStreams::default();
        for sample in &self.activity_detail_metrics {
            let value = |idx: usize| sample.metrics.get(idx).copied().flatten();
            streams
                .heart_rate
                .push(value(hr_index).map(|hr| hr.max(0.0) as u32).unwrap_or(0));
            streams.distance_m.push(value(distance_index).unwrap_or(0.0));
        }
        Some(streams)
    }
}

impl ActivitySummary {
    /// Get the activity type key
    pub fn type_key(&self) -> String {
        self.activity_type
            .as_ref()
            .map(|t| t.type_key.clone())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Get distance in kilometers, rounded to 10 m
    pub fn distance_km(&self) -> Option<f64> {
        self.distance.map(|d| (d / 10.0).round() / 100.0)
    }

    /// Convert into an adapter record tagged as primary
    pub fn into_fetched(self, splits: Option<ActivitySplits>) -> FetchedActivity {
        let splits: Vec<Split> = splits
            .map(|s| s.lap_dtos.iter().filter_map(LapDto::to_split).collect())
            .unwrap_or_default();

        FetchedActivity {
            id: self.activity_id.to_string(),
            source: Source::Primary,
            start_time: self.start_time_local.as_deref().and_then(parse_start_time),
            distance_km: self.distance_km(),
            detail: ActivityDetail {
                activity_type: Some(self.type_key()),
                name: self.activity_name,
                duration_seconds: self.duration,
                avg_heart_rate: self.average_hr.map(|hr| hr.round() as u32),
                max_heart_rate: self.max_hr.map(|hr| hr.round() as u32),
                avg_cadence: self.average_running_cadence_in_steps_per_minute,
                elevation_gain_m: self.elevation_gain,
                calories: self.calories.map(|c| c.round() as u32),
                splits,
                ..Default::default()
            },
        }
    }
}
