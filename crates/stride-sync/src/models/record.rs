//! Canonical activity record and its provenance tag
//!
//! `ActivityRecord` is what the cache stores. Adapters hand over
//! `FetchedActivity` values, which may lack identity fields; `validate`
//! is the only way to turn one into a record.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StrideError};

/// Cumulative tolerance for split partitions, in kilometers
pub const SPLIT_PARTITION_TOLERANCE_KM: f64 = 0.1;

/// Which feed(s) an activity came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Device-sync feed
    Primary,
    /// Historical-import feed
    Secondary,
    /// Reported by both feeds and reconciled into one record
    Both,
}

impl Source {
    /// Whether two single-source tags denote opposite feeds
    pub fn is_complementary(self, other: Source) -> bool {
        matches!(
            (self, other),
            (Source::Primary, Source::Secondary) | (Source::Secondary, Source::Primary)
        )
    }

    /// Whether this provenance includes the given single source
    pub fn includes(self, other: Source) -> bool {
        self == other || self == Source::Both
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Primary => "primary",
            Source::Secondary => "secondary",
            Source::Both => "both",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One per-interval entry of an activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Split {
    /// Interval distance in kilometers
    pub distance_km: f64,
    /// Interval duration in seconds
    pub duration_seconds: f64,
    /// Average speed in m/s
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_speed_mps: Option<f64>,
    /// Average heart rate in bpm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_heart_rate: Option<u32>,
}

impl Split {
    /// Pace in seconds per kilometer, derived from speed or duration
    pub fn pace_sec_per_km(&self) -> Option<f64> {
        match self.avg_speed_mps {
            Some(speed) if speed > 0.0 => Some(1000.0 / speed),
            _ if self.distance_km > 0.0 => Some(self.duration_seconds / self.distance_km),
            _ => None,
        }
    }
}

/// Optional fields whose presence depends on source capability
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_heart_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_heart_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_cadence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation_gain_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calories: Option<u32>,
    /// Subjective effort score, only reported by the secondary feed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffer_score: Option<f64>,
    /// Id of the secondary record folded into a `both` record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_id: Option<String>,
    #[serde(default)]
    pub splits: Vec<Split>,
    /// Feed the splits were taken from, when it differs from the record's identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub splits_source: Option<Source>,
}

impl ActivityDetail {
    /// Number of populated optional scalar fields
    fn populated_fields(&self) -> usize {
        [
            self.name.is_some(),
            self.activity_type.is_some(),
            self.duration_seconds.is_some(),
            self.avg_heart_rate.is_some(),
            self.max_heart_rate.is_some(),
            self.avg_cadence.is_some(),
            self.elevation_gain_m.is_some(),
            self.calories.is_some(),
            self.suffer_score.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }
}

/// How much information a record carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completeness {
    pub fields: usize,
    pub splits: usize,
    pub splits_with_hr: usize,
}

impl Completeness {
    /// True when no axis is smaller
    pub fn covers(&self, other: &Completeness) -> bool {
        self.fields >= other.fields
            && self.splits >= other.splits
            && self.splits_with_hr >= other.splits_with_hr
    }

    /// True when no axis is smaller and at least one is larger
    pub fn strictly_exceeds(&self, other: &Completeness) -> bool {
        self.covers(other) && *self != *other
    }
}

/// Identity under which a record is stored
///
/// `primary` and `both` records are keyed by their primary id, `secondary`
/// records by their secondary id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MergeKey {
    pub source: Source,
    pub id: String,
}

impl fmt::Display for MergeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.id)
    }
}

/// One tracked workout as stored in the canonical cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: String,
    pub source: Source,
    pub start_time: NaiveDateTime,
    pub distance_km: f64,
    #[serde(flatten)]
    pub detail: ActivityDetail,
}

impl ActivityRecord {
    pub fn merge_key(&self) -> MergeKey {
        let source = match self.source {
            Source::Secondary => Source::Secondary,
            Source::Primary | Source::Both => Source::Primary,
        };
        MergeKey {
            source,
            id: self.id.clone(),
        }
    }

    /// Keys under which an exact id lookup should find this record
    pub fn identity_keys(&self) -> Vec<MergeKey> {
        let mut keys = vec![self.merge_key()];
        if self.source == Source::Both {
            if let Some(secondary_id) = &self.detail.secondary_id {
                keys.push(MergeKey {
                    source: Source::Secondary,
                    id: secondary_id.clone(),
                });
            }
        }
        keys
    }

    pub fn completeness(&self) -> Completeness {
        Completeness {
            fields: self.detail.populated_fields(),
            splits: self.detail.splits.len(),
            splits_with_hr: self
                .detail
                .splits
                .iter()
                .filter(|s| s.avg_heart_rate.is_some())
                .count(),
        }
    }

    /// Whether the record carries per-split heart rate
    pub fn has_split_hr(&self) -> bool {
        self.detail.splits.iter().any(|s| s.avg_heart_rate.is_some())
    }

    /// Splits are ordered and partition the total distance within tolerance
    pub fn splits_are_consistent(&self) -> bool {
        let splits = &self.detail.splits;
        if splits.is_empty() {
            return true;
        }
        if splits.iter().any(|s| s.distance_km < 0.0) {
            return false;
        }
        let cumulative: f64 = splits.iter().map(|s| s.distance_km).sum();
        (cumulative - self.distance_km).abs() <= SPLIT_PARTITION_TOLERANCE_KM + 1e-9
    }

    pub fn date(&self) -> chrono::NaiveDate {
        self.start_time.date()
    }
}

/// Record as handed over by an adapter, before validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedActivity {
    pub id: String,
    pub source: Source,
    #[serde(default)]
    pub start_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub distance_km: Option<f64>,
    #[serde(flatten)]
    pub detail: ActivityDetail,
}

impl FetchedActivity {
    /// Convert into a record, failing when identity fields are missing
    pub fn validate(self) -> Result<ActivityRecord> {
        let start_time = self.start_time.ok_or_else(|| StrideError::MalformedRecord {
            id: self.id.clone(),
            field: "start_time",
        })?;
        let distance_km = match self.distance_km {
            Some(d) if d.is_finite() && d >= 0.0 => d,
            _ => {
                return Err(StrideError::MalformedRecord {
                    id: self.id,
                    field: "distance_km",
                })
            }
        };

        Ok(ActivityRecord {
            id: self.id,
            source: self.source,
            start_time,
            distance_km,
            detail: self.detail,
        })
    }
}

impl From<ActivityRecord> for FetchedActivity {
    fn from(record: ActivityRecord) -> Self {
        Self {
            id: record.id,
            source: record.source,
            start_time: Some(record.start_time),
            distance_km: Some(record.distance_km),
            detail: record.detail,
        }
    }
}
