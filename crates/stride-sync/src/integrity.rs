//! Data-integrity snapshot of the canonical store
//!
//! A baseline snapshot is saved after a known-good sync; later runs compare
//! against it and flag any metric that went down.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ensure_dir;
use crate::error::Result;
use crate::models::Source;
use crate::storage::CanonicalStore;

/// Distance at which a run counts as long
pub const LONG_RUN_KM: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayRange {
    pub first: NaiveDate,
    pub last: NaiveDate,
}

/// Counts describing how much data the store holds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrityStats {
    pub total: usize,
    pub by_source: BTreeMap<Source, usize>,
    /// Records whose provenance includes the primary feed
    pub primary_count: usize,
    pub primary_date_range: Option<DayRange>,
    pub with_hr: usize,
    pub with_splits_hr: usize,
    pub long_runs_total: usize,
    pub long_runs_with_hr: usize,
    pub long_runs_with_splits_hr: usize,
}

impl IntegrityStats {
    pub fn analyze(store: &CanonicalStore) -> Self {
        let mut stats = IntegrityStats {
            total: store.len(),
            ..Default::default()
        };

        let mut primary_days: Vec<NaiveDate> = Vec::new();
        for record in store.activities() {
            *stats.by_source.entry(record.source).or_insert(0) += 1;
            if record.source.includes(Source::Primary) {
                stats.primary_count += 1;
                primary_days.push(record.date());
            }

            let has_hr = record.detail.avg_heart_rate.is_some();
            let has_split_hr = record.has_split_hr();
            stats.with_hr += usize::from(has_hr);
            stats.with_splits_hr += usize::from(has_split_hr);

            if record.distance_km >= LONG_RUN_KM {
                stats.long_runs_total += 1;
                stats.long_runs_with_hr += usize::from(has_hr);
                stats.long_runs_with_splits_hr += usize::from(has_split_hr);
            }
        }

        stats.primary_date_range = match (primary_days.iter().min(), primary_days.iter().max()) {
            (Some(first), Some(last)) => Some(DayRange {
                first: *first,
                last: *last,
            }),
            _ => None,
        };
        stats
    }
}

/// Saved snapshot to compare later runs against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub timestamp: DateTime<Utc>,
    pub stats: IntegrityStats,
}

/// A metric that dropped relative to the baseline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityIssue {
    pub metric: &'static str,
    pub baseline: usize,
    pub current: usize,
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} dropped from {} to {} (lost {})",
            self.metric,
            self.baseline,
            self.current,
            self.baseline - self.current
        )
    }
}

/// Metrics that dropped since the baseline
pub fn compare(current: &IntegrityStats, baseline: &IntegrityStats) -> Vec<IntegrityIssue> {
    let checks = [
        ("total activities", baseline.total, current.total),
        ("primary activities", baseline.primary_count, current.primary_count),
        ("activities with heart rate", baseline.with_hr, current.with_hr),
        ("activities with split heart rate", baseline.with_splits_hr, current.with_splits_hr),
    ];
    checks
        .into_iter()
        .filter(|(_, before, now)| now < before)
        .map(|(metric, baseline, current)| IntegrityIssue {
            metric,
            baseline,
            current,
        })
        .collect()
}

pub fn save_baseline(path: &Path, stats: &IntegrityStats, at: DateTime<Utc>) -> Result<Baseline> {
    let baseline = Baseline {
        timestamp: at,
        stats: stats.clone(),
    };
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let temp = path.with_extension("json.tmp");
    fs::write(&temp, serde_json::to_string_pretty(&baseline)?)?;
    fs::rename(&temp, path)?;
    info!(path = %path.display(), total = stats.total, "saved integrity baseline");
    Ok(baseline)
}

/// Read the baseline; `None` when none was saved yet
pub fn load_baseline(path: &Path) -> Result<Option<Baseline>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&content)?))
}
