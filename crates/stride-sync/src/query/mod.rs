//! Read-only, time-bucketed summaries of the canonical store
//!
//! Every function here takes the store by shared reference and is
//! deterministic for a given store.

mod buckets;

pub use buckets::{MonthKey, WeekKey};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::ActivityRecord;
use crate::storage::CanonicalStore;

/// Average number of weeks in a calendar month
pub const WEEKS_PER_MONTH: f64 = 4.33;

/// Weekly volume thresholds in kilometers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeThresholds {
    pub floor_km: f64,
    pub target_km: f64,
}

impl Default for VolumeThresholds {
    fn default() -> Self {
        Self {
            floor_km: 15.0,
            target_km: 20.0,
        }
    }
}

impl VolumeThresholds {
    pub fn classify(&self, distance_km: f64) -> VolumeStatus {
        if distance_km < self.floor_km {
            VolumeStatus::BelowFloor
        } else if distance_km < self.target_km {
            VolumeStatus::Marginal
        } else {
            VolumeStatus::Adequate
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeStatus {
    BelowFloor,
    Marginal,
    Adequate,
}

impl VolumeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeStatus::BelowFloor => "below floor",
            VolumeStatus::Marginal => "marginal",
            VolumeStatus::Adequate => "adequate",
        }
    }
}

impl fmt::Display for VolumeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyBucket {
    pub week_key: String,
    pub iso_year: i32,
    pub week: u32,
    pub total_distance_km: f64,
    pub run_count: usize,
    pub avg_heart_rate: Option<u32>,
    pub dates: Vec<NaiveDate>,
    pub status: VolumeStatus,
}

impl WeeklyBucket {
    pub fn key(&self) -> WeekKey {
        WeekKey {
            iso_year: self.iso_year,
            week: self.week,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyBucket {
    pub month_key: String,
    pub total_distance_km: f64,
    pub run_count: usize,
    pub avg_km_per_week: f64,
    pub status: VolumeStatus,
}

#[derive(Default)]
struct Accumulator {
    distance_km: f64,
    runs: usize,
    hr: Vec<u32>,
    dates: BTreeSet<NaiveDate>,
}

impl Accumulator {
    fn add(&mut self, record: &ActivityRecord) {
        self.distance_km += record.distance_km;
        self.runs += 1;
        if let Some(hr) = record.detail.avg_heart_rate {
            self.hr.push(hr);
        }
        self.dates.insert(record.date());
    }

    fn avg_hr(&self) -> Option<u32> {
        if self.hr.is_empty() {
            return None;
        }
        let sum: u64 = self.hr.iter().map(|v| u64::from(*v)).sum();
        Some((sum as f64 / self.hr.len() as f64).round() as u32)
    }
}

/// Runs only; records without a type are assumed to be runs
fn is_run(record: &ActivityRecord) -> bool {
    record
        .detail
        .activity_type
        .as_deref()
        .map_or(true, |t| t.to_ascii_lowercase().contains("run"))
}

/// Round to whole meters
fn round_km(km: f64) -> f64 {
    (km * 1000.0).round() / 1000.0
}

/// Weekly volume, ascending by ISO week, optionally limited to one ISO year
pub fn weekly_summary(
    store: &CanonicalStore,
    year: Option<i32>,
    thresholds: &VolumeThresholds,
) -> Vec<WeeklyBucket> {
    let mut weeks: BTreeMap<WeekKey, Accumulator> = BTreeMap::new();
    // Sorted input keeps float sums independent of map iteration order.
    for record in sorted_runs(store) {
        let key = WeekKey::of(record.date());
        if year.map_or(true, |y| key.iso_year == y) {
            weeks.entry(key).or_default().add(record);
        }
    }

    weeks
        .into_iter()
        .map(|(key, acc)| {
            let total = round_km(acc.distance_km);
            WeeklyBucket {
                week_key: key.to_string(),
                iso_year: key.iso_year,
                week: key.week,
                total_distance_km: total,
                run_count: acc.runs,
                avg_heart_rate: acc.avg_hr(),
                dates: acc.dates.into_iter().collect(),
                status: thresholds.classify(total),
            }
        })
        .collect()
}

/// Monthly volume, ascending by month
pub fn monthly_summary(store: &CanonicalStore, thresholds: &VolumeThresholds) -> Vec<MonthlyBucket> {
    let mut months: BTreeMap<MonthKey, Accumulator> = BTreeMap::new();
    for record in sorted_runs(store) {
        months.entry(MonthKey::of(record.date())).or_default().add(record);
    }

    months
        .into_iter()
        .map(|(key, acc)| {
            let total = round_km(acc.distance_km);
            let per_week = round_km(total / WEEKS_PER_MONTH);
            MonthlyBucket {
                month_key: key.to_string(),
                total_distance_km: total,
                run_count: acc.runs,
                avg_km_per_week: per_week,
                status: thresholds.classify(per_week),
            }
        })
        .collect()
}

/// Consecutive most-recent weeks at or above the floor
///
/// `weeks` must be ascending, as returned by [`weekly_summary`]. A calendar
/// week with no runs breaks the streak.
pub fn current_streak(weeks: &[WeeklyBucket], thresholds: &VolumeThresholds) -> usize {
    let mut streak = 0;
    let mut expected: Option<WeekKey> = None;
    for bucket in weeks.iter().rev() {
        let key = bucket.key();
        if expected.map_or(false, |e| e != key) {
            break;
        }
        if bucket.total_distance_km < thresholds.floor_km {
            break;
        }
        streak += 1;
        expected = key.previous();
        if expected.is_none() {
            break;
        }
    }
    streak
}

fn sorted_runs(store: &CanonicalStore) -> Vec<&ActivityRecord> {
    let mut runs: Vec<&ActivityRecord> = store.activities().filter(|r| is_run(r)).collect();
    runs.sort_by(|a, b| {
        a.start_time
            .cmp(&b.start_time)
            .then_with(|| a.merge_key().cmp(&b.merge_key()))
    });
    runs
}
