//! Cross-source identity: do two records describe the same physical activity?

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::models::ActivityRecord;

/// Slack for float noise when comparing kilometers (well below a meter)
const DISTANCE_EPSILON_KM: f64 = 1e-6;

/// Tolerances for the fuzzy cross-source match. Both bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchTolerance {
    pub time_window_minutes: i64,
    pub distance_km: f64,
}

impl Default for MatchTolerance {
    fn default() -> Self {
        Self {
            time_window_minutes: 120,
            distance_km: 0.1,
        }
    }
}

impl MatchTolerance {
    pub fn time_window(&self) -> Duration {
        Duration::minutes(self.time_window_minutes)
    }
}

/// True when `a` and `b` come from opposite feeds and agree on start time and distance
pub fn activities_match(a: &ActivityRecord, b: &ActivityRecord, tolerance: &MatchTolerance) -> bool {
    if !a.source.is_complementary(b.source) {
        return false;
    }

    let delta = a.start_time - b.start_time;
    let time_diff = if delta < Duration::zero() { -delta } else { delta };
    if time_diff > tolerance.time_window() {
        return false;
    }

    (a.distance_km - b.distance_km).abs() <= tolerance.distance_km + DISTANCE_EPSILON_KM
}

/// Ordering of candidate matches: closest start, then closest distance
pub(crate) fn match_score(a: &ActivityRecord, b: &ActivityRecord) -> (i64, u64) {
    let secs = (a.start_time - b.start_time).num_seconds().abs();
    let meters = ((a.distance_km - b.distance_km).abs() * 1000.0).round() as u64;
    (secs, meters)
}
