//! Split backfill for long runs recorded as a single lap
//!
//! Candidates are recent long runs from the primary feed with few splits.
//! Per-second heart-rate and distance streams are cut into one split per
//! kilometer and folded back through the merge engine, so an enrichment
//! can never lower a record's completeness.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::models::{ActivityRecord, DetailStreams, FetchedActivity, Source, Split};
use crate::storage::CanonicalStore;

/// Remainders shorter than this are not emitted as a trailing split
const MIN_TRAILING_SPLIT_M: f64 = 10.0;

/// Which stored records are worth a stream fetch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentPolicy {
    pub min_distance_km: f64,
    pub max_existing_splits: usize,
    pub lookback_weeks: u32,
}

impl Default for EnrichmentPolicy {
    fn default() -> Self {
        Self {
            min_distance_km: 15.0,
            max_existing_splits: 3,
            lookback_weeks: 8,
        }
    }
}

impl EnrichmentPolicy {
    pub fn is_candidate(&self, record: &ActivityRecord, now: NaiveDateTime) -> bool {
        let cutoff = now - Duration::weeks(i64::from(self.lookback_weeks));
        record.source.includes(Source::Primary)
            && record.distance_km >= self.min_distance_km
            && record.start_time >= cutoff
            && record.detail.splits.len() <= self.max_existing_splits
    }
}

/// Stored records eligible for enrichment, newest first
pub fn candidates<'a>(
    store: &'a CanonicalStore,
    policy: &EnrichmentPolicy,
    now: NaiveDateTime,
) -> Vec<&'a ActivityRecord> {
    store
        .activities_newest_first()
        .into_iter()
        .filter(|record| policy.is_candidate(record, now))
        .collect()
}

fn build_split(streams: &DetailStreams, from: usize, to: usize) -> Split {
    let distance_m = streams.distance_m[to] - streams.distance_m[from];
    // one sample per second
    let seconds = (to - from) as f64;
    let hr: Vec<u32> = streams.heart_rate[from..=to]
        .iter()
        .copied()
        .filter(|hr| *hr > 0)
        .collect();
    let avg_heart_rate = if hr.is_empty() {
        None
    } else {
        let sum: u64 = hr.iter().map(|v| u64::from(*v)).sum();
        Some((sum as f64 / hr.len() as f64).round() as u32)
    };

    Split {
        distance_km: distance_m / 1000.0,
        duration_seconds: seconds,
        avg_speed_mps: (seconds > 0.0 && distance_m > 0.0).then(|| distance_m / seconds),
        avg_heart_rate,
    }
}

/// Cut streams into one split per completed kilometer plus the remainder
pub fn per_km_splits(streams: &DetailStreams) -> Vec<Split> {
    let len = streams.distance_m.len().min(streams.heart_rate.len());
    if len < 2 {
        return Vec::new();
    }

    let mut splits = Vec::new();
    let mut next_mark = 1000.0;
    let mut lap_start = 0;
    for i in 1..len {
        if streams.distance_m[i] >= next_mark {
            splits.push(build_split(streams, lap_start, i));
            lap_start = i;
            while next_mark <= streams.distance_m[i] {
                next_mark += 1000.0;
            }
        }
    }

    let last = len - 1;
    if last > lap_start
        && streams.distance_m[last] - streams.distance_m[lap_start] >= MIN_TRAILING_SPLIT_M
    {
        splits.push(build_split(streams, lap_start, last));
    }
    splits
}

/// Primary-tagged copy of `record` carrying `splits`, ready to be merged
pub fn enriched_record(record: &ActivityRecord, splits: Vec<Split>) -> FetchedActivity {
    let mut enriched = FetchedActivity::from(record.clone());
    enriched.source = Source::Primary;
    enriched.detail.splits = splits;
    enriched.detail.splits_source = Some(Source::Primary);
    enriched
}
