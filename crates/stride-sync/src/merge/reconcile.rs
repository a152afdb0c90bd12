//! Field-level reconciliation of two records describing the same activity

use crate::models::{ActivityDetail, ActivityRecord, Source, Split};

/// Per-split overlap tolerance, in kilometers
const SPLIT_OVERLAP_KM: f64 = 0.1;

/// Feed a record's splits were taken from
fn splits_origin(record: &ActivityRecord) -> Source {
    record.detail.splits_source.unwrap_or(match record.source {
        Source::Both => Source::Primary,
        single => single,
    })
}

/// Secondary-side id carried by a record, if any
fn secondary_identity(record: &ActivityRecord) -> Option<String> {
    match record.source {
        Source::Secondary => Some(record.id.clone()),
        Source::Both => record.detail.secondary_id.clone(),
        Source::Primary => None,
    }
}

/// Index pairs of splits that cover the same stretch of the activity
fn overlapping(a: &[Split], b: &[Split]) -> Vec<usize> {
    let mut cum_a = 0.0;
    let mut cum_b = 0.0;
    let mut out = Vec::new();
    for (i, (sa, sb)) in a.iter().zip(b.iter()).enumerate() {
        cum_a += sa.distance_km;
        cum_b += sb.distance_km;
        if (sa.distance_km - sb.distance_km).abs() <= SPLIT_OVERLAP_KM + 1e-9
            && (cum_a - cum_b).abs() <= SPLIT_OVERLAP_KM + 1e-9
        {
            out.push(i);
        }
    }
    out
}

/// Choose the split sequence for a merged record
///
/// The side with more splits provides the sequence; on a tie the primary is
/// kept. Heart rate of overlapping splits prefers the primary and falls back
/// to the secondary.
pub fn choose_splits(
    primary: &ActivityRecord,
    secondary: &ActivityRecord,
) -> (Vec<Split>, Option<Source>) {
    let p = &primary.detail.splits;
    let s = &secondary.detail.splits;

    if s.len() > p.len() {
        let mut adopted = s.clone();
        for i in overlapping(p, s) {
            if let Some(hr) = p[i].avg_heart_rate {
                adopted[i].avg_heart_rate = Some(hr);
            }
        }
        return (adopted, Some(splits_origin(secondary)));
    }

    if p.is_empty() {
        return (Vec::new(), None);
    }

    let mut kept = p.clone();
    for i in overlapping(p, s) {
        if kept[i].avg_heart_rate.is_none() {
            kept[i].avg_heart_rate = s[i].avg_heart_rate;
        }
    }
    (kept, Some(splits_origin(primary)))
}

/// Merge two records into one tagged `both`
///
/// `primary` is the record whose provenance includes the primary feed; its
/// identity and non-null scalars win. `secondary` fills the gaps.
pub fn reconcile(primary: &ActivityRecord, secondary: &ActivityRecord) -> ActivityRecord {
    let p = &primary.detail;
    let s = &secondary.detail;
    let (splits, splits_source) = choose_splits(primary, secondary);

    ActivityRecord {
        id: primary.id.clone(),
        source: Source::Both,
        start_time: primary.start_time,
        distance_km: primary.distance_km,
        detail: ActivityDetail {
            name: p.name.clone().or_else(|| s.name.clone()),
            activity_type: p.activity_type.clone().or_else(|| s.activity_type.clone()),
            duration_seconds: p.duration_seconds.or(s.duration_seconds),
            avg_heart_rate: p.avg_heart_rate.or(s.avg_heart_rate),
            max_heart_rate: p.max_heart_rate.or(s.max_heart_rate),
            avg_cadence: p.avg_cadence.or(s.avg_cadence),
            elevation_gain_m: p.elevation_gain_m.or(s.elevation_gain_m),
            calories: p.calories.or(s.calories),
            suffer_score: p.suffer_score.or(s.suffer_score),
            secondary_id: secondary_identity(primary).or_else(|| secondary_identity(secondary)),
            splits,
            splits_source,
        },
    }
}
