//! Merge engine
//!
//! Folds a batch of freshly fetched records into the canonical store:
//!
//! - exact identity (same source, same id) keeps the stored record unless
//!   the incoming one is strictly more complete
//! - a fuzzy cross-source match (start time and distance within
//!   [`MatchTolerance`]) reconciles both into one `both` record
//! - anything else is added as-is
//!
//! The store only ever grows. Incoming records are folded in a canonical
//! order so the result does not depend on the order adapters returned them.

mod matching;
mod reconcile;

pub use matching::{activities_match, MatchTolerance};
pub use reconcile::{choose_splits, reconcile};

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use crate::error::{Result, StrideError};
use crate::models::{ActivityRecord, FetchedActivity, MergeKey, Source};
use crate::storage::CanonicalStore;

/// A record dropped during validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRecord {
    pub id: String,
    pub source: Source,
    pub field: &'static str,
}

/// Outcome counters of one merge pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    pub before: usize,
    pub after: usize,
    /// New activities inserted as-is
    pub added: usize,
    /// Cross-source matches reconciled into `both`
    pub matched: usize,
    /// Stored records replaced or enriched by the same identity
    pub updated: usize,
    /// Incoming records that changed nothing
    pub unchanged: usize,
    pub rejected: Vec<RejectedRecord>,
}

impl MergeReport {
    pub fn changed(&self) -> bool {
        self.added + self.matched + self.updated > 0
    }
}

impl fmt::Display for MergeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} activities ({} added, {} matched, {} updated, {} unchanged, {} rejected)",
            self.before,
            self.after,
            self.added,
            self.matched,
            self.updated,
            self.unchanged,
            self.rejected.len()
        )
    }
}

/// Lookup structures over the in-progress store
#[derive(Default)]
struct CandidateIndex {
    by_identity: HashMap<MergeKey, MergeKey>,
    by_time: BTreeMap<NaiveDateTime, BTreeSet<MergeKey>>,
}

impl CandidateIndex {
    fn build(store: &CanonicalStore) -> Self {
        let mut index = Self {
            by_identity: store.identity_index(),
            by_time: BTreeMap::new(),
        };
        for record in store.activities() {
            index.add_time(record);
        }
        index
    }

    fn add_time(&mut self, record: &ActivityRecord) {
        self.by_time
            .entry(record.start_time)
            .or_default()
            .insert(record.merge_key());
    }

    fn insert(&mut self, record: &ActivityRecord) {
        let key = record.merge_key();
        for identity in record.identity_keys() {
            self.by_identity.insert(identity, key.clone());
        }
        self.add_time(record);
    }

    fn remove(&mut self, record: &ActivityRecord) {
        for identity in record.identity_keys() {
            self.by_identity.remove(&identity);
        }
        if let Some(keys) = self.by_time.get_mut(&record.start_time) {
            keys.remove(&record.merge_key());
            if keys.is_empty() {
                self.by_time.remove(&record.start_time);
            }
        }
    }

    fn lookup(&self, identity: &MergeKey) -> Option<&MergeKey> {
        self.by_identity.get(identity)
    }

    /// Stored keys whose start falls within the tolerance window of `start`
    fn window(&self, start: NaiveDateTime, tolerance: &MatchTolerance) -> Vec<MergeKey> {
        let span = tolerance.time_window();
        let (lo, hi) = match (start.checked_sub_signed(span), start.checked_add_signed(span)) {
            (Some(lo), Some(hi)) => (lo, hi),
            _ => return Vec::new(),
        };
        self.by_time
            .range(lo..=hi)
            .flat_map(|(_, keys)| keys.iter().cloned())
            .collect()
    }
}

/// Deterministic fold order for an incoming batch
fn canonical_order(a: &ActivityRecord, b: &ActivityRecord) -> std::cmp::Ordering {
    a.start_time
        .cmp(&b.start_time)
        .then_with(|| a.source.cmp(&b.source))
        .then_with(|| a.id.cmp(&b.id))
        .then_with(|| {
            let (ca, cb) = (a.completeness(), b.completeness());
            (cb.fields, cb.splits, cb.splits_with_hr).cmp(&(ca.fields, ca.splits, ca.splits_with_hr))
        })
        .then_with(|| {
            let encoded = |r: &ActivityRecord| serde_json::to_string(r).unwrap_or_default();
            encoded(a).cmp(&encoded(b))
        })
}

/// Reconciles fetched batches into a canonical store
#[derive(Debug, Clone, Default)]
pub struct MergeEngine {
    tolerance: MatchTolerance,
}

impl MergeEngine {
    pub fn new(tolerance: MatchTolerance) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> &MatchTolerance {
        &self.tolerance
    }

    /// Merge `batch` into `store`, returning the new store and what happened
    ///
    /// Fails with [`StrideError::DataLossDetected`] if the result would hold
    /// fewer activities than `store`.
    pub fn merge(
        &self,
        mut store: CanonicalStore,
        batch: Vec<FetchedActivity>,
    ) -> Result<(CanonicalStore, MergeReport)> {
        let mut report = MergeReport {
            before: store.len(),
            ..Default::default()
        };

        let mut incoming = Vec::with_capacity(batch.len());
        for fetched in batch {
            let (id, source) = (fetched.id.clone(), fetched.source);
            match fetched.validate() {
                Ok(record) => incoming.push(record),
                Err(StrideError::MalformedRecord { field, .. }) => {
                    warn!(id = %id, source = %source, field, "dropping malformed record");
                    report.rejected.push(RejectedRecord { id, source, field });
                }
                Err(e) => return Err(e),
            }
        }
        incoming.sort_by(canonical_order);

        let mut index = CandidateIndex::build(&store);
        for record in incoming {
            self.fold(&mut store, &mut index, record, &mut report);
        }

        report.after = store.len();
        if report.after < report.before {
            return Err(StrideError::DataLossDetected {
                before: report.before,
                after: report.after,
            });
        }
        Ok((store, report))
    }

    fn fold(
        &self,
        store: &mut CanonicalStore,
        index: &mut CandidateIndex,
        incoming: ActivityRecord,
        report: &mut MergeReport,
    ) {
        if let Some(stored_key) = index.lookup(&incoming.merge_key()).cloned() {
            if let Some(existing) = store.get(&stored_key).cloned() {
                self.fold_same_identity(store, index, existing, incoming, report);
                return;
            }
        }

        if let Some(candidate_key) = self.best_candidate(store, index, &incoming) {
            if let Some(existing) = store.get(&candidate_key).cloned() {
                let merged = if incoming.source == Source::Primary {
                    reconcile(&incoming, &existing)
                } else {
                    reconcile(&existing, &incoming)
                };
                debug!(
                    existing = %candidate_key,
                    incoming = %incoming.merge_key(),
                    date = %incoming.date(),
                    distance_km = incoming.distance_km,
                    "matched across sources"
                );
                self.replace(store, index, &existing, merged);
                report.matched += 1;
                return;
            }
        }

        debug!(key = %incoming.merge_key(), date = %incoming.date(), "adding new activity");
        index.insert(&incoming);
        store.insert(incoming);
        report.added += 1;
    }

    fn fold_same_identity(
        &self,
        store: &mut CanonicalStore,
        index: &mut CandidateIndex,
        existing: ActivityRecord,
        incoming: ActivityRecord,
        report: &mut MergeReport,
    ) {
        let replacement = if existing.source == Source::Both {
            let mut merged = match incoming.source {
                Source::Primary => reconcile(&incoming, &existing),
                _ => reconcile(&existing, &incoming),
            };
            if !merged.completeness().covers(&existing.completeness()) {
                merged.detail.splits = existing.detail.splits.clone();
                merged.detail.splits_source = existing.detail.splits_source;
            }
            let keeps_detail = merged.completeness().covers(&existing.completeness());
            (keeps_detail && merged != existing).then_some(merged)
        } else if incoming.completeness().strictly_exceeds(&existing.completeness()) {
            Some(incoming)
        } else {
            None
        };

        match replacement {
            Some(record) => {
                debug!(key = %existing.merge_key(), "updating stored activity");
                self.replace(store, index, &existing, record);
                report.updated += 1;
            }
            None => {
                debug!(key = %existing.merge_key(), "keeping stored activity");
                report.unchanged += 1;
            }
        }
    }

    /// Closest complementary record within tolerance, ties broken by key
    fn best_candidate(
        &self,
        store: &CanonicalStore,
        index: &CandidateIndex,
        incoming: &ActivityRecord,
    ) -> Option<MergeKey> {
        index
            .window(incoming.start_time, &self.tolerance)
            .into_iter()
            .filter_map(|key| store.get(&key).map(|record| (key, record)))
            .filter(|(_, record)| activities_match(record, incoming, &self.tolerance))
            .min_by(|(ka, ra), (kb, rb)| {
                matching::match_score(ra, incoming)
                    .cmp(&matching::match_score(rb, incoming))
                    .then_with(|| ka.cmp(kb))
            })
            .map(|(key, _)| key)
    }

    fn replace(
        &self,
        store: &mut CanonicalStore,
        index: &mut CandidateIndex,
        old: &ActivityRecord,
        new: ActivityRecord,
    ) {
        index.remove(old);
        store.remove(&old.merge_key());
        index.insert(&new);
        store.insert(new);
    }
}

/// Merge with the default tolerances
pub fn merge_batch(
    store: CanonicalStore,
    batch: Vec<FetchedActivity>,
) -> Result<(CanonicalStore, MergeReport)> {
    MergeEngine::default().merge(store, batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityDetail, Split};
    use chrono::NaiveDate;

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn fetched(id: &str, source: Source, start: NaiveDateTime, km: f64) -> FetchedActivity {
        FetchedActivity {
            id: id.to_string(),
            source,
            start_time: Some(start),
            distance_km: Some(km),
            detail: ActivityDetail::default(),
        }
    }

    fn km_splits(n: usize) -> Vec<Split> {
        (0..n)
            .map(|_| Split {
                distance_km: 1.0,
                duration_seconds: 300.0,
                avg_speed_mps: None,
                avg_heart_rate: None,
            })
            .collect()
    }

    #[test]
    fn test_new_records_are_added() {
        let batch = vec![
            fetched("A1", Source::Primary, at(4, 6, 0), 10.0),
            fetched("A2", Source::Primary, at(5, 6, 0), 8.0),
        ];
        let (store, report) = merge_batch(CanonicalStore::new(), batch).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(report.added, 2);
    }

    #[test]
    fn test_cross_source_match_in_same_batch() {
        let mut secondary = fetched("B7", Source::Secondary, at(4, 6, 5), 21.1);
        secondary.detail.splits = km_splits(21);
        let batch = vec![secondary, fetched("A1", Source::Primary, at(4, 6, 0), 21.1)];

        let (store, report) = merge_batch(CanonicalStore::new(), batch).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(report.added, 1);
        assert_eq!(report.matched, 1);
        let record = store.activities().next().unwrap();
        assert_eq!(record.source, Source::Both);
        assert_eq!(record.id, "A1");
        assert_eq!(record.detail.splits.len(), 21);
    }

    #[test]
    fn test_same_source_duplicates_are_not_fuzzy_merged() {
        let batch = vec![
            fetched("A1", Source::Primary, at(4, 6, 0), 5.0),
            fetched("A2", Source::Primary, at(4, 6, 30), 5.0),
        ];
        let (store, _) = merge_batch(CanonicalStore::new(), batch).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_less_complete_refetch_keeps_stored() {
        let mut rich = fetched("A1", Source::Primary, at(4, 6, 0), 10.0);
        rich.detail.avg_heart_rate = Some(150);
        let (store, _) = merge_batch(CanonicalStore::new(), vec![rich]).unwrap();

        let sparse = fetched("A1", Source::Primary, at(4, 6, 0), 10.0);
        let (store, report) = merge_batch(store, vec![sparse]).unwrap();
        assert_eq!(report.unchanged, 1);
        assert_eq!(store.activities().next().unwrap().detail.avg_heart_rate, Some(150));
    }

    #[test]
    fn test_more_complete_refetch_replaces() {
        let sparse = fetched("A1", Source::Primary, at(4, 6, 0), 10.0);
        let (store, _) = merge_batch(CanonicalStore::new(), vec![sparse]).unwrap();

        let mut rich = fetched("A1", Source::Primary, at(4, 6, 0), 10.0);
        rich.detail.splits = km_splits(10);
        let (store, report) = merge_batch(store, vec![rich]).unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(store.activities().next().unwrap().detail.splits.len(), 10);
    }

    #[test]
    fn test_malformed_records_rejected() {
        let mut missing = fetched("A3", Source::Primary, at(4, 6, 0), 5.0);
        missing.distance_km = None;
        let batch = vec![fetched("A1", Source::Primary, at(4, 6, 0), 10.0), missing];
        let (store, report) = merge_batch(CanonicalStore::new(), batch).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].field, "distance_km");
    }

    #[test]
    fn test_both_record_absorbs_no_second_secondary() {
        let batch = vec![
            fetched("A1", Source::Primary, at(4, 6, 0), 10.0),
            fetched("B1", Source::Secondary, at(4, 6, 1), 10.0),
            fetched("B2", Source::Secondary, at(4, 6, 2), 10.0),
        ];
        let (store, report) = merge_batch(CanonicalStore::new(), batch).unwrap();
        assert_eq!(report.matched, 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_secondary_key_rewritten_when_primary_arrives() {
        let (store, _) = merge_batch(
            CanonicalStore::new(),
            vec![fetched("B7", Source::Secondary, at(4, 6, 5), 21.1)],
        )
        .unwrap();
        let (store, _) = merge_batch(store, vec![fetched("A1", Source::Primary, at(4, 6, 0), 21.1)]).unwrap();

        let key = MergeKey {
            source: Source::Primary,
            id: "A1".to_string(),
        };
        let record = store.get(&key).unwrap();
        assert_eq!(record.source, Source::Both);
        assert_eq!(record.detail.secondary_id.as_deref(), Some("B7"));
        assert_eq!(store.len(), 1);
    }

    fn hr_splits(n: usize, km: f64, hr: u32) -> Vec<Split> {
        (0..n)
            .map(|i| Split {
                distance_km: km,
                duration_seconds: km * 300.0,
                avg_speed_mps: None,
                avg_heart_rate: Some(hr + i as u32),
            })
            .collect()
    }

    fn both_long_run(splits: Vec<Split>) -> CanonicalStore {
        let mut archive = fetched("B7", Source::Secondary, at(4, 6, 5), 21.1);
        archive.detail.splits = splits;
        let batch = vec![fetched("A1", Source::Primary, at(4, 6, 0), 21.1), archive];
        let (store, report) = merge_batch(CanonicalStore::new(), batch).unwrap();
        assert_eq!(report.matched, 1);
        store
    }

    #[test]
    fn test_refetched_laps_do_not_replace_per_km_splits_of_both_record() {
        let mut per_km = hr_splits(20, 1.0, 140);
        per_km.extend(hr_splits(1, 1.1, 165));
        let store = both_long_run(per_km);

        let mut laps = fetched("A1", Source::Primary, at(4, 6, 0), 21.1);
        laps.detail.splits = vec![
            Split {
                distance_km: 7.0,
                duration_seconds: 2100.0,
                avg_speed_mps: None,
                avg_heart_rate: Some(150),
            },
            Split {
                distance_km: 7.0,
                duration_seconds: 2100.0,
                avg_speed_mps: None,
                avg_heart_rate: Some(152),
            },
            Split {
                distance_km: 7.1,
                duration_seconds: 2130.0,
                avg_speed_mps: None,
                avg_heart_rate: Some(158),
            },
        ];
        let (after, report) = merge_batch(store.clone(), vec![laps]).unwrap();

        assert_eq!(report.updated, 0);
        assert_eq!(report.unchanged, 1);
        assert_eq!(after, store);
        let record = after.activities().next().unwrap();
        assert_eq!(record.detail.splits.len(), 21);
        assert_eq!(record.detail.splits_source, Some(Source::Secondary));
    }

    #[test]
    fn test_refetch_without_splits_keeps_single_split_of_both_record() {
        let store = both_long_run(hr_splits(1, 21.1, 150));
        assert_eq!(store.activities().next().unwrap().detail.splits.len(), 1);

        let bare = fetched("A1", Source::Primary, at(4, 6, 0), 21.1);
        let (after, report) = merge_batch(store.clone(), vec![bare]).unwrap();

        assert_eq!(report.unchanged, 1);
        let record = after.activities().next().unwrap();
        assert_eq!(record.detail.splits.len(), 1);
        assert_eq!(record.detail.splits[0].avg_heart_rate, Some(150));
    }

    #[test]
    fn test_refetch_enriching_both_record_still_updates() {
        let store = both_long_run(hr_splits(21, 1.0, 140));

        let mut richer = fetched("A1", Source::Primary, at(4, 6, 0), 21.1);
        richer.detail.avg_cadence = Some(172.0);
        let (after, report) = merge_batch(store, vec![richer]).unwrap();

        assert_eq!(report.updated, 1);
        let record = after.activities().next().unwrap();
        assert_eq!(record.detail.avg_cadence, Some(172.0));
        assert_eq!(record.detail.splits.len(), 21);
    }

    #[test]
    fn test_equal_completeness_duplicates_resolve_independent_of_order() {
        let mut low = fetched("A1", Source::Primary, at(4, 6, 0), 10.0);
        low.detail.avg_heart_rate = Some(150);
        let mut high = fetched("A1", Source::Primary, at(4, 6, 0), 10.0);
        high.detail.avg_heart_rate = Some(160);

        let (forward, _) = merge_batch(CanonicalStore::new(), vec![low.clone(), high.clone()]).unwrap();
        let (backward, _) = merge_batch(CanonicalStore::new(), vec![high, low]).unwrap();

        assert_eq!(forward, backward);
        assert_eq!(forward.len(), 1);
        assert_eq!(forward.activities().next().unwrap().detail.avg_heart_rate, Some(150));
    }

    #[test]
    fn test_report_display() {
        let report = MergeReport {
            before: 500,
            after: 503,
            added: 3,
            ..Default::default()
        };
        assert!(report.to_string().starts_with("500 -> 503"));
        assert!(report.changed());
    }
}
