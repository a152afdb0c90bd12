//! In-memory canonical store and its on-disk JSON shape

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ActivityRecord, MergeKey, Source};

/// Earliest and latest activity start
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub first: NaiveDateTime,
    pub last: NaiveDateTime,
}

/// Count of records per provenance value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCounts {
    pub primary: usize,
    pub secondary: usize,
    pub both: usize,
}

impl SourceCounts {
    pub fn get(&self, source: Source) -> usize {
        match source {
            Source::Primary => self.primary,
            Source::Secondary => self.secondary,
            Source::Both => self.both,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreMetadata {
    /// Last successful fetch per single source
    #[serde(default)]
    pub last_sync: BTreeMap<Source, DateTime<Utc>>,
    #[serde(default)]
    pub build_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source_counts: SourceCounts,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    #[serde(default)]
    pub total_activities: usize,
}

/// The full dataset, keyed by merge key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CacheDocument", into = "CacheDocument")]
pub struct CanonicalStore {
    pub metadata: StoreMetadata,
    activities: BTreeMap<MergeKey, ActivityRecord>,
}

/// Serialized form: activities as an array, newest first
#[derive(Serialize, Deserialize)]
struct CacheDocument {
    #[serde(default)]
    metadata: StoreMetadata,
    #[serde(default)]
    activities: Vec<ActivityRecord>,
}

impl TryFrom<CacheDocument> for CanonicalStore {
    type Error = String;

    fn try_from(doc: CacheDocument) -> Result<Self, Self::Error> {
        let mut store = CanonicalStore {
            metadata: doc.metadata,
            activities: BTreeMap::new(),
        };
        for record in doc.activities {
            let key = record.merge_key();
            if store.activities.insert(key.clone(), record).is_some() {
                return Err(format!("duplicate activity {}", key));
            }
        }
        Ok(store)
    }
}

impl From<CanonicalStore> for CacheDocument {
    fn from(store: CanonicalStore) -> Self {
        let mut activities: Vec<ActivityRecord> = store.activities.into_values().collect();
        activities.sort_by(|a, b| {
            b.start_time
                .cmp(&a.start_time)
                .then_with(|| a.merge_key().cmp(&b.merge_key()))
        });
        CacheDocument {
            metadata: store.metadata,
            activities,
        }
    }
}

impl CanonicalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from records; later duplicates of a key replace earlier ones
    pub fn from_records(records: impl IntoIterator<Item = ActivityRecord>) -> Self {
        let mut store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    pub fn get(&self, key: &MergeKey) -> Option<&ActivityRecord> {
        self.activities.get(key)
    }

    pub fn contains_key(&self, key: &MergeKey) -> bool {
        self.activities.contains_key(key)
    }

    pub fn activities(&self) -> impl Iterator<Item = &ActivityRecord> {
        self.activities.values()
    }

    /// Activities sorted by start time, newest first
    pub fn activities_newest_first(&self) -> Vec<&ActivityRecord> {
        let mut all: Vec<&ActivityRecord> = self.activities.values().collect();
        all.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        all
    }

    pub(crate) fn insert(&mut self, record: ActivityRecord) -> Option<ActivityRecord> {
        self.activities.insert(record.merge_key(), record)
    }

    pub(crate) fn remove(&mut self, key: &MergeKey) -> Option<ActivityRecord> {
        self.activities.remove(key)
    }

    /// Count records per provenance value
    pub fn source_counts(&self) -> SourceCounts {
        let mut counts = SourceCounts::default();
        for record in self.activities.values() {
            match record.source {
                Source::Primary => counts.primary += 1,
                Source::Secondary => counts.secondary += 1,
                Source::Both => counts.both += 1,
            }
        }
        counts
    }

    pub fn date_range(&self) -> Option<DateRange> {
        let first = self.activities.values().map(|a| a.start_time).min()?;
        let last = self.activities.values().map(|a| a.start_time).max()?;
        Some(DateRange { first, last })
    }

    /// Recompute derived metadata after a merge
    pub fn refresh_metadata(&mut self, now: DateTime<Utc>) {
        self.metadata.source_counts = self.source_counts();
        self.metadata.date_range = self.date_range();
        self.metadata.total_activities = self.len();
        self.metadata.build_time = Some(now);
    }

    pub fn record_sync(&mut self, source: Source, at: DateTime<Utc>) {
        self.metadata.last_sync.insert(source, at);
    }

    /// Lookup table from every identity key to the stored merge key
    pub(crate) fn identity_index(&self) -> HashMap<MergeKey, MergeKey> {
        let mut index = HashMap::new();
        for (key, record) in &self.activities {
            for identity in record.identity_keys() {
                index.insert(identity, key.clone());
            }
        }
        index
    }
}
