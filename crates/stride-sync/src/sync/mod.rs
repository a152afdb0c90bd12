//! Sync orchestration: fetch, merge, guard, persist
//!
//! One invocation loads the canonical store, fetches every configured source
//! concurrently, folds the results through the merge engine and saves the
//! result atomically. Any source failure aborts the run before anything is
//! written.

pub mod rate_limiter;

pub use rate_limiter::RateLimiter;

use std::collections::BTreeMap;

use chrono::{Local, NaiveDateTime, Utc};
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::enrich::{self, EnrichmentPolicy};
use crate::error::{Result, StrideError};
use crate::merge::{MergeEngine, MergeReport};
use crate::models::FetchedActivity;
use crate::sources::{ActivitySource, FetchWindow, StreamSource};
use crate::storage::{CacheFile, CanonicalStore, SaveOutcome};

/// Options for one sync invocation
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Lookback window in days
    pub days: u32,
    /// Fetch and merge without writing
    pub dry_run: bool,
    /// End of the fetch window; defaults to the local wall clock
    pub until: Option<NaiveDateTime>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            days: 7,
            dry_run: false,
            until: None,
        }
    }
}

/// Outcome of a sync invocation
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub window: FetchWindow,
    /// Records returned per source name
    pub fetched: BTreeMap<String, usize>,
    pub merge: MergeReport,
    /// `None` on dry runs
    pub saved: Option<SaveOutcome>,
}

/// Outcome of a split backfill
#[derive(Debug, Clone)]
pub struct EnrichReport {
    pub candidates: usize,
    pub fetched: usize,
    pub skipped: usize,
    pub merge: MergeReport,
    pub saved: Option<SaveOutcome>,
}

/// Drives sources, the merge engine and the store manager
pub struct SyncEngine {
    cache: CacheFile,
    sources: Vec<Box<dyn ActivitySource>>,
    merger: MergeEngine,
}

impl SyncEngine {
    pub fn new(cache: CacheFile, merger: MergeEngine) -> Self {
        Self {
            cache,
            sources: Vec::new(),
            merger,
        }
    }

    /// Add a source; sources are fetched concurrently
    pub fn with_source(mut self, source: Box<dyn ActivitySource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn cache(&self) -> &CacheFile {
        &self.cache
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Fetch every source and return the combined batch
    ///
    /// Records are re-tagged with the adapter's own provenance. The first
    /// failing source, in registration order, aborts the whole fetch.
    async fn fetch_all(
        &self,
        window: &FetchWindow,
    ) -> Result<(Vec<FetchedActivity>, BTreeMap<String, usize>)> {
        let results = join_all(self.sources.iter().map(|source| async move {
            let result = source.fetch(window).await;
            (source, result)
        }))
        .await;

        let mut batch = Vec::new();
        let mut counts = BTreeMap::new();
        for (source, result) in results {
            let records = result.map_err(|e| {
                error!(source = source.name(), error = %e, "fetch failed, aborting sync");
                match e {
                    e @ StrideError::SourceUnavailable { .. } => e,
                    other => StrideError::source_unavailable(source.name(), other.to_string()),
                }
            })?;
            counts.insert(source.name().to_string(), records.len());
            let tag = source.source();
            for mut record in records {
                if record.source != tag {
                    debug!(id = %record.id, from = %record.source, to = %tag, "re-tagging record");
                    record.source = tag;
                }
                batch.push(record);
            }
        }
        Ok((batch, counts))
    }

    /// Run one incremental sync
    pub async fn run(&self, opts: &SyncOptions) -> Result<SyncReport> {
        let until = opts.until.unwrap_or_else(|| Local::now().naive_local());
        let window = FetchWindow::lookback(until, opts.days);
        info!(
            since = %window.since,
            until = %window.until,
            sources = ?self.source_names(),
            dry_run = opts.dry_run,
            "starting sync"
        );

        let store = self.cache.load()?;
        let (batch, fetched) = self.fetch_all(&window).await?;

        let (mut merged, report) = self.merge(store, batch)?;
        let now = Utc::now();
        for source in &self.sources {
            merged.record_sync(source.source(), now);
        }
        merged.refresh_metadata(now);
        info!(%report, "merge complete");

        let saved = self.persist(&merged, report.before, opts.dry_run)?;
        Ok(SyncReport {
            window,
            fetched,
            merge: report,
            saved,
        })
    }

    /// Backfill per-kilometer splits for long runs recorded as one lap
    pub async fn enrich(
        &self,
        streams: &dyn StreamSource,
        policy: &EnrichmentPolicy,
        dry_run: bool,
    ) -> Result<EnrichReport> {
        let store = self.cache.load()?;
        let now = Local::now().naive_local();
        let candidates = enrich::candidates(&store, policy, now);
        info!(candidates = candidates.len(), "enrichment candidates");

        let mut batch = Vec::new();
        let mut skipped = 0;
        for record in &candidates {
            match streams.fetch_streams(&record.id).await {
                Ok(Some(s)) => {
                    let splits = enrich::per_km_splits(&s);
                    if splits.len() > record.detail.splits.len() {
                        batch.push(enrich::enriched_record(record, splits));
                    } else {
                        debug!(id = %record.id, "streams yield no finer splits");
                        skipped += 1;
                    }
                }
                Ok(None) => {
                    debug!(id = %record.id, "no stream data");
                    skipped += 1;
                }
                Err(e) => {
                    warn!(id = %record.id, error = %e, "could not fetch streams, skipping");
                    skipped += 1;
                }
            }
        }
        let candidate_count = candidates.len();
        let fetched = batch.len();

        let (mut merged, report) = self.merge(store, batch)?;
        merged.refresh_metadata(Utc::now());
        info!(%report, "enrichment merge complete");

        let saved = self.persist(&merged, report.before, dry_run)?;
        Ok(EnrichReport {
            candidates: candidate_count,
            fetched,
            skipped,
            merge: report,
            saved,
        })
    }

    fn merge(
        &self,
        store: CanonicalStore,
        batch: Vec<FetchedActivity>,
    ) -> Result<(CanonicalStore, MergeReport)> {
        self.merger.merge(store, batch).map_err(|e| {
            if let StrideError::DataLossDetected { before, after } = &e {
                error!(before, after, "merge would lose activities, nothing written");
            }
            e
        })
    }

    fn persist(
        &self,
        store: &CanonicalStore,
        previous_count: usize,
        dry_run: bool,
    ) -> Result<Option<SaveOutcome>> {
        if dry_run {
            info!(activities = store.len(), "dry run, cache not written");
            return Ok(None);
        }
        self.cache.save(store, previous_count).map(Some)
    }
}
