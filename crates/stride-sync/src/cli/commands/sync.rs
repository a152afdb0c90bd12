//! Sync, enrich and status commands

use std::path::PathBuf;

use serde_json::json;
use tracing::info;

use crate::cli::OutputFormat;
use crate::client::ApiClient;
use crate::config::Settings;
use crate::error::{Result, StrideError};
use crate::merge::MergeEngine;
use crate::models::Source;
use crate::sources::{ArchiveSource, ConnectSource};
use crate::storage::CanonicalStore;
use crate::sync::{SyncEngine, SyncOptions, SyncReport};

use super::print_json;

/// Which feeds a sync should pull from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceSelection {
    #[default]
    All,
    PrimaryOnly,
    SecondaryOnly,
}

impl SourceSelection {
    pub fn from_flags(primary_only: bool, secondary_only: bool) -> Self {
        match (primary_only, secondary_only) {
            (true, false) => SourceSelection::PrimaryOnly,
            (false, true) => SourceSelection::SecondaryOnly,
            _ => SourceSelection::All,
        }
    }
}

fn connect_source(settings: &Settings, token: Option<String>) -> Result<ConnectSource> {
    let token = token.ok_or(StrideError::NotAuthenticated)?;
    let client = ApiClient::new(&settings.api_base_url, Some(token))?;
    Ok(ConnectSource::new(client, settings.activity_types.clone())
        .with_min_delay(settings.request_delay()))
}

fn build_engine(
    settings: &Settings,
    token: Option<String>,
    selection: SourceSelection,
) -> Result<SyncEngine> {
    let mut engine = SyncEngine::new(
        settings.cache_file(),
        MergeEngine::new(settings.match_tolerance),
    );

    if selection != SourceSelection::SecondaryOnly {
        engine = engine.with_source(Box::new(connect_source(settings, token)?));
    }

    if selection != SourceSelection::PrimaryOnly {
        match &settings.archive_path {
            Some(path) => engine = engine.with_source(Box::new(ArchiveSource::new(path))),
            None if selection == SourceSelection::SecondaryOnly => {
                return Err(StrideError::config(
                    "No archive configured. Pass --archive or set archive_path in settings.json",
                ));
            }
            None => info!("no archive configured, skipping secondary source"),
        }
    }
    Ok(engine)
}

/// Run an incremental sync
pub async fn run(
    mut settings: Settings,
    token: Option<String>,
    days: Option<u32>,
    archive: Option<PathBuf>,
    selection: SourceSelection,
    dry_run: bool,
    format: OutputFormat,
) -> Result<()> {
    if archive.is_some() {
        settings.archive_path = archive;
    }
    let engine = build_engine(&settings, token, selection)?;
    let opts = SyncOptions {
        days: days.unwrap_or(settings.lookback_days),
        dry_run,
        until: None,
    };

    if dry_run && !format.is_json() {
        println!("Dry run mode - no changes will be made");
    }

    let report = engine.run(&opts).await?;
    print_sync_report(&report, format)
}

fn print_sync_report(report: &SyncReport, format: OutputFormat) -> Result<()> {
    let merge = &report.merge;
    if format.is_json() {
        return print_json(&json!({
            "window": {"since": report.window.since, "until": report.window.until},
            "fetched": report.fetched,
            "before": merge.before,
            "after": merge.after,
            "added": merge.added,
            "matched": merge.matched,
            "updated": merge.updated,
            "unchanged": merge.unchanged,
            "rejected": merge.rejected.len(),
            "saved": report.saved.as_ref().map(|s| s.path.display().to_string()),
            "backup": report.saved.as_ref().and_then(|s| s.backup.as_ref()).map(|b| b.display().to_string()),
        }));
    }

    println!(
        "Window: {} to {}",
        report.window.since.format("%Y-%m-%d %H:%M"),
        report.window.until.format("%Y-%m-%d %H:%M")
    );
    for (name, count) in &report.fetched {
        println!("  {:<10} {} fetched", name, count);
    }
    println!();
    println!("Activities:   {} -> {}", merge.before, merge.after);
    println!("  Added:      {}", merge.added);
    println!("  Matched:    {}", merge.matched);
    println!("  Updated:    {}", merge.updated);
    println!("  Unchanged:  {}", merge.unchanged);
    if !merge.rejected.is_empty() {
        println!("  Rejected:   {}", merge.rejected.len());
        for r in &merge.rejected {
            println!("    {} {} (missing {})", r.source, r.id, r.field);
        }
    }

    match &report.saved {
        Some(saved) => {
            println!("\nSaved: {}", saved.path.display());
            if let Some(backup) = &saved.backup {
                println!("Backup: {}", backup.display());
            }
        }
        None => println!("\nDry run - cache not written"),
    }
    Ok(())
}

/// Backfill per-kilometer splits for recent long runs
pub async fn enrich(
    settings: Settings,
    token: Option<String>,
    dry_run: bool,
    format: OutputFormat,
) -> Result<()> {
    let streams = connect_source(&settings, token)?;
    let engine = SyncEngine::new(
        settings.cache_file(),
        MergeEngine::new(settings.match_tolerance),
    );
    let report = engine.enrich(&streams, &settings.enrichment, dry_run).await?;

    if format.is_json() {
        return print_json(&json!({
            "candidates": report.candidates,
            "fetched": report.fetched,
            "skipped": report.skipped,
            "updated": report.merge.updated,
            "saved": report.saved.as_ref().map(|s| s.path.display().to_string()),
        }));
    }

    println!("Candidates: {}", report.candidates);
    println!("  With finer splits: {}", report.fetched);
    println!("  Skipped:           {}", report.skipped);
    println!("  Updated:           {}", report.merge.updated);
    if report.saved.is_none() {
        println!("\nDry run - cache not written");
    }
    Ok(())
}

/// Show what the cache holds
pub async fn status(settings: Settings, format: OutputFormat) -> Result<()> {
    let cache = settings.cache_file();
    let store = cache.load()?;

    if format.is_json() {
        return print_json(&json!({
            "path": cache.path().display().to_string(),
            "metadata": store.metadata,
            "source_counts": store.source_counts(),
            "total": store.len(),
        }));
    }

    println!("Cache: {}", cache.path().display());
    if store.is_empty() {
        println!("No activities yet. Run 'stride sync' to create the cache.");
        return Ok(());
    }
    print_store_summary(&store);
    Ok(())
}

fn print_store_summary(store: &CanonicalStore) {
    let counts = store.source_counts();
    println!();
    println!("Activities: {}", store.len());
    for source in [Source::Primary, Source::Secondary, Source::Both] {
        println!("  {:<10} {}", source.as_str(), counts.get(source));
    }
    if let Some(range) = store.date_range() {
        println!(
            "Date range: {} to {}",
            range.first.format("%Y-%m-%d"),
            range.last.format("%Y-%m-%d")
        );
    }

    println!();
    println!("Last sync:");
    for source in [Source::Primary, Source::Secondary] {
        let last = store
            .metadata
            .last_sync
            .get(&source)
            .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!("  {:<10} {}", source.as_str(), last);
    }
    if let Some(built) = store.metadata.build_time {
        println!("Built: {}", built.format("%Y-%m-%d %H:%M UTC"));
    }
}
