//! On-disk cache behavior: round trips, staged writes, backups and the shrink guard

use std::fs;

use chrono::{NaiveDate, TimeZone, Utc};
use stride_sync::merge::merge_batch;
use stride_sync::models::{ActivityDetail, FetchedActivity, Source, Split};
use stride_sync::storage::{CacheFile, CanonicalStore, BACKUP_DIR_NAME, CACHE_FILE_NAME};
use stride_sync::StrideError;
use tempfile::TempDir;

fn run(id: &str, source: Source, day: u32, km: f64) -> FetchedActivity {
    FetchedActivity {
        id: id.to_string(),
        source,
        start_time: NaiveDate::from_ymd_opt(2026, 1, day).and_then(|d| d.and_hms_opt(6, 30, 0)),
        distance_km: Some(km),
        detail: ActivityDetail {
            name: Some(format!("Run {id}")),
            activity_type: Some("running".to_string()),
            avg_heart_rate: Some(148),
            ..Default::default()
        },
    }
}

fn store_of(count: u32) -> CanonicalStore {
    let batch = (1..=count)
        .map(|day| run(&format!("A{day}"), Source::Primary, day, 5.0 + day as f64 * 0.37))
        .collect();
    let (mut store, _) = merge_batch(CanonicalStore::new(), batch).unwrap();
    store.refresh_metadata(Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap());
    store
}

#[test]
fn test_save_then_load_round_trips_records_and_metadata() {
    let dir = TempDir::new().unwrap();
    let cache = CacheFile::in_dir(dir.path());

    let mut long_run = run("X9", Source::Primary, 4, 2.05);
    long_run.detail.splits = vec![
        Split {
            distance_km: 1.0,
            duration_seconds: 301.2,
            avg_speed_mps: Some(3.32),
            avg_heart_rate: Some(150),
        },
        Split {
            distance_km: 1.05,
            duration_seconds: 318.9,
            avg_speed_mps: None,
            avg_heart_rate: None,
        },
    ];
    let archive = run("B3", Source::Secondary, 4, 2.1);
    let (mut store, _) = merge_batch(store_of(20), vec![long_run, archive]).unwrap();
    store.record_sync(Source::Primary, Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap());
    store.refresh_metadata(Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 5).unwrap());

    let outcome = cache.save(&store, 0).unwrap();
    assert_eq!(outcome.path, dir.path().join(CACHE_FILE_NAME));
    assert_eq!(outcome.count, store.len());

    let loaded = cache.load().unwrap();
    assert_eq!(loaded, store);
    assert_eq!(loaded.metadata.total_activities, 21);
    assert_eq!(loaded.metadata.source_counts.both, 1);
}

#[test]
fn test_dropped_staged_write_leaves_the_cache_untouched() {
    let dir = TempDir::new().unwrap();
    let cache = CacheFile::in_dir(dir.path());
    cache.save(&store_of(5), 0).unwrap();
    let before = fs::read(cache.path()).unwrap();

    let staged = cache.stage(&store_of(8), 5).unwrap();
    assert!(staged.temp_path().exists());
    assert!(staged.backup().is_some());
    drop(staged);

    assert_eq!(fs::read(cache.path()).unwrap(), before);
    assert_eq!(cache.load().unwrap().len(), 5);
}

#[test]
fn test_committed_staged_write_replaces_the_cache() {
    let dir = TempDir::new().unwrap();
    let cache = CacheFile::in_dir(dir.path());
    cache.save(&store_of(5), 0).unwrap();

    let staged = cache.stage(&store_of(8), 5).unwrap();
    let temp = staged.temp_path().to_path_buf();
    let outcome = staged.commit().unwrap();

    assert!(!temp.exists());
    assert_eq!(outcome.count, 8);
    assert_eq!(cache.load().unwrap().len(), 8);
}

#[test]
fn test_shrinking_save_is_refused() {
    let dir = TempDir::new().unwrap();
    let cache = CacheFile::in_dir(dir.path());
    cache.save(&store_of(30), 0).unwrap();
    let before = fs::read(cache.path()).unwrap();

    let err = cache.save(&store_of(3), 30).unwrap_err();
    match err {
        StrideError::DataLossDetected { before, after } => {
            assert_eq!(before, 30);
            assert_eq!(after, 3);
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(fs::read(cache.path()).unwrap(), before);
    assert_eq!(cache.load().unwrap().len(), 30);
}

#[test]
fn test_every_save_gets_its_own_backup() {
    let dir = TempDir::new().unwrap();
    let cache = CacheFile::in_dir(dir.path());

    let first = cache.save(&store_of(2), 0).unwrap();
    assert!(first.backup.is_none());

    let mut backups = Vec::new();
    for count in 3..8 {
        let outcome = cache.save(&store_of(count), (count - 1) as usize).unwrap();
        backups.push(outcome.backup.expect("backup of the previous file"));
    }

    let listed = cache.list_backups().unwrap();
    assert_eq!(listed.len(), backups.len());
    for backup in &backups {
        assert!(backup.starts_with(dir.path().join(BACKUP_DIR_NAME)));
        assert!(listed.contains(backup));
    }

    // the oldest backup still holds the first save
    let oldest = CacheFile::at(&backups[0]).load().unwrap();
    assert_eq!(oldest.len(), 2);
}

#[test]
fn test_corrupted_cache_is_reported_with_the_latest_backup() {
    let dir = TempDir::new().unwrap();
    let cache = CacheFile::in_dir(dir.path());
    cache.save(&store_of(4), 0).unwrap();
    cache.save(&store_of(5), 4).unwrap();
    fs::write(cache.path(), b"{\"metadata\": {}, \"activities\": [").unwrap();

    let err = cache.load().unwrap_err();
    match &err {
        StrideError::StoreCorrupted { latest_backup, .. } => {
            let backup = latest_backup.as_ref().expect("a backup exists");
            assert_eq!(CacheFile::at(backup).load().unwrap().len(), 4);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(stride_sync::format_user_error(&err).contains("stride backups restore"));
}

#[test]
fn test_duplicate_records_on_disk_are_corruption() {
    let dir = TempDir::new().unwrap();
    let cache = CacheFile::in_dir(dir.path());
    let record = serde_json::json!({
        "id": "A1",
        "source": "primary",
        "start_time": "2026-01-04T06:00:00",
        "distance_km": 10.0
    });
    let doc = serde_json::json!({ "metadata": {}, "activities": [record.clone(), record] });
    fs::write(cache.path(), doc.to_string()).unwrap();

    assert!(matches!(
        cache.load().unwrap_err(),
        StrideError::StoreCorrupted { .. }
    ));
}

#[test]
fn test_restore_replaces_a_damaged_cache() {
    let dir = TempDir::new().unwrap();
    let cache = CacheFile::in_dir(dir.path());
    cache.save(&store_of(12), 0).unwrap();
    cache.save(&store_of(12), 12).unwrap();
    fs::write(cache.path(), b"not json").unwrap();

    let backup = cache.latest_backup().unwrap().unwrap();
    let outcome = cache.restore(&backup).unwrap();
    assert_eq!(outcome.count, 12);
    assert!(outcome.backup.is_some());
    assert_eq!(cache.load().unwrap().len(), 12);
}
