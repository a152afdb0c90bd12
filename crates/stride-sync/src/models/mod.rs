//! Data models
//!
//! `record` is the canonical cache shape; `activity` mirrors the device-sync
//! API payloads that the primary adapter converts from.

pub mod activity;
pub mod record;

pub use activity::{ActivityDetailMetrics, ActivitySplits, ActivitySummary, DetailStreams, LapDto};
pub use record::{
    ActivityDetail, ActivityRecord, Completeness, FetchedActivity, MergeKey, Source, Split,
};
