//! Source adapters: independent feeds of activity records
//!
//! The sync engine only sees the [`ActivitySource`] contract. Adapters tag
//! every record with their own [`Source`] and report an unreachable upstream
//! as [`StrideError::SourceUnavailable`](crate::StrideError::SourceUnavailable).

mod archive;
mod connect;

pub use archive::{ArchiveActivity, ArchiveSource};
pub use connect::ConnectSource;

use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime};

use crate::error::Result;
use crate::models::{DetailStreams, FetchedActivity, Source};

/// Closed time window of source-local start times
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub since: NaiveDateTime,
    pub until: NaiveDateTime,
}

impl FetchWindow {
    pub fn new(since: NaiveDateTime, until: NaiveDateTime) -> Self {
        Self { since, until }
    }

    /// The `days` days leading up to `now`
    pub fn lookback(now: NaiveDateTime, days: u32) -> Self {
        Self {
            since: now - Duration::days(i64::from(days)),
            until: now,
        }
    }

    pub fn contains(&self, at: NaiveDateTime) -> bool {
        at >= self.since && at <= self.until
    }
}

/// A feed that can list activities started inside a window
#[async_trait]
pub trait ActivitySource: Send + Sync {
    /// Adapter name used in logs and errors
    fn name(&self) -> &str;

    /// Provenance tag this adapter stamps on its records
    fn source(&self) -> Source;

    /// Fetch every activity that started inside `window`
    async fn fetch(&self, window: &FetchWindow) -> Result<Vec<FetchedActivity>>;
}

/// A feed that can return per-second streams for one activity
#[async_trait]
pub trait StreamSource: Send + Sync {
    async fn fetch_streams(&self, activity_id: &str) -> Result<Option<DetailStreams>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_lookback_window() {
        let now = NaiveDate::from_ymd_opt(2026, 1, 11)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let window = FetchWindow::lookback(now, 7);
        assert_eq!(window.since.date(), NaiveDate::from_ymd_opt(2026, 1, 4).unwrap());
        assert!(window.contains(window.since));
        assert!(window.contains(now));
        assert!(!window.contains(now + Duration::seconds(1)));
    }
}
