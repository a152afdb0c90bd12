//! Primary adapter: the device-sync HTTP API

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::ApiClient;
use crate::error::{Result, StrideError};
use crate::models::{
    ActivityDetailMetrics, ActivitySplits, ActivitySummary, DetailStreams, FetchedActivity, Source,
};
use crate::sync::RateLimiter;

use super::{ActivitySource, FetchWindow, StreamSource};

/// Activities requested per list page
const PAGE_SIZE: u32 = 50;

/// Samples requested from the detail endpoint
const MAX_CHART_SIZE: u32 = 100_000;

/// Activity list, lap splits and detail streams from the device-sync API
pub struct ConnectSource {
    client: ApiClient,
    activity_types: Vec<String>,
    page_size: u32,
    limiter: Mutex<RateLimiter>,
}

impl ConnectSource {
    /// Adapter keeping only the given activity type keys (all types when empty)
    pub fn new(client: ApiClient, activity_types: Vec<String>) -> Self {
        Self {
            client,
            activity_types,
            page_size: PAGE_SIZE,
            limiter: Mutex::new(RateLimiter::new()),
        }
    }

    /// Override the spacing between requests
    pub fn with_min_delay(mut self, min_delay: Duration) -> Self {
        self.limiter = Mutex::new(RateLimiter::with_min_delay(min_delay));
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn keeps_type(&self, type_key: &str) -> bool {
        self.activity_types.is_empty() || self.activity_types.iter().any(|t| t == type_key)
    }

    /// Paced GET with backoff on 429
    async fn request<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let mut limiter = self.limiter.lock().await;
        loop {
            limiter.wait().await;
            match self.client.get_json(path).await {
                Ok(value) => {
                    limiter.on_success();
                    return Ok(value);
                }
                Err(StrideError::RateLimited) => {
                    limiter.on_rate_limit();
                    if limiter.should_pause() {
                        return Err(StrideError::RateLimited);
                    }
                    warn!(
                        path,
                        backoff_secs = limiter.current_backoff().as_secs_f64(),
                        "rate limited, backing off"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn list_page(&self, window: &FetchWindow, start: u32) -> Result<Vec<ActivitySummary>> {
        let path = format!(
            "/activitylist-service/activities/search/activities?startDate={}&endDate={}&start={}&limit={}",
            window.since.format("%Y-%m-%d"),
            window.until.format("%Y-%m-%d"),
            start,
            self.page_size
        );
        self.request(&path).await
    }

    async fn splits_for(&self, activity_id: u64) -> Option<ActivitySplits> {
        let path = format!("/activity-service/activity/{}/splits", activity_id);
        match self.request::<ActivitySplits>(&path).await {
            Ok(splits) => Some(splits),
            Err(e) => {
                warn!(activity_id, error = %e, "could not fetch splits, keeping summary only");
                None
            }
        }
    }

    fn unavailable(&self, err: StrideError) -> StrideError {
        match err {
            e @ StrideError::SourceUnavailable { .. } => e,
            e => StrideError::source_unavailable(self.name(), e.to_string()),
        }
    }
}

#[async_trait]
impl ActivitySource for ConnectSource {
    fn name(&self) -> &str {
        "connect"
    }

    fn source(&self) -> Source {
        Source::Primary
    }

    async fn fetch(&self, window: &FetchWindow) -> Result<Vec<FetchedActivity>> {
        let mut summaries = Vec::new();
        let mut start = 0;
        loop {
            let page = self
                .list_page(window, start)
                .await
                .map_err(|e| self.unavailable(e))?;
            let page_len = page.len() as u32;
            debug!(start, page_len, "fetched activity page");
            summaries.extend(page);
            if page_len < self.page_size {
                break;
            }
            start += page_len;
        }

        let listed = summaries.len();
        let mut fetched = Vec::new();
        for summary in summaries {
            if !self.keeps_type(&summary.type_key()) {
                continue;
            }
            // Undated summaries pass through so the merge step can reject them loudly.
            let in_window = summary
                .start_time_local
                .as_deref()
                .and_then(crate::models::activity::parse_start_time)
                .map_or(true, |t| window.contains(t));
            if !in_window {
                continue;
            }
            let splits = self.splits_for(summary.activity_id).await;
            fetched.push(summary.into_fetched(splits));
        }

        info!(listed, kept = fetched.len(), "fetched primary activities");
        Ok(fetched)
    }
}

#[async_trait]
impl StreamSource for ConnectSource {
    async fn fetch_streams(&self, activity_id: &str) -> Result<Option<DetailStreams>> {
        let path = format!(
            "/activity-service/activity/{}/details?maxChartSize={}",
            activity_id, MAX_CHART_SIZE
        );
        let details: ActivityDetailMetrics = self.request(&path).await?;
        Ok(details.streams())
    }
}
