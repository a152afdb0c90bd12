//! Request pacing and exponential backoff for the HTTP adapter

use std::time::{Duration, Instant};

/// Default minimum delay between requests (30 req/min)
const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(2000);

/// Consecutive 429s after which a caller should give up for this run
const PAUSE_THRESHOLD: u32 = 5;

/// Rate limiter for sequential API requests
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Minimum delay between requests
    min_delay: Duration,
    /// Extra delay added after rate limit responses
    backoff: Duration,
    /// Maximum backoff delay
    max_backoff: Duration,
    /// Backoff multiplier
    backoff_multiplier: f64,
    /// Last request time
    last_request: Option<Instant>,
    /// Consecutive rate limit hits
    consecutive_429s: u32,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    /// Create a new rate limiter with conservative defaults
    pub fn new() -> Self {
        Self::with_min_delay(DEFAULT_MIN_DELAY)
    }

    /// Create a rate limiter with a custom spacing between requests
    pub fn with_min_delay(min_delay: Duration) -> Self {
        Self {
            min_delay,
            backoff: Duration::ZERO,
            max_backoff: Duration::from_secs(300),
            backoff_multiplier: 2.0,
            last_request: None,
            consecutive_429s: 0,
        }
    }

    /// Wait before making the next request
    pub async fn wait(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            let required_delay = self.min_delay + self.backoff;

            if elapsed < required_delay {
                tokio::time::sleep(required_delay - elapsed).await;
            }
        }
        self.last_request = Some(Instant::now());
    }

    /// Handle a successful request
    pub fn on_success(&mut self) {
        self.backoff = Duration::ZERO;
        self.consecutive_429s = 0;
    }

    /// Handle a rate limit (HTTP 429) response
    pub fn on_rate_limit(&mut self) {
        self.consecutive_429s += 1;
        let next = (self.backoff.as_secs_f64() * self.backoff_multiplier).max(1.0);
        self.backoff = Duration::from_secs_f64(next.min(self.max_backoff.as_secs_f64()));
    }

    /// Whether repeated rate limits mean this run should stop
    pub fn should_pause(&self) -> bool {
        self.consecutive_429s >= PAUSE_THRESHOLD
    }

    /// Get the current backoff duration
    pub fn current_backoff(&self) -> Duration {
        self.backoff
    }
}
