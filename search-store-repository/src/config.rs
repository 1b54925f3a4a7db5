//! Configuration types for the call layer and the search engine.

use std::time::Duration;

/// Default number of retries of a rate limited call.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default exponential backoff base.
pub const DEFAULT_BACKOFF_BASE: f64 = 2.0;

/// Largest `from + size` the backend serves without a cursor.
pub const DEFAULT_PAGE_LIMIT: u64 = 10_000;

/// Retry and paging limits handed to the call layer.
///
/// A 429 response is retried after `base^attempt * 100ms` (±20% jitter) at most
/// `max_attempts` times, so a call reaches the backend up to `max_attempts + 1`
/// times.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first 429; zero disables retrying.
    pub max_attempts: u32,
    pub base: f64,
    /// Windows ending beyond this offset are read through an implicit cursor.
    pub page_limit: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base: DEFAULT_BACKOFF_BASE,
            page_limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retrying attempt number `attempt`, without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let millis = self.base.powi(attempt as i32) * 100.0;
        Duration::from_millis(millis.max(0.0).round() as u64)
    }
}

/// Configuration for a `CallLayer` and the models built on it.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub retry: RetryPolicy,

    /// Keep-alive sent when opening or extending a Point-in-Time cursor.
    pub pit_keep_alive: String,

    /// Page size used by cursor traversals before any document size is known.
    pub default_page_size: usize,

    /// Response size a single cursor page aims for; the adaptive page size is
    /// derived from it and the observed average document size.
    pub target_page_bytes: u64,

    /// Serialized bulk bodies above this size are split without being sent.
    pub max_payload_bytes: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            pit_keep_alive: "1m".to_string(),
            default_page_size: 1000,
            target_page_bytes: 10 * 1024 * 1024,
            max_payload_bytes: 100 * 1024 * 1024,
        }
    }
}

impl StoreConfig {
    /// Create a config with a custom retry policy.
    pub fn with_retry(retry: RetryPolicy) -> Self {
        Self {
            retry,
            ..Self::default()
        }
    }

    /// Override the cursor page size used before documents were observed.
    pub fn with_default_page_size(mut self, default_page_size: usize) -> Self {
        self.default_page_size = default_page_size.max(1);
        self
    }

    /// Override the local bulk payload limit.
    pub fn with_max_payload_bytes(mut self, max_payload_bytes: usize) -> Self {
        self.max_payload_bytes = max_payload_bytes;
        self
    }
}
