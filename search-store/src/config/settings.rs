//! Settings read from the environment.

use std::env;
use std::time::Duration;

use search_store_repository::{RetryPolicy, StoreConfig};
use search_store_shared::ModelConfig;
use tracing::warn;

use crate::errors::AppError;

/// Default OpenSearch URL.
const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";

/// Default tenant.
const DEFAULT_TENANT: &str = "default";

/// Default connection retry interval in seconds.
const DEFAULT_RETRY_INTERVAL_SECS: u64 = 15;

/// Connection mode for OpenSearch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Fail immediately if connection fails.
    FailFast,
    /// Retry the connection until it succeeds.
    Retry,
}

impl ConnectionMode {
    /// Parse a connection mode.
    ///
    /// Valid values: "fail-fast" or "retry" (case-insensitive).
    /// Defaults to "retry" if not set or invalid.
    pub fn parse(value: Option<&str>) -> Self {
        match value.unwrap_or("retry").to_lowercase().as_str() {
            "fail-fast" | "failfast" | "fail_fast" => Self::FailFast,
            "retry" => Self::Retry,
            other => {
                warn!(value = %other, "Invalid OPENSEARCH_CONNECTION_MODE, defaulting to 'retry'");
                Self::Retry
            }
        }
    }
}

/// Everything the binary needs to reach one collection.
#[derive(Debug, Clone)]
pub struct Settings {
    pub opensearch_url: String,
    pub model: ModelConfig,
    pub store: StoreConfig,
    pub connection_mode: ConnectionMode,
    pub retry_interval: Duration,
}

impl Settings {
    /// Read settings from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `OPENSEARCH_URL`: OpenSearch server URL (default: http://localhost:9200)
    /// - `STORE_TENANT`: Tenant of the collection (default: "default")
    /// - `STORE_BASE_NAME`: Collection name (required)
    /// - `STORE_INDEX_VERSION`: Physical index version (default: 0)
    /// - `STORE_IMMEDIATE_REFRESH`: Refresh after every write (default: false)
    /// - `RETRY_MAX_ATTEMPTS`: Retries of a rate limited call after the first attempt (default: 5)
    /// - `RETRY_BASE`: Exponential backoff base (default: 2.0)
    /// - `PAGE_LIMIT`: Largest window served without a cursor (default: 10000)
    /// - `OPENSEARCH_CONNECTION_MODE`: "fail-fast" or "retry" (default: retry)
    /// - `OPENSEARCH_RETRY_INTERVAL_SECS`: Retry interval in seconds (default: 15)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read settings through `lookup`, which returns the value of a variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let opensearch_url =
            lookup("OPENSEARCH_URL").unwrap_or_else(|| DEFAULT_OPENSEARCH_URL.to_string());

        let tenant = lookup("STORE_TENANT").unwrap_or_else(|| DEFAULT_TENANT.to_string());
        let base_name = lookup("STORE_BASE_NAME")
            .filter(|name| !name.is_empty())
            .ok_or_else(|| AppError::config("STORE_BASE_NAME is required"))?;
        let version = parse_var(&lookup, "STORE_INDEX_VERSION")?.unwrap_or(0);
        let immediate_refresh = match lookup("STORE_IMMEDIATE_REFRESH") {
            Some(value) => parse_flag(&value).ok_or_else(|| {
                AppError::config(format!("STORE_IMMEDIATE_REFRESH '{}' is not a boolean", value))
            })?,
            None => false,
        };

        let model = ModelConfig::new(tenant, base_name)
            .with_version(version)
            .with_immediate_refresh(immediate_refresh);
        model
            .validate()
            .map_err(|problems| AppError::config(problems.join("; ")))?;

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: parse_var(&lookup, "RETRY_MAX_ATTEMPTS")?.unwrap_or(defaults.max_attempts),
            base: parse_var(&lookup, "RETRY_BASE")?.unwrap_or(defaults.base),
            page_limit: parse_var(&lookup, "PAGE_LIMIT")?.unwrap_or(defaults.page_limit),
        };

        let connection_mode = ConnectionMode::parse(lookup("OPENSEARCH_CONNECTION_MODE").as_deref());
        let retry_interval = lookup("OPENSEARCH_RETRY_INTERVAL_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETRY_INTERVAL_SECS);

        Ok(Self {
            opensearch_url,
            model,
            store: StoreConfig::with_retry(retry),
            connection_mode,
            retry_interval: Duration::from_secs(retry_interval),
        })
    }
}

fn parse_var<F, V>(lookup: &F, key: &str) -> Result<Option<V>, AppError>
where
    F: Fn(&str) -> Option<String>,
    V: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<V>()
            .map(Some)
            .map_err(|_| AppError::config(format!("{} has an invalid value '{}'", key, raw))),
        None => Ok(None),
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
