//! Resilient call layer.
//!
//! Every backend request goes through `CallLayer::call`, which retries rate
//! limited (429) responses with exponential backoff and turns error statuses
//! into `SearchStoreError`s. Bulk submissions additionally go through
//! `CallLayer::send_bulk`, which splits payloads the backend refuses as too large.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt};
use rand::Rng;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use search_store_shared::{CallStats, Hit};

use crate::config::StoreConfig;
use crate::errors::SearchStoreError;
use crate::interfaces::SearchTransport;
use crate::types::{BackendRequest, BackendResponse, BulkResponse};

/// One logical operation (a search, a bulk save, ...).
///
/// Carries the correlation id logged with every backend call made on behalf of
/// the operation and accumulates their cost.
#[derive(Debug)]
pub struct OperationContext {
    correlation_id: Uuid,
    operation: &'static str,
    started: Instant,
    calls: AtomicU64,
    bytes: AtomicU64,
    latency_nanos: AtomicU64,
}

impl OperationContext {
    pub fn new(operation: &'static str) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            operation,
            started: Instant::now(),
            calls: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            latency_nanos: AtomicU64::new(0),
        }
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    fn record(&self, bytes: u64, latency: Duration) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
        let nanos = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX);
        self.latency_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    /// Cost accumulated so far.
    pub fn stats(&self) -> CallStats {
        CallStats {
            calls: self.calls.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            latency: Duration::from_nanos(self.latency_nanos.load(Ordering::Relaxed)),
        }
    }

    /// Log the operation summary and return it.
    pub fn finish(&self) -> CallStats {
        let stats = self.stats();
        info!(
            correlation_id = %self.correlation_id,
            operation = self.operation,
            calls = stats.calls,
            bytes = stats.bytes,
            backend_ms = stats.latency.as_millis() as u64,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Operation finished"
        );
        stats
    }
}

/// Issues backend requests with rate-limit retry and bulk payload backoff.
#[derive(Clone)]
pub struct CallLayer {
    transport: Arc<dyn SearchTransport>,
    config: Arc<StoreConfig>,
}

impl CallLayer {
    /// Create a call layer over the given transport.
    pub fn new(transport: Arc<dyn SearchTransport>, config: StoreConfig) -> Self {
        Self {
            transport,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Send one request.
    ///
    /// A 429 response is retried after `base^attempt * 100ms` (±20%) while fewer
    /// than `max_attempts` retries were made; after that `TooManyRequests` is
    /// returned. Any other error status is returned as-is, without retry.
    pub async fn call(
        &self,
        ctx: &OperationContext,
        request: BackendRequest,
    ) -> Result<BackendResponse, SearchStoreError> {
        let policy = self.config.retry;
        let mut attempt: u32 = 0;

        loop {
            let started = Instant::now();
            let result = self.transport.send(&request).await;
            let elapsed = started.elapsed();

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    ctx.record(0, elapsed);
                    debug!(
                        correlation_id = %ctx.correlation_id,
                        request = request.name(),
                        error = %e,
                        "Backend call failed"
                    );
                    return Err(e);
                }
            };

            ctx.record(response.content_length(), elapsed);
            debug!(
                correlation_id = %ctx.correlation_id,
                request = request.name(),
                status = response.status,
                attempt,
                elapsed_ms = elapsed.as_millis() as u64,
                "Backend call"
            );

            if response.status == 429 {
                if attempt < policy.max_attempts {
                    let jitter: f64 = rand::thread_rng().gen_range(0.8..=1.2);
                    let delay = policy.backoff(attempt).mul_f64(jitter);
                    warn!(
                        correlation_id = %ctx.correlation_id,
                        request = request.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Rate limited, backing off"
                    );
                    sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                return Err(SearchStoreError::TooManyRequests {
                    attempts: attempt + 1,
                });
            }

            if !response.is_success() {
                return Err(SearchStoreError::from_status(response.status, &response.body));
            }

            return Ok(response);
        }
    }

    /// Fetch one document, `_source` included only when `source` is set.
    pub async fn get_hit(
        &self,
        ctx: &OperationContext,
        index: &str,
        id: &str,
        source: bool,
    ) -> Result<Hit, SearchStoreError> {
        let request = BackendRequest::Get {
            index: index.to_string(),
            id: id.to_string(),
            source,
        };
        let response = self.call(ctx, request).await.map_err(|e| {
            if e.is_not_found() {
                SearchStoreError::document_not_found(index, id)
            } else {
                e
            }
        })?;

        if response.body.get("found").and_then(Value::as_bool) == Some(false) {
            return Err(SearchStoreError::document_not_found(index, id));
        }
        serde_json::from_value(response.body)
            .map_err(|e| SearchStoreError::parse(format!("Invalid get response: {}", e)))
    }

    /// Submit alternating action/document lines as one logical bulk request.
    ///
    /// When the backend (or the local payload limit) refuses the body as too
    /// large, the lines are split into halves rounded up to whole action pairs
    /// and each part is submitted recursively. The partial responses are merged
    /// so the caller sees a single response with one item per action.
    pub async fn send_bulk(
        &self,
        ctx: &OperationContext,
        lines: &[Value],
        refresh: bool,
    ) -> Result<BulkResponse, SearchStoreError> {
        if lines.is_empty() {
            return Ok(BulkResponse::default());
        }
        self.send_bulk_part(ctx, lines, refresh).await
    }

    fn send_bulk_part<'a>(
        &'a self,
        ctx: &'a OperationContext,
        lines: &'a [Value],
        refresh: bool,
    ) -> BoxFuture<'a, Result<BulkResponse, SearchStoreError>> {
        async move {
            match self.submit_bulk(ctx, lines, refresh).await {
                Err(e) if e.is_payload_too_large() => {
                    if lines.len() <= 2 {
                        return Err(SearchStoreError::bulk_operation(
                            "bulk operation failed despite minimal size",
                        ));
                    }

                    let part_size = split_size(lines.len());
                    warn!(
                        correlation_id = %ctx.correlation_id,
                        lines = lines.len(),
                        part_size,
                        "Bulk payload too large, splitting"
                    );

                    let mut merged = BulkResponse::default();
                    for part in lines.chunks(part_size) {
                        merged.merge(self.send_bulk_part(ctx, part, refresh).await?);
                    }
                    Ok(merged)
                }
                other => other,
            }
        }
        .boxed()
    }

    async fn submit_bulk(
        &self,
        ctx: &OperationContext,
        lines: &[Value],
        refresh: bool,
    ) -> Result<BulkResponse, SearchStoreError> {
        let body = encode_ndjson(lines)?;
        if body.len() > self.config.max_payload_bytes {
            return Err(SearchStoreError::payload_too_large(format!(
                "bulk body of {} bytes exceeds the {} byte limit",
                body.len(),
                self.config.max_payload_bytes
            )));
        }

        let response = self
            .call(ctx, BackendRequest::Bulk { body, refresh })
            .await?;
        serde_json::from_value(response.body)
            .map_err(|e| SearchStoreError::parse(format!("Invalid bulk response: {}", e)))
    }
}

/// Half of `len`, rounded up to an even number of lines.
fn split_size(len: usize) -> usize {
    let half = len.div_ceil(2);
    half + half % 2
}

fn encode_ndjson(lines: &[Value]) -> Result<String, SearchStoreError> {
    let mut body = String::new();
    for line in lines {
        let encoded = serde_json::to_string(line)
            .map_err(|e| SearchStoreError::serialization(e.to_string()))?;
        body.push_str(&encoded);
        body.push('\n');
    }
    Ok(body)
}
