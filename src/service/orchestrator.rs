use std::sync::Arc;
use std::time::Instant;

use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use anyhow::anyhow;
use tracing::{debug, error, info, warn};

use crate::cache::retry_tracker::{BackoffPolicy, RetryStateView, RetryTracker};
use crate::cache::token_cache::{CacheEntryView, TokenCache};
use crate::config::settings::SettingsConfig;
use crate::error::{Result, TokenError};
use crate::extractor::Extractor;
use crate::helpers::time::{get_instant, now_ms};
use crate::observability::metrics::{get_metrics, EVICTION_CAPACITY, REASON_BACKOFF, REASON_CYCLE};
use crate::observability::service_resources_metrics::{sample_memory, MemoryUsage};
use crate::resilience::retry::{ExtractionCycle, ExtractionFailure};
use crate::resilience::single_flight::SingleFlight;

static PATH_SINGLE: &str = "single";
static PATH_BATCH: &str = "batch";
static URL_REQUIRED: &str = "url is required";

type FlightResult = std::result::Result<String, ExtractionFailure>;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub stream_id: Option<String>,
    #[serde(default)]
    pub force_refresh: Option<bool>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub success: bool,
    pub token_url: String,
    pub cached: bool,
    /// milliseconds until the cache entry goes stale
    pub expires_in: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchRequest {
    /// kept loose so a non-array can be reported as a validation error
    #[serde(default)]
    pub streams: Option<Value>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub id: Value,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchResult {
    fn resolved(id: Value, token: TokenResponse) -> Self {
        Self {
            id,
            success: true,
            token_url: Some(token.token_url),
            cached: Some(token.cached),
            expires_in: Some(token.expires_in),
            error: None,
        }
    }

    fn failed(id: Value, error: impl Into<String>) -> Self {
        Self { id, success: false, token_url: None, cached: None, expires_in: None, error: Some(error.into()) }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BatchResponse {
    pub results: Vec<BatchResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearRequest {
    #[serde(default)]
    pub stream_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ClearResponse {
    pub cleared: usize,
    pub remaining: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    /// seconds since start
    pub uptime: f64,
    pub cached_tokens: usize,
    pub memory: MemoryUsage,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsConfigView {
    pub ttl_ms: u64,
    pub capacity: usize,
    pub enforce_backoff: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub cache_size: usize,
    pub retry_tracker_size: usize,
    pub inflight: usize,
    pub uptime: f64,
    pub memory: MemoryUsage,
    pub config: StatsConfigView,
    pub entries: Vec<CacheEntryView>,
    pub retries: Vec<RetryStateView>,
}

/// Decides between cache, extraction and backoff for every token request.
pub struct TokenService {
    cache: TokenCache,
    tracker: RetryTracker,
    extractor: Arc<dyn Extractor>,
    cycle: ExtractionCycle,
    flights: SingleFlight<FlightResult>,
    enforce_backoff: bool,
    batch_concurrency: usize,
    started_at: Instant,
}

impl TokenService {
    pub fn new(settings: &SettingsConfig, extractor: Arc<dyn Extractor>) -> Self {
        Self {
            cache: TokenCache::new(settings.cache.ttl_ms, settings.cache.capacity),
            tracker: RetryTracker::new(BackoffPolicy::new(settings.backoff.base_ms, settings.backoff.max_ms)),
            extractor,
            cycle: ExtractionCycle::new(&settings.retry, &settings.extractor),
            flights: SingleFlight::new(),
            enforce_backoff: settings.backoff.enforce,
            batch_concurrency: settings.batch.concurrency.max(1),
            started_at: Instant::now(),
        }
    }

    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    pub fn tracker(&self) -> &RetryTracker {
        &self.tracker
    }

    pub fn uptime_secs(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }

    /// Single-token request: cache, then optional backoff gate, then extraction.
    pub async fn get_token(&self, request: TokenRequest) -> Result<TokenResponse> {
        let metrics = get_metrics().await;
        metrics.token_requests.with_label_values(&[PATH_SINGLE]).inc();

        let source_url = non_empty(request.url)
            .ok_or_else(|| TokenError::Validation(URL_REQUIRED.to_string()))?;
        let stream_key = non_empty(request.stream_id).unwrap_or_else(|| source_url.clone());

        let force_refresh = request.force_refresh.unwrap_or(false);
        if !force_refresh {
            if let Some(hit) = self.lookup(&source_url, now_ms()).await {
                debug!("cache hit for {}", source_url);
                return Ok(hit);
            }
        }

        if self.enforce_backoff {
            if let Some(state) = self.tracker.get(&stream_key).await {
                let retry_after = self.tracker.retry_after_remaining(&state, now_ms());
                if retry_after > 0 {
                    metrics.extraction_failures.with_label_values(&[REASON_BACKOFF]).inc();
                    info!("stream '{}' inside backoff window, {} ms left", stream_key, retry_after);
                    return Err(TokenError::Backoff { failures: state.failures, retry_after });
                }
            }
        }

        match self.extract(&source_url, force_refresh).await? {
            Ok(token_url) => {
                if self.tracker.clear(&stream_key).await {
                    metrics.tracked_streams.set(self.tracker.len().await as i64);
                }
                Ok(TokenResponse { success: true, token_url, cached: false, expires_in: self.cache.ttl_ms() })
            }
            Err(failure) => {
                let state = self.tracker.record_failure(&stream_key, now_ms()).await;
                metrics.tracked_streams.set(self.tracker.len().await as i64);
                let retry_after = self.tracker.backoff_ms(state.failures);
                warn!(
                    "stream '{}' failed {} time(s), advising retry after {} ms: {}",
                    stream_key, state.failures, retry_after, failure
                );
                Err(TokenError::Extraction { message: failure.message, failures: state.failures, retry_after })
            }
        }
    }

    /// Batch request: every element resolved on its own, results in input order.
    /// The retry tracker is neither consulted nor updated here.
    pub async fn get_tokens_batch(&self, request: BatchRequest) -> Result<BatchResponse> {
        let metrics = get_metrics().await;
        metrics.token_requests.with_label_values(&[PATH_BATCH]).inc();

        let streams = match request.streams {
            Some(Value::Array(streams)) => streams,
            _ => return Err(TokenError::Validation("streams must be an array".to_string())),
        };
        info!("batch of {} streams", streams.len());

        let pending: Vec<_> = streams.into_iter().map(|item| self.resolve_batch_item(item)).collect();
        let results = stream::iter(pending)
            .buffered(self.batch_concurrency)
            .collect::<Vec<_>>()
            .await;
        Ok(BatchResponse { results })
    }

    async fn resolve_batch_item(&self, item: Value) -> BatchResult {
        let id = item.get("id").cloned().unwrap_or(Value::Null);
        let url = item
            .get("url")
            .and_then(Value::as_str)
            .map(str::to_string);
        let Some(source_url) = non_empty(url) else {
            return BatchResult::failed(id, URL_REQUIRED);
        };

        if let Some(hit) = self.lookup(&source_url, now_ms()).await {
            return BatchResult::resolved(id, hit);
        }
        match self.extract(&source_url, false).await {
            Ok(Ok(token_url)) => BatchResult::resolved(
                id,
                TokenResponse { success: true, token_url, cached: false, expires_in: self.cache.ttl_ms() },
            ),
            Ok(Err(failure)) => BatchResult::failed(id, failure.message),
            Err(e) => BatchResult::failed(id, e.to_string()),
        }
    }

    /// With a fragment: drop cache keys containing it. Without: wipe cache and tracker.
    pub async fn clear_cache(&self, request: ClearRequest) -> ClearResponse {
        let metrics = get_metrics().await;
        let response = match non_empty(request.stream_id) {
            Some(fragment) => {
                let cleared = self.cache.remove_matching(&fragment).await;
                let remaining = self.cache.len().await;
                info!("cleared {} cache entries matching '{}'", cleared, fragment);
                ClearResponse { cleared, remaining }
            }
            None => {
                let cleared = self.cache.clear().await + self.tracker.clear_all().await;
                metrics.tracked_streams.set(0);
                info!("cleared cache and retry tracker, {} entries", cleared);
                ClearResponse { cleared, remaining: 0 }
            }
        };
        metrics.cached_tokens.set(response.remaining as i64);
        response
    }

    pub async fn stats(&self) -> StatsResponse {
        let now = now_ms();
        StatsResponse {
            cache_size: self.cache.len().await,
            retry_tracker_size: self.tracker.len().await,
            inflight: self.flights.in_flight(),
            uptime: self.uptime_secs(),
            memory: sample_memory(),
            config: StatsConfigView {
                ttl_ms: self.cache.ttl_ms(),
                capacity: self.cache.capacity(),
                enforce_backoff: self.enforce_backoff,
            },
            entries: self.cache.snapshot(now).await,
            retries: self.tracker.snapshot(now).await,
        }
    }

    pub async fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "ok",
            uptime: self.uptime_secs(),
            cached_tokens: self.cache.len().await,
            memory: sample_memory(),
        }
    }

    async fn lookup(&self, source_url: &str, now: u64) -> Option<TokenResponse> {
        let metrics = get_metrics().await;
        match self.cache.get_fresh(source_url, now).await {
            Some(entry) => {
                metrics.cache_hits.inc();
                Some(TokenResponse {
                    success: true,
                    expires_in: self.cache.remaining_ttl(&entry, now),
                    token_url: entry.token_url,
                    cached: true,
                })
            }
            None => {
                metrics.cache_misses.inc();
                None
            }
        }
    }

    /// Runs one extraction cycle per source url at a time, storing the token on success.
    /// A forced call starts its own cycle instead of joining one already running.
    /// Errs with `Internal` when the cycle task died without a result.
    async fn extract(&self, source_url: &str, force: bool) -> Result<FlightResult> {
        let metrics = get_metrics().await;
        let extractor = self.extractor.clone();
        let cycle = self.cycle.clone();
        let cache = self.cache.clone();
        let url = source_url.to_string();

        let work = async move {
            let start = get_instant();
            let result = cycle.run(extractor.as_ref(), &url).await;
            metrics.extraction_duration.observe(start.elapsed().as_secs_f64());
            match &result {
                Ok(token_url) => {
                    let evicted = cache.put(&url, token_url.clone(), now_ms()).await;
                    if evicted > 0 {
                        metrics.cache_evictions.with_label_values(&[EVICTION_CAPACITY]).inc_by(evicted as u64);
                    }
                    metrics.cached_tokens.set(cache.len().await as i64);
                    info!("extracted token for {}", url);
                }
                Err(failure) => {
                    metrics.extraction_failures.with_label_values(&[REASON_CYCLE]).inc();
                    warn!("extraction cycle for {} failed: {}", url, failure);
                }
            }
            result
        };

        let outcome = if force {
            self.flights.run_fresh(source_url, work).await
        } else {
            self.flights.run(source_url, work).await
        };
        if outcome.joined {
            metrics.singleflight_joins.inc();
            debug!("joined in-flight extraction for {}", source_url);
        }
        outcome.value.ok_or_else(|| {
            error!("extraction task for {} ended without a result", source_url);
            TokenError::Internal(anyhow!("extraction task aborted for {}", source_url))
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
