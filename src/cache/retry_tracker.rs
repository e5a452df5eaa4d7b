use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::helpers::time::{elapsed_ms, ms_to_rfc3339};

/// Failure history of one stream across requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    pub failures: u32,
    pub last_failure_at_ms: u64, // UNIX millis
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RetryStateView {
    pub stream_id: String,
    pub failures: u32,
    /// RFC 3339
    pub last_failure_at: Option<String>,
    pub last_failure_age_ms: u64,
    pub retry_after: u64,
}

/// Linear backoff, `base_ms` per failure, capped at `max_ms`.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    pub max_ms: u64,
}

impl BackoffPolicy {
    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        Self { base_ms, max_ms }
    }

    pub fn backoff_ms(&self, failures: u32) -> u64 {
        self.base_ms.saturating_mul(failures as u64).min(self.max_ms)
    }
}

/// Stream key -> cumulative failures.
///
/// Advisory only: it reports a suggested `retryAfter`, it never blocks a request itself.
#[derive(Debug, Clone)]
pub struct RetryTracker {
    inner: Arc<RwLock<HashMap<String, RetryState>>>,
    policy: BackoffPolicy,
}

impl RetryTracker {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { inner: Arc::new(RwLock::new(HashMap::new())), policy }
    }

    pub fn backoff_ms(&self, failures: u32) -> u64 {
        self.policy.backoff_ms(failures)
    }

    pub async fn get(&self, stream_key: &str) -> Option<RetryState> {
        self.inner.read().await.get(stream_key).copied()
    }

    /// Creates the entry with one failure or bumps an existing one.
    pub async fn record_failure(&self, stream_key: &str, now_ms: u64) -> RetryState {
        let mut map = self.inner.write().await;
        let state = map
            .entry(stream_key.to_string())
            .and_modify(|state| {
                state.failures = state.failures.saturating_add(1);
                state.last_failure_at_ms = now_ms;
            })
            .or_insert(RetryState { failures: 1, last_failure_at_ms: now_ms });
        *state
    }

    pub async fn clear(&self, stream_key: &str) -> bool {
        self.inner.write().await.remove(stream_key).is_some()
    }

    pub async fn clear_all(&self) -> usize {
        let mut map = self.inner.write().await;
        let size = map.len();
        map.clear();
        size
    }

    /// Time left in the backoff window opened by the last failure, 0 once it has passed.
    pub fn retry_after_remaining(&self, state: &RetryState, now_ms: u64) -> u64 {
        self.backoff_ms(state.failures)
            .saturating_sub(elapsed_ms(state.last_failure_at_ms, now_ms))
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn snapshot(&self, now_ms: u64) -> Vec<RetryStateView> {
        let map = self.inner.read().await;
        let mut views: Vec<RetryStateView> = map
            .iter()
            .map(|(key, state)| RetryStateView {
                stream_id: key.clone(),
                failures: state.failures,
                last_failure_at: ms_to_rfc3339(state.last_failure_at_ms),
                last_failure_age_ms: elapsed_ms(state.last_failure_at_ms, now_ms),
                retry_after: self.backoff_ms(state.failures),
            })
            .collect();
        views.sort_by(|a, b| a.stream_id.cmp(&b.stream_id));
        views
    }
}
