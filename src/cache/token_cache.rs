use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::helpers::time::elapsed_ms;
use crate::utils::constants::STATS_URL_PREVIEW_CHARS;

/// Extracted token url together with the moment it was stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub token_url: String,
    pub created_at_ms: u64, // UNIX millis
}

impl CacheEntry {
    pub fn new(token_url: String, created_at_ms: u64) -> Self {
        Self { token_url, created_at_ms }
    }

    pub fn age_ms(&self, now_ms: u64) -> u64 {
        elapsed_ms(self.created_at_ms, now_ms)
    }
}

/// Diagnostic row exposed by `/stats`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntryView {
    pub url: String,
    pub age_ms: u64,
    pub expires_in: u64,
    pub fresh: bool,
}

/// Source url -> extracted token url.
///
/// Freshness is decided on read against `ttl_ms`. Stale entries stay resident
/// until overwritten, swept or evicted. `capacity` bounds the number of keys:
/// inserting a new key into a full cache drops stale entries first and then
/// the oldest one.
#[derive(Debug, Clone)]
pub struct TokenCache {
    inner: Arc<RwLock<HashMap<String, CacheEntry>>>,
    ttl_ms: u64,
    capacity: usize,
}

impl TokenCache {
    pub fn new(ttl_ms: u64, capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            ttl_ms,
            capacity: capacity.max(1),
        }
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entry for `source_url`, fresh or not.
    pub async fn get(&self, source_url: &str) -> Option<CacheEntry> {
        self.inner.read().await.get(source_url).cloned()
    }

    /// Entry for `source_url` only while it is fresh at `now_ms`.
    pub async fn get_fresh(&self, source_url: &str, now_ms: u64) -> Option<CacheEntry> {
        self.get(source_url)
            .await
            .filter(|entry| self.is_fresh(entry, now_ms))
    }

    pub fn is_fresh(&self, entry: &CacheEntry, now_ms: u64) -> bool {
        entry.age_ms(now_ms) < self.ttl_ms
    }

    pub fn remaining_ttl(&self, entry: &CacheEntry, now_ms: u64) -> u64 {
        self.ttl_ms.saturating_sub(entry.age_ms(now_ms))
    }

    /// Unconditional overwrite, last writer wins. Returns the number of entries evicted to make room.
    pub async fn put(&self, source_url: &str, token_url: String, now_ms: u64) -> usize {
        let mut map = self.inner.write().await;
        let mut evicted = 0;

        if !map.contains_key(source_url) && map.len() >= self.capacity {
            let before = map.len();
            let ttl_ms = self.ttl_ms;
            map.retain(|_, entry| entry.age_ms(now_ms) < ttl_ms);
            evicted += before - map.len();

            if map.len() >= self.capacity {
                let oldest = map
                    .iter()
                    .min_by_key(|(_, entry)| entry.created_at_ms)
                    .map(|(key, _)| key.clone());
                if let Some(key) = oldest {
                    map.remove(&key);
                    evicted += 1;
                }
            }
        }

        map.insert(source_url.to_string(), CacheEntry::new(token_url, now_ms));
        evicted
    }

    pub async fn remove(&self, source_url: &str) -> bool {
        self.inner.write().await.remove(source_url).is_some()
    }

    /// Removes every key containing `fragment`, returns how many were removed.
    pub async fn remove_matching(&self, fragment: &str) -> usize {
        let mut map = self.inner.write().await;
        let before = map.len();
        map.retain(|key, _| !key.contains(fragment));
        before - map.len()
    }

    /// Empties the cache, returns its prior size.
    pub async fn clear(&self) -> usize {
        let mut map = self.inner.write().await;
        let size = map.len();
        map.clear();
        size
    }

    /// Drops stale entries, returns how many were removed.
    pub async fn sweep(&self, now_ms: u64) -> usize {
        let mut map = self.inner.write().await;
        let before = map.len();
        let ttl_ms = self.ttl_ms;
        map.retain(|_, entry| entry.age_ms(now_ms) < ttl_ms);
        before - map.len()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Read-only view of every resident entry, youngest first.
    pub async fn snapshot(&self, now_ms: u64) -> Vec<CacheEntryView> {
        let map = self.inner.read().await;
        let mut views: Vec<CacheEntryView> = map
            .iter()
            .map(|(url, entry)| CacheEntryView {
                url: preview_url(url),
                age_ms: entry.age_ms(now_ms),
                expires_in: self.remaining_ttl(entry, now_ms),
                fresh: self.is_fresh(entry, now_ms),
            })
            .collect();
        views.sort_by(|a, b| a.age_ms.cmp(&b.age_ms).then_with(|| a.url.cmp(&b.url)));
        views
    }
}

fn preview_url(url: &str) -> String {
    if url.chars().count() > STATS_URL_PREVIEW_CHARS {
        let head: String = url.chars().take(STATS_URL_PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        url.to_string()
    }
}
