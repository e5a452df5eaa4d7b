use std::time::Duration;

use anyhow::Result;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::cache::token_cache::TokenCache;
use crate::helpers::time::now_ms;
use crate::observability::metrics::{get_metrics, EVICTION_SWEEP};

/// Periodically drops stale cache entries. An interval of 0 disables the loop.
pub async fn run_cache_sweeper(cache: TokenCache, interval_secs: u64) -> Result<()> {
    if interval_secs == 0 {
        info!("cache sweeper disabled");
        return Ok(());
    }
    let interval = Duration::from_secs(interval_secs);
    loop {
        sleep(interval).await;
        sweep_once(&cache, now_ms()).await;
    }
}

pub async fn sweep_once(cache: &TokenCache, now_ms: u64) -> usize {
    let metrics = get_metrics().await;
    let removed = cache.sweep(now_ms).await;
    let remaining = cache.len().await;
    metrics.cached_tokens.set(remaining as i64);
    if removed > 0 {
        metrics.cache_evictions.with_label_values(&[EVICTION_SWEEP]).inc_by(removed as u64);
        info!(removed, remaining, "swept stale tokens");
    } else {
        debug!(remaining, "sweep found nothing stale");
    }
    removed
}
