use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, warn};

use crate::config::settings::{ExtractorConfig, RetryConfig};
use crate::extractor::{ExtractError, Extractor};
use crate::observability::metrics::{get_metrics, REASON_ATTEMPT};

/// An extraction cycle ran out of attempts.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message} (after {attempts} attempts)")]
pub struct ExtractionFailure {
    /// message of the last failed attempt
    pub message: String,
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub attempts: u32,
    /// linear: the wait after failed attempt N (0-based) is base_delay_ms * (N + 1)
    pub base_delay_ms: u64,
}

impl RetrySettings {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self { attempts: config.attempts.max(1), base_delay_ms: config.base_delay_ms }
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(attempt as u64 + 1))
    }

    /// Runs `operation` until it succeeds or `attempts` are used up.
    /// The closure receives the 0-based attempt number.
    pub async fn run_with_retry<F, Fut, T>(&self, mut operation: F) -> Result<T, ExtractionFailure>
    where
        F: FnMut(u32) -> Fut,
        Fut: std::future::Future<Output = Result<T, ExtractError>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 0;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt + 1 < attempts => {
                    let delay = self.delay_after(attempt);
                    warn!("attempt {}/{} failed: {}, retrying in {:?}", attempt + 1, attempts, e, delay);
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!("all {} attempts failed: {}", attempts, e);
                    return Err(ExtractionFailure { message: e.message, attempts });
                }
            }
        }
    }
}

/// One logical extraction: bounded local retries around single extractor calls.
#[derive(Debug, Clone)]
pub struct ExtractionCycle {
    pub retry: RetrySettings,
    /// budget handed to every extractor call
    pub extractor_timeout: Duration,
}

impl ExtractionCycle {
    pub fn new(retry: &RetryConfig, extractor: &ExtractorConfig) -> Self {
        Self {
            retry: RetrySettings::from_config(retry),
            extractor_timeout: Duration::from_millis(extractor.timeout_ms),
        }
    }

    pub async fn run(&self, extractor: &dyn Extractor, source_url: &str) -> Result<String, ExtractionFailure> {
        let metrics = get_metrics().await;
        let timeout = self.extractor_timeout;
        self.retry
            .run_with_retry(|_| async move {
                metrics.extraction_attempts.inc();
                extractor
                    .extract(source_url, timeout)
                    .await
                    .inspect_err(|_| {
                        metrics.extraction_failures.with_label_values(&[REASON_ATTEMPT]).inc();
                    })
            })
            .await
    }
}
