//! Configuration validation with aggregated errors.
//! - Aggregates all issues into Vec<String>
//! - Validates cache, retry, backoff, extractor, batch, metrics and logging invariants

use regex::Regex;
use tracing::{error, info};

use crate::config::settings::{
    BackoffConfig, BatchConfig, CacheConfig, ExtractorConfig, LoggingConfig, MetricsConfig,
    RetryConfig, ServiceConfig,
};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Public entrypoint: returns Ok(()) or Err(Vec<String>) containing all issues.
pub fn validate_service_config(cfg: &ServiceConfig) -> Result<(), Vec<String>> {
    let mut errors: Vec<String> = Vec::new();
    let settings = &cfg.settings;

    validate_cache(&settings.cache, &mut errors);
    validate_retry(&settings.retry, &mut errors);
    validate_backoff(&settings.backoff, &mut errors);
    validate_extractor(&settings.extractor, &mut errors);
    validate_batch(&settings.batch, &mut errors);
    validate_metrics(&settings.metrics, &mut errors);
    if let Some(logging) = &settings.logging {
        validate_logging(logging, &mut errors);
    }

    if errors.is_empty() {
        info!("config validation passed");
        Ok(())
    } else {
        for e in &errors {
            error!("config: {}", e);
        }
        Err(errors)
    }
}

fn validate_cache(cache: &CacheConfig, errors: &mut Vec<String>) {
    if cache.ttl_ms == 0 {
        errors.push("settings.cache.ttl_ms must be > 0".to_string());
    }
    if cache.capacity == 0 {
        errors.push("settings.cache.capacity must be > 0".to_string());
    }
}

fn validate_retry(retry: &RetryConfig, errors: &mut Vec<String>) {
    if retry.attempts == 0 {
        errors.push("settings.retry.attempts must be >= 1".to_string());
    }
}

fn validate_backoff(backoff: &BackoffConfig, errors: &mut Vec<String>) {
    if backoff.base_ms > backoff.max_ms {
        errors.push(format!(
            "settings.backoff.base_ms ({}) must be <= max_ms ({})",
            backoff.base_ms, backoff.max_ms
        ));
    }
}

fn validate_extractor(extractor: &ExtractorConfig, errors: &mut Vec<String>) {
    if extractor.timeout_ms == 0 {
        errors.push("settings.extractor.timeout_ms must be > 0".to_string());
    }
    if extractor.max_hops == 0 {
        errors.push("settings.extractor.max_hops must be >= 1".to_string());
    }
    if let Err(e) = Regex::new(&extractor.token_pattern) {
        errors.push(format!(
            "settings.extractor.token_pattern '{}' is not a valid regex: {}",
            extractor.token_pattern, e
        ));
    }
}

fn validate_batch(batch: &BatchConfig, errors: &mut Vec<String>) {
    if batch.concurrency == 0 {
        errors.push("settings.batch.concurrency must be >= 1".to_string());
    }
}

fn validate_metrics(metrics: &MetricsConfig, errors: &mut Vec<String>) {
    if !metrics.path.starts_with('/') {
        errors.push(format!("settings.metrics.path '{}' must start with '/'", metrics.path));
    }
}

fn validate_logging(logging: &LoggingConfig, errors: &mut Vec<String>) {
    if !LOG_LEVELS.contains(&logging.level.to_lowercase().as_str()) {
        errors.push(format!(
            "settings.logging.level '{}' must be one of {:?}",
            logging.level, LOG_LEVELS
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::LogFormat;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_service_config(&ServiceConfig::default()).is_ok());
    }

    #[test]
    fn all_issues_are_reported_together() {
        let mut cfg = ServiceConfig::default();
        cfg.settings.backoff.base_ms = 40_000;
        cfg.settings.extractor.token_pattern = "(".to_string();
        cfg.settings.batch.concurrency = 0;
        cfg.settings.metrics.path = "metrics".to_string();
        cfg.settings.logging = Some(LoggingConfig::new("loud".to_string(), LogFormat::Json));

        let errors = validate_service_config(&cfg).unwrap_err();
        assert_eq!(errors.len(), 5, "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("base_ms")));
        assert!(errors.iter().any(|e| e.contains("token_pattern")));
        assert!(errors.iter().any(|e| e.contains("concurrency")));
        assert!(errors.iter().any(|e| e.contains("metrics.path")));
        assert!(errors.iter().any(|e| e.contains("logging.level")));
    }
}
