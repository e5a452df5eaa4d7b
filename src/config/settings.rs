use serde::Deserialize;

use crate::utils::constants::*;

/// ================================
/// Full service configuration
/// ================================
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ServiceConfig {
    #[serde(default)]
    pub settings: SettingsConfig,
}

/// ================================
/// Global service-wide settings
/// ================================
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SettingsConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

/// ================================
/// Token cache
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// freshness window of an extracted token
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,
    /// invariant: > 0
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// 0 disables the background sweep
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_ttl_ms(),
            capacity: default_capacity(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Local retries inside one extraction cycle.
#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    /// total attempts, including the first one
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// delay before retry N (1-based) is base_delay_ms * N
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { attempts: default_attempts(), base_delay_ms: default_base_delay_ms() }
    }
}

/// Cross-request failure accounting.
#[derive(Debug, Deserialize, Clone)]
pub struct BackoffConfig {
    #[serde(default = "default_backoff_base_ms")]
    pub base_ms: u64,
    /// invariant: >= base_ms
    #[serde(default = "default_backoff_max_ms")]
    pub max_ms: u64,
    /// reject requests inside the backoff window instead of only advising
    #[serde(default)]
    pub enforce: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self { base_ms: default_backoff_base_ms(), max_ms: default_backoff_max_ms(), enforce: false }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractorConfig {
    #[serde(default = "default_extractor_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,
    /// regex a redirect target must match to be accepted as the token url
    #[serde(default = "default_token_pattern")]
    pub token_pattern: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_extractor_timeout_ms(),
            max_hops: default_max_hops(),
            token_pattern: default_token_pattern(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BatchConfig {
    #[serde(default = "default_batch_concurrency")]
    pub concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { concurrency: default_batch_concurrency() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_path")]
    pub path: String,
    #[serde(default)]
    pub is_enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { path: default_metrics_path(), is_enabled: false }
    }
}

/// ================================
/// Logging
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String, // allowed: trace, debug, info, warn, error
    pub format: LogFormat,
}

impl LoggingConfig {
    pub fn new (level: String, format: LogFormat) -> Self {
        Self { level, format }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Compact,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_ttl_ms() -> u64 {
    DEFAULT_CACHE_TTL_MS
}
fn default_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}
fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}
fn default_attempts() -> u32 {
    DEFAULT_EXTRACT_ATTEMPTS
}
fn default_base_delay_ms() -> u64 {
    DEFAULT_EXTRACT_BASE_DELAY_MS
}
fn default_backoff_base_ms() -> u64 {
    DEFAULT_BACKOFF_BASE_MS
}
fn default_backoff_max_ms() -> u64 {
    DEFAULT_BACKOFF_MAX_MS
}
fn default_extractor_timeout_ms() -> u64 {
    DEFAULT_EXTRACTOR_TIMEOUT_MS
}
fn default_max_hops() -> usize {
    DEFAULT_EXTRACTOR_MAX_HOPS
}
fn default_token_pattern() -> String {
    DEFAULT_TOKEN_PATTERN.to_string()
}
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}
fn default_batch_concurrency() -> usize {
    DEFAULT_BATCH_CONCURRENCY
}
fn default_metrics_path() -> String {
    "/metrics".to_string()
}
