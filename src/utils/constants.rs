//! Shared constants and invariants

pub const DEFAULT_CACHE_TTL_MS: u64 = 120_000;
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

// extraction cycle: 3 attempts, 1s then 2s between them
pub const DEFAULT_EXTRACT_ATTEMPTS: u32 = 3;
pub const DEFAULT_EXTRACT_BASE_DELAY_MS: u64 = 1_000;
pub const DEFAULT_EXTRACTOR_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_EXTRACTOR_MAX_HOPS: usize = 5;
pub const DEFAULT_TOKEN_PATTERN: &str = "token=";
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

// cross-request backoff advisement
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 5_000;
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;

pub const DEFAULT_BATCH_CONCURRENCY: usize = 8;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;

/// Diagnostic views cut source urls to this many characters.
pub const STATS_URL_PREVIEW_CHARS: usize = 50;
