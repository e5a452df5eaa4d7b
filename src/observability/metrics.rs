use prometheus::{Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use tracing::info;
use std::sync::Arc;
use tokio::sync::OnceCell;

pub static REASON_ATTEMPT: &str = "attempt";
pub static REASON_CYCLE: &str = "cycle";
pub static REASON_BACKOFF: &str = "backoff";
pub static EVICTION_CAPACITY: &str = "capacity";
pub static EVICTION_SWEEP: &str = "sweep";

// Declare the static OnceCell to hold the Metrics.
static METRICS_INSTANCE: OnceCell<Arc<Metrics>> = OnceCell::const_new();

/// Asynchronously initializes and gets a reference to the static `Metrics`.
pub async fn get_metrics() -> &'static Arc<Metrics> {
    METRICS_INSTANCE.get_or_init(|| async {
        info!("Initializing Metrics ...");
        Metrics::new()}
    ).await
}


#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Request metrics
    pub token_requests: IntCounterVec,

    // Cache metrics
    pub cache_hits: IntCounter,
    pub cache_misses: IntCounter,
    pub cache_evictions: IntCounterVec,
    pub cached_tokens: IntGauge,

    // Extraction metrics
    pub extraction_attempts: IntCounter,
    pub extraction_failures: IntCounterVec,
    pub extraction_duration: Histogram,
    pub singleflight_joins: IntCounter,

    // Retry tracker
    pub tracked_streams: IntGauge,

    // Config/runtime
    pub config_validation_errors: IntCounter,
    pub up: IntGauge,

    // === Service resource metrics ===
    pub process_cpu_usage: Gauge,
    pub process_memory_usage: IntGauge,
    pub process_virtual_memory: IntGauge,
    pub process_open_fds: IntGauge,
    pub process_start_time: IntGauge,
    pub process_uptime: IntGauge,
}

impl Metrics {
    fn new() -> Arc<Self> {
        let registry = Registry::new_custom(Some("tokenrelay".into()), None).unwrap();

        let metrics: Arc<Metrics> = Arc::new(Self {
            // Requests
            token_requests: IntCounterVec::new(Opts::new("token_requests_total", "Token requests by path"), &["path"]).unwrap(),

            // Cache
            cache_hits: IntCounter::new("cache_hits_total", "Requests served from a fresh cache entry").unwrap(),
            cache_misses: IntCounter::new("cache_misses_total", "Requests that required extraction").unwrap(),
            cache_evictions: IntCounterVec::new(Opts::new("cache_evictions_total", "Cache entries removed by reason"), &["reason"]).unwrap(),
            cached_tokens: IntGauge::new("cached_tokens", "Resident cache entries, fresh or stale").unwrap(),

            // Extraction
            extraction_attempts: IntCounter::new("extraction_attempts_total", "Extractor invocations").unwrap(),
            extraction_failures: IntCounterVec::new(Opts::new("extraction_failures_total", "Extraction failures by reason"), &["reason"]).unwrap(),
            extraction_duration: Histogram::with_opts(HistogramOpts::new("extraction_cycle_duration_seconds", "Extraction cycle duration seconds").buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0])).unwrap(),
            singleflight_joins: IntCounter::new("singleflight_joins_total", "Requests that joined an in-flight extraction").unwrap(),

            tracked_streams: IntGauge::new("tracked_streams", "Streams with recorded failures").unwrap(),

            // Config/runtime
            config_validation_errors: IntCounter::new("config_validation_errors_total", "Validation errors during startup").unwrap(),
            up: IntGauge::new("up", "1 if service is healthy").unwrap(),
            process_cpu_usage: Gauge::new("process_cpu_usage_percent", "CPU usage % of this process").unwrap(),
            process_memory_usage: IntGauge::new("process_memory_usage_bytes", "Resident memory used by this process").unwrap(),
            process_virtual_memory: IntGauge::new("process_virtual_memory_bytes", "Virtual memory used by this process").unwrap(),
            process_open_fds: IntGauge::new("process_open_fds", "Number of open file descriptors").unwrap(),
            process_start_time: IntGauge::new("process_start_time_seconds", "Process start time (UNIX seconds)").unwrap(),
            process_uptime: IntGauge::new("process_uptime_seconds", "Process uptime seconds").unwrap(),

            registry,
        });

        // Register all metrics in the registry
        let reg = &metrics.registry;
        reg.register(Box::new(metrics.token_requests.clone())).unwrap();
        reg.register(Box::new(metrics.cache_hits.clone())).unwrap();
        reg.register(Box::new(metrics.cache_misses.clone())).unwrap();
        reg.register(Box::new(metrics.cache_evictions.clone())).unwrap();
        reg.register(Box::new(metrics.cached_tokens.clone())).unwrap();
        reg.register(Box::new(metrics.extraction_attempts.clone())).unwrap();
        reg.register(Box::new(metrics.extraction_failures.clone())).unwrap();
        reg.register(Box::new(metrics.extraction_duration.clone())).unwrap();
        reg.register(Box::new(metrics.singleflight_joins.clone())).unwrap();
        reg.register(Box::new(metrics.tracked_streams.clone())).unwrap();
        reg.register(Box::new(metrics.config_validation_errors.clone())).unwrap();
        reg.register(Box::new(metrics.up.clone())).unwrap();

        reg.register(Box::new(metrics.process_cpu_usage.clone())).unwrap();
        reg.register(Box::new(metrics.process_memory_usage.clone())).unwrap();
        reg.register(Box::new(metrics.process_virtual_memory.clone())).unwrap();
        reg.register(Box::new(metrics.process_open_fds.clone())).unwrap();
        reg.register(Box::new(metrics.process_start_time.clone())).unwrap();
        reg.register(Box::new(metrics.process_uptime.clone())).unwrap();

        metrics
    }
}
