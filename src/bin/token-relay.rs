use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use token_relay::extractor::RedirectExtractor;
use token_relay::observability::service_resources_metrics::collect_process_metrics;
use token_relay::server;
use token_relay::service::housekeeping::run_cache_sweeper;
use token_relay::service::TokenService;
use token_relay::utils::config_loader;
use token_relay::utils::logging;
use token_relay::utils::logging::LogLevel;
use tracing::{error, info};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, env = "CONFIG", default_value = "token-relay.yaml")]
    config: String,
    #[arg(long, env = "LOG_LEVEL" , value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // -------------------------------
    // 1. Load YAML config, start logging
    // -------------------------------

    let args = Args::parse();
    let service_config = config_loader::run(&args.config).await?;
    logging::run(&service_config, args.log_level.to_owned()).await?;
    let settings = &service_config.settings;

    // -------------------------------
    // 2. Build extractor and token service
    // -------------------------------

    let extractor = RedirectExtractor::new(&settings.extractor)?;
    let token_service = Arc::new(TokenService::new(settings, Arc::new(extractor)));

    // -------------------------------
    // 3. Background workers: stale token sweep, process metrics
    // -------------------------------

    let sweeper = run_cache_sweeper(token_service.cache().clone(), settings.cache.sweep_interval_secs);
    tokio::spawn(async move {
        if let Err(e) = sweeper.await {
            error!("cache sweeper stopped: {}", e);
        }
    });

    let service_metrics = collect_process_metrics(settings.metrics.is_enabled);
    tokio::spawn(async move {
        if let Err(e) = service_metrics.await {
            error!("process metrics collector stopped: {}", e);
        }
    });

    // -------------------------------
    // 4. Serve HTTP until shutdown
    // -------------------------------

    info!("Service starting...");
    server::server::start(settings, token_service).await
}
