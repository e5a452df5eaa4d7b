// tests/common/mod.rs
pub use axum::Router;
pub use serde_json::json;
pub use tokio::task::JoinHandle;

use async_trait::async_trait;
use reqwest::Client;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::settings::SettingsConfig;
use crate::extractor::{ExtractError, Extractor};
use crate::observability::metrics::get_metrics;
use crate::server::server::{build_router, AppState};
use crate::service::TokenService;

/// Spawn an Axum router on an ephemeral port and return (JoinHandle, SocketAddr)
pub async fn spawn_axum(router: Router) -> (JoinHandle<()>, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });
    (handle, addr)
}

pub fn build_reqwest_client() -> Client {
    Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()
        .expect("reqwest client")
}

/// Settings with millisecond retry delays so HTTP tests stay fast.
pub fn fast_settings() -> SettingsConfig {
    let mut settings = SettingsConfig::default();
    settings.retry.base_delay_ms = 5;
    settings.metrics.is_enabled = true;
    settings
}

/// Full app behind an ephemeral port: (handle, base url, service).
pub async fn spawn_app(
    extractor: Arc<ScriptedExtractor>,
    settings: SettingsConfig,
) -> (JoinHandle<()>, String, Arc<TokenService>) {
    let service = Arc::new(TokenService::new(&settings, extractor));
    let state = AppState::new(get_metrics().await, service.clone());
    let (handle, addr) = spawn_axum(build_router(state, &settings)).await;
    (handle, format!("http://{}", addr), service)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Ok,
    Fail,
    Panic,
}

/// Extractor that plays back a fixed script of outcomes, then repeats `fallback`.
/// A successful call for `url` yields `{url}#token-{call number}`.
pub struct ScriptedExtractor {
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedExtractor {
    pub fn scripted(script: Vec<Step>, fallback: Step) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always(step: Step) -> Self {
        Self::scripted(Vec::new(), step)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    async fn extract(&self, source_url: &str, _timeout: Duration) -> Result<String, ExtractError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let step = self.script.lock().unwrap().pop_front().unwrap_or(self.fallback);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match step {
            Step::Ok => Ok(format!("{}#token-{}", source_url, call)),
            Step::Fail => Err(ExtractError::new(format!("scripted failure on call {}", call))),
            Step::Panic => panic!("scripted panic on call {}", call),
        }
    }
}
