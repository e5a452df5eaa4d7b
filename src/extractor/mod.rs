//! Token extraction capability.
//!
//! The orchestrator only sees the `Extractor` trait: one attempt, one source
//! url, one timeout budget. Retrying is the caller's business.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub mod redirect;

pub use redirect::RedirectExtractor;

/// Why a single extraction attempt produced no token url.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ExtractError {
    pub message: String,
}

impl ExtractError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl From<reqwest::Error> for ExtractError {
    fn from(err: reqwest::Error) -> Self {
        ExtractError::new(err.to_string())
    }
}

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Produce the token url behind `source_url` within `timeout`.
    async fn extract(&self, source_url: &str, timeout: Duration) -> Result<String, ExtractError>;
}
