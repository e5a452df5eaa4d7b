//! # Token Relay Library
//!
//! Fronts a slow, unreliable token extraction with a TTL cache, a bounded
//! local retry loop and cross-request failure accounting, served over HTTP.
//!
//! Modules:
//! - `config`: YAML settings, defaults and validation
//! - `cache`: token cache and per-stream retry tracker
//! - `extractor`: extraction capability and the redirect-following implementation
//! - `resilience`: extraction retry cycle and single-flight
//! - `service`: request orchestration and cache housekeeping
//! - `server`: axum routes and handlers

pub mod config;
pub mod cache;
pub mod error;
pub mod extractor;
pub mod resilience;
pub mod service;
pub mod observability;
pub mod server;
pub mod helpers;
pub mod utils;

#[cfg(test)]
mod tests;

pub use crate::config::settings::ServiceConfig;
pub use crate::error::TokenError;
pub use crate::service::TokenService;
