use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use reqwest::{header::LOCATION, redirect::Policy, Client, Url};
use std::time::Duration;
use tracing::debug;

use crate::config::settings::ExtractorConfig;
use crate::extractor::{ExtractError, Extractor};

/// Follows the redirect chain of a source url by hand and returns the first
/// hop whose url matches `token_pattern`. When the chain ends without a match,
/// the final response body is searched for an absolute url that matches.
#[derive(Debug, Clone)]
pub struct RedirectExtractor {
    client: Client,
    max_hops: usize,
    token_pattern: Regex,
    url_in_body: Regex,
}

impl RedirectExtractor {
    pub fn new(config: &ExtractorConfig) -> Result<Self> {
        let client = Client::builder()
            .redirect(Policy::none())
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self {
            client,
            max_hops: config.max_hops.max(1),
            token_pattern: Regex::new(&config.token_pattern)?,
            url_in_body: Regex::new(r#"https?://[^\s"'<>\\]+"#)?,
        })
    }

    async fn follow(&self, source_url: &str) -> Result<String, ExtractError> {
        let mut current = Url::parse(source_url)
            .map_err(|e| ExtractError::new(format!("invalid source url '{}': {}", source_url, e)))?;

        for hop in 0..self.max_hops {
            let response = self.client.get(current.clone()).send().await?;
            let status = response.status();
            debug!("hop {} {} -> {}", hop, current, status);

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .ok_or_else(|| ExtractError::new(format!("{} from {} without location", status, current)))?;
                let next = current
                    .join(location)
                    .map_err(|e| ExtractError::new(format!("bad redirect location '{}': {}", location, e)))?;
                if self.token_pattern.is_match(next.as_str()) {
                    return Ok(next.to_string());
                }
                current = next;
                continue;
            }

            if !status.is_success() {
                return Err(ExtractError::new(format!("HTTP {} from {}", status, current)));
            }

            let body = response.text().await?;
            return self.find_in_body(&body).ok_or_else(|| {
                ExtractError::new(format!("no token url found behind {}", source_url))
            });
        }

        Err(ExtractError::new(format!(
            "no token url within {} redirects of {}",
            self.max_hops, source_url
        )))
    }

    fn find_in_body(&self, body: &str) -> Option<String> {
        self.url_in_body
            .find_iter(body)
            .map(|m| m.as_str())
            .find(|candidate| self.token_pattern.is_match(candidate))
            .map(str::to_string)
    }
}

#[async_trait]
impl Extractor for RedirectExtractor {
    async fn extract(&self, source_url: &str, timeout: Duration) -> Result<String, ExtractError> {
        tokio::time::timeout(timeout, self.follow(source_url))
            .await
            .map_err(|_| ExtractError::new(format!("timed out after {} ms", timeout.as_millis())))?
    }
}
