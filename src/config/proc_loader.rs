use std::{fs, path::Path};
use crate::config::settings::{LogFormat, LoggingConfig, ServiceConfig};
use crate::config::proc_validator;
use crate::observability::metrics::get_metrics;
use anyhow::{anyhow, Result};
use regex::Regex;
use tracing::{debug, error};

/// Load and validate config from YAML file
pub async fn file_to_config(path: &Path) -> Result<ServiceConfig> {
    let content = fs::read_to_string(path)?;

    let expanded = expand_env_vars(&content);
    parse_config(expanded).await
}

pub async fn parse_config(content: String) -> Result<ServiceConfig> {
    let metrics = get_metrics().await;
    // an empty document is a valid "all defaults" config
    let mut service_config: ServiceConfig = if content.trim().is_empty() {
        ServiceConfig::default()
    } else {
        serde_yaml::from_str(&content).inspect_err(|e| {
            error!("parse config error: {}", e);
            metrics.config_validation_errors.inc();
        })?
    };

    // Apply defaults
    if service_config.settings.logging.is_none() {
        service_config.settings.logging = Some(LoggingConfig::new("info".to_owned(), LogFormat::Compact));
    }

    debug!("validation config ...");
    proc_validator::validate_service_config(&service_config).map_err(|errors| {
        metrics.config_validation_errors.inc_by(errors.len() as u64);
        anyhow!("invalid config: {}", errors.join("; "))
    })?;

    Ok(service_config)
}

/// Replaces `${VAR}` and `${VAR:default}` with the environment value.
pub fn expand_env_vars(input: &str) -> String {
    let re = Regex::new(r"\$\{(\w+)(?::([^\}]+))?\}").expect("static env placeholder regex");
    re.replace_all(input, |caps: &regex::Captures| {
        let var = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(var).unwrap_or_else(|_| default.to_string())
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[tokio::test]
    async fn empty_document_yields_defaults() -> Result<()> {
        let cfg = parse_config(String::new()).await?;
        assert_eq!(cfg.settings.cache.ttl_ms, 120_000);
        assert_eq!(cfg.settings.retry.attempts, 3);
        assert_eq!(cfg.settings.backoff.max_ms, 30_000);
        assert!(!cfg.settings.backoff.enforce);
        assert_eq!(cfg.settings.logging.unwrap().format, LogFormat::Compact);
        Ok(())
    }

    #[tokio::test]
    async fn partial_sections_keep_remaining_defaults() -> Result<()> {
        let yaml = r#"
settings:
  server:
    port: 8088
  cache:
    ttl_ms: 5000
  logging:
    level: debug
    format: json
"#;
        let cfg = parse_config(yaml.to_string()).await?;
        assert_eq!(cfg.settings.server.port, 8088);
        assert_eq!(cfg.settings.server.host, "0.0.0.0");
        assert_eq!(cfg.settings.cache.ttl_ms, 5000);
        assert_eq!(cfg.settings.cache.capacity, 10_000);
        assert_eq!(cfg.settings.logging.unwrap().format, LogFormat::Json);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_values_are_rejected() {
        let yaml = r#"
settings:
  cache:
    ttl_ms: 0
  retry:
    attempts: 0
"#;
        let err = parse_config(yaml.to_string()).await.unwrap_err().to_string();
        assert!(err.contains("ttl_ms"), "{err}");
        assert!(err.contains("attempts"), "{err}");
    }

    #[test]
    #[serial]
    fn env_placeholders_expand_with_default() {
        std::env::set_var("TOKEN_RELAY_TEST_PORT", "9191");
        std::env::remove_var("TOKEN_RELAY_TEST_MISSING");
        let out = expand_env_vars("port: ${TOKEN_RELAY_TEST_PORT}\nhost: ${TOKEN_RELAY_TEST_MISSING:127.0.0.1}");
        assert_eq!(out, "port: 9191\nhost: 127.0.0.1");
        std::env::remove_var("TOKEN_RELAY_TEST_PORT");
    }

    #[tokio::test]
    async fn loads_from_file() -> Result<()> {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "settings:\n  batch:\n    concurrency: 2")?;
        let cfg = file_to_config(file.path()).await?;
        assert_eq!(cfg.settings.batch.concurrency, 2);
        Ok(())
    }
}
