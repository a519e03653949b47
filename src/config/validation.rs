// src/config/validation.rs

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::proxy::normalize_model;
use tracing::{debug, warn};
use url::Url;

/// Longest accepted recovery cooldown (one week).
pub const MAX_COOLDOWN_SECS: u64 = 7 * 24 * 60 * 60;

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &AppConfig) -> Result<()> {
        debug!("Starting configuration validation");

        if let Err(e) = Self::validate_upstream(config) {
            warn!("Upstream config validation failed: {}", e);
            return Err(e);
        }

        if let Err(e) = Self::validate_pool(config) {
            warn!("Pool config validation failed: {}", e);
            return Err(e);
        }

        if let Some(redis_url) = &config.redis_url {
            Self::validate_url(redis_url, "redis_url")?;
        }

        if let Err(e) = Self::validate_server_config(config) {
            warn!("Server config validation failed: {}", e);
            return Err(e);
        }

        if config.access.allowed_tokens.is_empty() {
            warn!("No access tokens configured; the model-path proxy route will reject every request");
        }

        debug!("Configuration validation completed successfully");
        Ok(())
    }

    fn validate_upstream(config: &AppConfig) -> Result<()> {
        let upstream = &config.upstream;
        let base = Self::validate_url(upstream.normalized_base_url(), "upstream.base_url")?;
        if base.query().is_some() {
            return Err(AppError::config_validation(
                format!("upstream.base_url must not contain a query string: {}", upstream.base_url),
                Some("upstream.base_url"),
            ));
        }

        if let Err(e) = normalize_model(&upstream.default_model) {
            return Err(AppError::config_validation(
                format!("upstream.default_model is not usable: {e}"),
                Some("upstream.default_model"),
            ));
        }

        if let Some(proxy_url) = &upstream.proxy_url {
            Self::validate_proxy_url(proxy_url)?;
        }
        Ok(())
    }

    fn validate_pool(config: &AppConfig) -> Result<()> {
        if config.pool.failure_threshold == 0 {
            return Err(AppError::config_validation(
                "Failure threshold must be at least 1",
                Some("pool.failure_threshold"),
            ));
        }
        if config.pool.cooldown_secs > MAX_COOLDOWN_SECS {
            return Err(AppError::config_validation(
                format!("Cooldown must be at most {MAX_COOLDOWN_SECS} seconds"),
                Some("pool.cooldown_secs"),
            ));
        }
        Ok(())
    }

    fn validate_server_config(config: &AppConfig) -> Result<()> {
        if config.server.port == 0 {
            return Err(AppError::config_validation(
                "Server port cannot be 0",
                Some("server.port"),
            ));
        }

        if config.server.connect_timeout_secs == 0 {
            return Err(AppError::config_validation(
                "Connect timeout cannot be 0",
                Some("server.connect_timeout_secs"),
            ));
        }

        if config.server.request_timeout_secs == 0 {
            return Err(AppError::config_validation(
                "Request timeout cannot be 0",
                Some("server.request_timeout_secs"),
            ));
        }

        Ok(())
    }

    fn validate_url(url_str: &str, field_name: &str) -> Result<Url> {
        Url::parse(url_str).map_err(|e| {
            AppError::config_validation(
                format!("Invalid URL in {field_name}: {url_str} - {e}"),
                Some(field_name),
            )
        })
    }

    pub(crate) fn validate_proxy_url(proxy_url: &str) -> Result<()> {
        let url = Url::parse(proxy_url).map_err(|e| AppError::ProxyConfig {
            url: proxy_url.to_string(),
            message: e.to_string(),
        })?;

        match url.scheme() {
            "http" | "https" | "socks5" => Ok(()),
            scheme => Err(AppError::ProxyConfig {
                url: proxy_url.to_string(),
                message: format!("Unsupported proxy scheme '{scheme}'. Supported: http, https, socks5"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ConfigValidator::validate(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let mut config = AppConfig::default();
        config.pool.failure_threshold = 0;
        let err = ConfigValidator::validate(&config).unwrap_err();
        assert!(matches!(err, AppError::ConfigValidation { field: Some(f), .. } if f == "pool.failure_threshold"));
    }

    #[test]
    fn test_oversized_cooldown_rejected() {
        let mut config = AppConfig::default();
        config.pool.cooldown_secs = MAX_COOLDOWN_SECS;
        assert!(ConfigValidator::validate(&config).is_ok());

        config.pool.cooldown_secs = u64::MAX;
        let err = ConfigValidator::validate(&config).unwrap_err();
        assert!(matches!(err, AppError::ConfigValidation { field: Some(f), .. } if f == "pool.cooldown_secs"));
    }

    #[test]
    fn test_unsafe_default_model_rejected() {
        let mut config = AppConfig::default();
        config.upstream.default_model = "../other".to_string();
        let err = ConfigValidator::validate(&config).unwrap_err();
        assert!(matches!(err, AppError::ConfigValidation { field: Some(f), .. } if f == "upstream.default_model"));
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let mut config = AppConfig::default();
        config.upstream.base_url = "not a url".to_string();
        assert!(ConfigValidator::validate(&config).is_err());

        config.upstream.base_url = "http://host/v1beta?x=1".to_string();
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_unsupported_proxy_scheme_rejected() {
        let mut config = AppConfig::default();
        config.upstream.proxy_url = Some("ftp://proxy.local".to_string());
        assert!(matches!(
            ConfigValidator::validate(&config),
            Err(AppError::ProxyConfig { .. })
        ));

        config.upstream.proxy_url = Some("socks5://127.0.0.1:1080".to_string());
        assert!(ConfigValidator::validate(&config).is_ok());
    }
}
