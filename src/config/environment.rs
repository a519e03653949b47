//! Environment-based configuration overrides

use crate::config::AppConfig;
use std::env;
use tracing::{info, warn};

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = non_empty_var(name)?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(env.var = name, value = %raw, "Ignoring unparsable environment variable");
            None
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split([',', '\n'])
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Applies environment variable overrides on top of file-based configuration.
pub fn apply_env_overrides(config: &mut AppConfig) {
    if let Some(base) = non_empty_var("GEMINI_API_BASE") {
        info!("Overriding upstream base URL from environment");
        config.upstream.base_url = base;
    }
    if let Some(model) = non_empty_var("GEMINI_MODEL") {
        info!(model = %model, "Overriding default model from environment");
        config.upstream.default_model = model;
    }
    if let Some(proxy) = non_empty_var("UPSTREAM_PROXY_URL") {
        info!("Overriding upstream proxy URL from environment");
        config.upstream.proxy_url = Some(proxy);
    }
    if let Some(tokens) = non_empty_var("ALLOWED_TOKENS") {
        config.access.allowed_tokens = split_list(&tokens);
    } else if let Some(token) = non_empty_var("ALLOWED_TOKEN") {
        config.access.allowed_tokens = vec![token];
    }
    if let Some(token) = non_empty_var("ADMIN_TOKEN") {
        config.server.admin_token = Some(token);
    }
    if let Some(redis_url) = non_empty_var("REDIS_URL") {
        info!("Overriding Redis URL from environment variable");
        config.redis_url = Some(redis_url);
    }
    if let Some(port) = parse_var::<u16>("PORT") {
        info!("Overriding server port from environment variable: {}", port);
        config.server.port = port;
    }
    if let Some(threshold) = parse_var::<u32>("MAX_FAILURES_THRESHOLD") {
        info!("Overriding failure threshold from environment: {}", threshold);
        config.pool.failure_threshold = threshold;
    }
    if let Some(cooldown) = parse_var::<u64>("RECOVERY_COOLDOWN_SECS") {
        config.pool.cooldown_secs = cooldown;
    }

    let env_keys = load_api_keys_from_env();
    if !env_keys.is_empty() {
        info!(count = env_keys.len(), "Seed API keys found in environment");
        config.api_keys.extend(env_keys);
    }
}

/// Load API keys from environment variables.
/// Supports GEMINI_API_KEY_1, GEMINI_API_KEY_2, ..., a single GEMINI_API_KEY,
/// or a comma-separated GEMINI_API_KEYS.
pub fn load_api_keys_from_env() -> Vec<String> {
    let mut keys = Vec::new();
    let mut index = 1;

    while let Ok(key) = env::var(format!("GEMINI_API_KEY_{index}")) {
        if !key.trim().is_empty() {
            keys.push(key.trim().to_string());
        }
        index += 1;
    }

    if keys.is_empty() {
        if let Some(key) = non_empty_var("GEMINI_API_KEY") {
            keys.push(key);
        }
    }

    if keys.is_empty() {
        if let Some(keys_str) = non_empty_var("GEMINI_API_KEYS") {
            keys.extend(split_list(&keys_str));
        }
    }

    keys
}
