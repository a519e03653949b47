// src/config/app.rs

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Bearer token for the `/admin` surface. `None` disables admin access.
    #[serde(default)]
    pub admin_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            admin_token: None,
        }
    }
}

/// Where and how the upstream generative-language API is reached.
#[derive(Debug, Deserialize, Clone, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model used by routes that do not carry a model in their path.
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Optional outbound proxy (http, https or socks5).
    #[serde(default)]
    pub proxy_url: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            default_model: default_model(),
            proxy_url: None,
        }
    }
}

impl UpstreamConfig {
    /// Base URL without trailing slashes.
    pub fn normalized_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    /// Consecutive failures after which a key is marked unhealthy.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Minimum time since the last failure before an unhealthy key is restored.
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    /// Period of the background recovery task. `0` disables the task.
    #[serde(default = "default_recovery_interval")]
    pub recovery_interval_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown(),
            recovery_interval_secs: default_recovery_interval(),
        }
    }
}

impl PoolConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AccessConfig {
    /// Tokens accepted in the `key` query parameter of gated proxy routes.
    #[serde(default)]
    pub allowed_tokens: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub access: AccessConfig,
    /// Keys seeded into an empty store at startup.
    #[serde(default)]
    pub api_keys: Vec<String>,
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default)]
    pub redis_key_prefix: Option<String>,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    300
}

pub(crate) fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

pub(crate) fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_cooldown() -> u64 {
    5 * 60
}

fn default_recovery_interval() -> u64 {
    60
}
