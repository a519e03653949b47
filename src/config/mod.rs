// src/config/mod.rs

pub mod app;
pub mod environment;
pub mod loader;
pub mod validation;

pub use app::{AccessConfig, AppConfig, PoolConfig, ServerConfig, UpstreamConfig};
pub use environment::{apply_env_overrides, load_api_keys_from_env};
pub use loader::load_config;
pub use validation::ConfigValidator;
