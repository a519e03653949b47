// src/state.rs

use crate::config::{AppConfig, ConfigValidator};
use crate::error::{AppError, Result};
use crate::key_manager::KeyManager;
use crate::ledger::CallLedger;
use crate::middleware::{AccessGuard, AllowListGuard};
use crate::proxy::ProxyHandler;
use crate::storage::{InMemoryStore, Store};
use reqwest::{Client, ClientBuilder, Proxy};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use url::Url;

/// Represents the shared application state that is accessible by all Axum handlers.
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub key_manager: Arc<KeyManager>,
    pub ledger: Arc<CallLedger>,
    pub proxy: ProxyHandler,
    pub access_guard: Arc<dyn AccessGuard>,
}

impl AppState {
    /// Connects the configured store, seeds it, and builds the HTTP client.
    pub async fn new(config: AppConfig) -> Result<Self> {
        let store = open_store(&config).await?;
        let state = Self::with_store(config, store)?;
        state.key_manager.seed(&state.config.api_keys).await?;
        Ok(state)
    }

    /// Assembles the state around an already opened store. Does not seed.
    pub fn with_store(config: AppConfig, store: Arc<dyn Store>) -> Result<Self> {
        let http_client = build_http_client(&config)?;
        let key_manager = Arc::new(KeyManager::new(Arc::clone(&store), config.pool.clone()));
        let ledger = Arc::new(CallLedger::new(store));
        let proxy = ProxyHandler::new(
            &config.upstream,
            http_client,
            Arc::clone(&key_manager),
            Arc::clone(&ledger),
        );
        let access_guard: Arc<dyn AccessGuard> =
            Arc::new(AllowListGuard::new(config.access.allowed_tokens.clone()));

        Ok(Self {
            config: Arc::new(config),
            key_manager,
            ledger,
            proxy,
            access_guard,
        })
    }
}

#[cfg(feature = "redis")]
async fn open_store(config: &AppConfig) -> Result<Arc<dyn Store>> {
    match config.redis_url.as_deref() {
        Some(url) => {
            info!("Redis persistence is enabled.");
            let store =
                crate::storage::RedisStore::connect(url, config.redis_key_prefix.clone()).await?;
            Ok(Arc::new(store))
        }
        None => {
            info!("Running with the in-memory key store.");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}

#[cfg(not(feature = "redis"))]
async fn open_store(config: &AppConfig) -> Result<Arc<dyn Store>> {
    if config.redis_url.is_some() {
        return Err(AppError::config_validation(
            "redis_url is set but this build has no Redis support",
            Some("redis_url"),
        ));
    }
    info!("Running with the in-memory key store.");
    Ok(Arc::new(InMemoryStore::new()))
}

/// Builds the shared outbound client, routed through `upstream.proxy_url` when set.
pub fn build_http_client(config: &AppConfig) -> Result<Client> {
    let configure_builder = |builder: ClientBuilder| -> ClientBuilder {
        builder
            .connect_timeout(Duration::from_secs(config.server.connect_timeout_secs))
            .timeout(Duration::from_secs(config.server.request_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Some(Duration::from_secs(60)))
    };

    let mut builder = configure_builder(Client::builder());

    if let Some(proxy_url) = config.upstream.proxy_url.as_deref().filter(|u| !u.trim().is_empty()) {
        ConfigValidator::validate_proxy_url(proxy_url)?;
        let scheme = Url::parse(proxy_url)
            .map(|u| u.scheme().to_lowercase())
            .map_err(|e| proxy_error(proxy_url, e))?;

        let proxy = match scheme.as_str() {
            "http" => Proxy::http(proxy_url),
            "https" => Proxy::https(proxy_url),
            _ => Proxy::all(proxy_url),
        }
        .map_err(|e| {
            error!(proxy_url = %proxy_url, scheme = %scheme, error = %e, "Invalid outbound proxy definition");
            proxy_error(proxy_url, e)
        })?;

        info!(proxy.scheme = %scheme, "Routing upstream traffic through outbound proxy");
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {e}")))
}

fn proxy_error(url: &str, err: impl std::fmt::Display) -> AppError {
    AppError::ProxyConfig {
        url: url.to_string(),
        message: err.to_string(),
    }
}
