// src/lib.rs

pub mod admin;
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod key_manager;
pub mod ledger;
pub mod metrics;
pub mod middleware;
pub mod proxy;
pub mod state;
pub mod storage;
pub mod translation;

use crate::handlers::{
    health_check, metrics_handler, model_proxy_handler, model_proxy_info, proxy_handler, proxy_info,
};
use axum::{
    body::Body,
    http::{HeaderValue, Request as AxumRequest},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::{path::Path, sync::Arc, time::Instant};
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

pub use config::AppConfig;
pub use error::{AppError, Result};
pub use state::AppState;

/// Builds the application router around `state`.
pub fn create_router(state: Arc<AppState>) -> Router {
    let gated_proxy = post(model_proxy_handler).route_layer(from_fn_with_state(
        state.clone(),
        crate::middleware::access_guard_middleware,
    ));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/api/proxy", get(proxy_info).post(proxy_handler))
        .route("/v1beta/models/:model", get(model_proxy_info).merge(gated_proxy))
        .merge(admin::admin_routes(state.clone()))
        .with_state(state)
        .layer(axum::middleware::from_fn(trace_requests))
}

/// Assigns a request id, wraps the request in a span and logs its outcome.
async fn trace_requests(mut req: AxumRequest<Body>, next: axum::middleware::Next) -> impl IntoResponse {
    let request_id = Uuid::new_v4();
    let start_time = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let span = info_span!(
        "request",
        request_id = %request_id,
        http.method = %method,
        url.path = %path,
    );

    req.extensions_mut().insert(request_id);

    async move {
        let mut response = next.run(req).await;
        let elapsed = start_time.elapsed();

        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            response.headers_mut().insert("X-Request-ID", value);
        }

        info!(
            http.response.duration = ?elapsed,
            http.status_code = response.status().as_u16(),
            "Finished processing request"
        );

        response
    }
    .instrument(span)
    .await
}

/// Loads configuration, opens the store, starts background recovery and
/// returns the ready router together with the effective configuration.
pub async fn run(config_path: &Path, port_override: Option<u16>) -> Result<(Router, AppConfig)> {
    info!("Starting Gemini key-pool proxy...");

    let mut app_config = config::load_config(config_path).map_err(|e| {
        error!(config.path = %config_path.display(), error = %e, "Failed to load or validate configuration. Exiting.");
        e
    })?;
    if let Some(port) = port_override {
        app_config.server.port = port;
    }
    info!(
        upstream.base_url = %app_config.upstream.normalized_base_url(),
        upstream.default_model = %app_config.upstream.default_model,
        pool.failure_threshold = app_config.pool.failure_threshold,
        pool.cooldown_secs = app_config.pool.cooldown_secs,
        config.seed_keys = app_config.api_keys.len(),
        server.port = app_config.server.port,
        "Configuration loaded and validated successfully."
    );

    metrics::initialize_metrics()?;

    let state = Arc::new(AppState::new(app_config.clone()).await.map_err(|e| {
        error!(error = %e, "Failed to initialize application state. Exiting.");
        e
    })?);
    let _recovery = state.key_manager.spawn_recovery_task();

    Ok((create_router(state), app_config))
}
