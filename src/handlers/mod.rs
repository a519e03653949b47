// src/handlers/mod.rs

pub mod bad_endpoint;
pub mod base;
pub mod invalid_api_key;
pub mod processor;
pub mod rate_limit;
pub mod success;
pub mod transport;
pub mod upstream_error;

use crate::{
    error::Result,
    metrics,
    proxy::ModelSource,
    state::AppState,
};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::{sync::Arc, time::Instant};

async fn run_proxy(
    state: &AppState,
    route: &'static str,
    source: ModelSource,
    body: Bytes,
) -> Result<Json<Value>> {
    let start = Instant::now();
    let result = match state.proxy.resolve_model(&source) {
        Ok(model) => state.proxy.handle(&model, &body).await,
        Err(e) => Err(e),
    };

    let (outcome, status) = match &result {
        Ok(_) => ("success", StatusCode::OK),
        Err(e) => (e.kind(), e.status_code()),
    };
    metrics::record_request(route, outcome, status.as_u16(), start.elapsed());

    result.map(Json)
}

/// `POST /api/proxy`: model from configuration, no access gate.
pub async fn proxy_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Json<Value>> {
    run_proxy(&state, "api_proxy", ModelSource::Configured, body).await
}

/// `POST /v1beta/models/:model`: model from the path, gated by the access guard.
pub async fn model_proxy_handler(
    State(state): State<Arc<AppState>>,
    Path(model): Path<String>,
    body: Bytes,
) -> Result<Json<Value>> {
    run_proxy(&state, "model_proxy", ModelSource::Path(model), body).await
}

pub async fn proxy_info(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "message": "Gemini key-pool proxy. POST an OpenAI-style chat request or a native generateContent body.",
        "model": state.proxy.default_model(),
        "status": "active",
    }))
}

pub async fn model_proxy_info(Path(model): Path<String>) -> Json<Value> {
    let model = model.split(':').next().unwrap_or_default().to_string();
    Json(json!({
        "message": "POST a request body to this path with ?key=<access token>.",
        "model": model,
        "status": "active",
        "usage": format!("POST /v1beta/models/{model}:generateContent?key=<access token>"),
    }))
}

pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn metrics_handler() -> Response {
    match metrics::render() {
        Some(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics exporter is not enabled").into_response(),
    }
}
