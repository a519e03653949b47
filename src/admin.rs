// src/admin.rs

use crate::{
    error::{AppError, Result},
    key_manager::{KeySummary, PoolHealth},
    ledger::KeyCallStats,
    state::AppState,
};
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::info;
use validator::Validate;

// --- Router Definition ---

/// Key-pool administration under `/admin`, all behind the admin bearer token.
pub fn admin_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new().nest(
        "/admin",
        Router::new()
            .route(
                "/keys",
                get(list_keys)
                    .post(add_key)
                    .patch(set_key_active)
                    .delete(delete_key),
            )
            .route("/keys/health", get(keys_health))
            .route("/keys/call-stats", get(call_stats))
            .route("/keys/recover", post(recover_keys))
            .route_layer(middleware::from_fn_with_state(
                state,
                crate::middleware::admin_auth_middleware,
            )),
    )
}

// --- Request/Response Structs ---

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddKeyRequest {
    #[validate(length(min = 1, message = "API key is required"))]
    pub api_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetActiveRequest {
    pub id: i64,
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct DeleteKeyQuery {
    pub id: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RecoverRequest {
    /// Overrides `pool.cooldown_secs` for this run.
    #[validate(range(max = 10080, message = "cooldown must be at most one week"))]
    pub cooldown_minutes: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct KeyMutationResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<KeySummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverResponse {
    pub success: bool,
    pub recovered: u64,
    pub cooldown_secs: u64,
}

fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::validation("body", rejection.body_text()))
}

// --- Handlers ---

pub async fn list_keys(State(state): State<Arc<AppState>>) -> Result<Json<Vec<KeySummary>>> {
    Ok(Json(state.key_manager.list().await?))
}

pub async fn add_key(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<AddKeyRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<KeyMutationResponse>)> {
    let request = json_body(payload)?;
    request.validate()?;

    let key = state.key_manager.add(&request.api_key).await?;
    Ok((
        StatusCode::CREATED,
        Json(KeyMutationResponse {
            success: true,
            key: Some(key),
        }),
    ))
}

pub async fn set_key_active(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<SetActiveRequest>, JsonRejection>,
) -> Result<Json<KeyMutationResponse>> {
    let request = json_body(payload)?;
    let key = state
        .key_manager
        .set_active(request.id, request.is_active)
        .await?;
    Ok(Json(KeyMutationResponse {
        success: true,
        key: Some(key),
    }))
}

pub async fn delete_key(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DeleteKeyQuery>,
) -> Result<Json<KeyMutationResponse>> {
    let id = query
        .id
        .as_deref()
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .ok_or_else(|| AppError::validation("id", "Valid ID is required"))?;

    state.key_manager.delete(id).await?;
    Ok(Json(KeyMutationResponse {
        success: true,
        key: None,
    }))
}

pub async fn keys_health(State(state): State<Arc<AppState>>) -> Result<Json<PoolHealth>> {
    Ok(Json(state.key_manager.health().await?))
}

pub async fn call_stats(State(state): State<Arc<AppState>>) -> Result<Json<Vec<KeyCallStats>>> {
    Ok(Json(state.ledger.aggregate().await?))
}

pub async fn recover_keys(
    State(state): State<Arc<AppState>>,
    payload: Option<Json<RecoverRequest>>,
) -> Result<Json<RecoverResponse>> {
    let request = payload.map(|Json(body)| body).unwrap_or_default();
    request.validate()?;

    let cooldown = request
        .cooldown_minutes
        .map_or_else(|| state.key_manager.policy().cooldown(), |m| Duration::from_secs(m * 60));
    info!(cooldown_secs = cooldown.as_secs(), "On-demand key recovery requested");

    let recovered = state.key_manager.recover_unhealthy(cooldown).await?;
    Ok(Json(RecoverResponse {
        success: true,
        recovered,
        cooldown_secs: cooldown.as_secs(),
    }))
}
