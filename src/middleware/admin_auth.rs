// src/middleware/admin_auth.rs

use crate::{error::AppError, state::AppState};
use axum::{
    body::Body,
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Constant-time string comparison to prevent timing attacks
pub(crate) fn secure_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (byte_a, byte_b) in a.bytes().zip(b.bytes()) {
        result |= byte_a ^ byte_b;
    }
    result == 0
}

fn bearer_token(req: &Request<Body>) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Requires `Authorization: Bearer <server.admin_token>`.
/// With no admin token configured every request is rejected.
pub async fn admin_auth_middleware(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = state
        .config
        .server
        .admin_token
        .as_deref()
        .filter(|t| !t.is_empty())
    else {
        warn!("Admin request rejected: no admin token configured");
        return Err(AppError::Unauthorized {
            message: "admin access is disabled".to_string(),
        });
    };

    match bearer_token(&req) {
        Some(token) if secure_compare(token, expected) => {
            debug!("Admin authentication successful");
            Ok(next.run(req).await)
        }
        _ => {
            warn!("Admin authentication failed: invalid or missing token");
            Err(AppError::Unauthorized {
                message: "invalid or missing admin token".to_string(),
            })
        }
    }
}
