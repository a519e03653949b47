// src/middleware/access_token.rs

//! Access-control pre-step for gated proxy routes.

use crate::{error::AppError, middleware::admin_auth::secure_compare, state::AppState};
use axum::{
    body::Body,
    extract::{Request, State},
    http::Uri,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

/// Decides whether an inbound request may reach the pool at all.
pub trait AccessGuard: Send + Sync {
    fn check(&self, uri: &Uri) -> Result<(), AppError>;
}

/// Accepts requests whose `key` query parameter is one of the allowed tokens.
/// An empty allow-list rejects everything.
pub struct AllowListGuard {
    tokens: Vec<String>,
}

impl AllowListGuard {
    pub fn new(tokens: Vec<String>) -> Self {
        Self {
            tokens: tokens.into_iter().filter(|t| !t.is_empty()).collect(),
        }
    }
}

impl AccessGuard for AllowListGuard {
    fn check(&self, uri: &Uri) -> Result<(), AppError> {
        if self.tokens.is_empty() {
            return Err(AppError::Unauthorized {
                message: "no access tokens are configured".to_string(),
            });
        }

        let presented = uri.query().and_then(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .find(|(name, _)| name == "key")
                .map(|(_, value)| value.into_owned())
        });

        match presented {
            Some(token) if self.tokens.iter().any(|allowed| secure_compare(&token, allowed)) => Ok(()),
            Some(_) => Err(AppError::Unauthorized {
                message: "invalid access token".to_string(),
            }),
            None => Err(AppError::Unauthorized {
                message: "missing `key` query parameter".to_string(),
            }),
        }
    }
}

/// Runs the configured [`AccessGuard`] before the request reaches the proxy.
pub async fn access_guard_middleware(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    if let Err(e) = state.access_guard.check(req.uri()) {
        warn!(path = %req.uri().path(), "Proxy request rejected by access guard");
        return Err(e);
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    #[test]
    fn test_allow_list() {
        let guard = AllowListGuard::new(vec!["secret-token".into(), "other".into()]);
        assert!(guard.check(&uri("/v1beta/models/m?key=secret-token")).is_ok());
        assert!(guard.check(&uri("/v1beta/models/m?alt=sse&key=other")).is_ok());
        assert!(guard.check(&uri("/v1beta/models/m?key=wrong")).is_err());
        assert!(guard.check(&uri("/v1beta/models/m")).is_err());
    }

    #[test]
    fn test_empty_allow_list_fails_closed() {
        let guard = AllowListGuard::new(vec![String::new()]);
        let err = guard.check(&uri("/v1beta/models/m?key=")).unwrap_err();
        assert_eq!(err.kind(), "unauthorized");
    }
}
