// src/handlers/invalid_api_key.rs

use super::base::{Action, ResponseHandler, UpstreamReply};
use crate::error::AppError;
use axum::http::StatusCode;

/// Upstream rejected the credential itself.
pub struct InvalidApiKeyHandler;

impl ResponseHandler for InvalidApiKeyHandler {
    fn handle(&self, reply: &UpstreamReply<'_>) -> Option<Action> {
        matches!(reply.status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
            .then_some(Action::Failure(AppError::InvalidCredential))
    }
}
