// src/handlers/upstream_error.rs

use super::base::{Action, ResponseHandler, UpstreamReply};
use crate::error::AppError;
use tracing::warn;

/// Last in the chain: any non-success status without a dedicated handler.
pub struct UpstreamErrorHandler;

impl ResponseHandler for UpstreamErrorHandler {
    fn handle(&self, reply: &UpstreamReply<'_>) -> Option<Action> {
        if reply.status.is_success() {
            return None;
        }
        let body = reply.body_text();
        warn!(
            status = reply.status.as_u16(),
            response_body = %body,
            "Upstream returned an error status"
        );
        Some(Action::Failure(AppError::UpstreamError {
            status: reply.status.as_u16(),
            body,
        }))
    }
}
