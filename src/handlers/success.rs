// src/handlers/success.rs

use super::base::{Action, ResponseHandler, UpstreamReply};
use crate::error::AppError;
use tracing::error;

pub struct SuccessHandler;

impl ResponseHandler for SuccessHandler {
    fn handle(&self, reply: &UpstreamReply<'_>) -> Option<Action> {
        if !reply.status.is_success() {
            return None;
        }
        match serde_json::from_slice(reply.body) {
            Ok(value) => Some(Action::Success(value)),
            Err(e) => {
                error!(status = reply.status.as_u16(), error = %e, "Invalid JSON from upstream");
                Some(Action::Failure(AppError::BadGateway {
                    body: reply.body_text(),
                }))
            }
        }
    }
}
