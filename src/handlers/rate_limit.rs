// src/handlers/rate_limit.rs

use super::base::{Action, ResponseHandler, UpstreamReply};
use crate::error::AppError;
use axum::http::StatusCode;

pub struct RateLimitHandler;

impl ResponseHandler for RateLimitHandler {
    fn handle(&self, reply: &UpstreamReply<'_>) -> Option<Action> {
        (reply.status == StatusCode::TOO_MANY_REQUESTS).then_some(Action::Failure(AppError::RateLimited))
    }
}
