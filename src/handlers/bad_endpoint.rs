// src/handlers/bad_endpoint.rs

use super::base::{Action, ResponseHandler, UpstreamReply};
use crate::error::AppError;
use axum::http::StatusCode;

/// A 404 from upstream means the base path or model is wrong, not the key.
pub struct BadEndpointHandler;

impl ResponseHandler for BadEndpointHandler {
    fn handle(&self, reply: &UpstreamReply<'_>) -> Option<Action> {
        (reply.status == StatusCode::NOT_FOUND).then(|| {
            Action::Failure(AppError::BadEndpoint {
                model: reply.model.to_string(),
            })
        })
    }
}
