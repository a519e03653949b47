// src/handlers/base.rs

use crate::error::AppError;
use axum::{body::Bytes, http::StatusCode};
use serde_json::Value;

/// Outcome of classifying one upstream response.
#[derive(Debug)]
pub enum Action {
    /// 2xx with a JSON body. The key is credited with a success.
    Success(Value),
    /// Anything else. The key is charged with a failure and the error goes to the caller.
    Failure(AppError),
}

/// The parts of an upstream reply the handlers look at.
#[derive(Debug, Clone, Copy)]
pub struct UpstreamReply<'a> {
    pub status: StatusCode,
    pub body: &'a Bytes,
    /// Model the call was made for, used in error details.
    pub model: &'a str,
}

impl UpstreamReply<'_> {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(self.body).into_owned()
    }
}

/// A trait for handling responses from the upstream service.
/// Each implementation is responsible for a specific case (e.g., success, rate limit).
pub trait ResponseHandler: Send + Sync {
    /// Returns `Some(Action)` if this handler claims the response, `None` to
    /// let the next handler in the chain try.
    fn handle(&self, reply: &UpstreamReply<'_>) -> Option<Action>;
}
