// src/handlers/processor.rs

use crate::handlers::{
    bad_endpoint::BadEndpointHandler,
    base::{Action, ResponseHandler, UpstreamReply},
    invalid_api_key::InvalidApiKeyHandler,
    rate_limit::RateLimitHandler,
    success::SuccessHandler,
    upstream_error::UpstreamErrorHandler,
};
use crate::error::AppError;
use std::sync::Arc;

/// Processes a response through a chain of handlers.
#[derive(Clone)]
pub struct ResponseProcessor {
    handlers: Arc<Vec<Box<dyn ResponseHandler>>>,
}

impl ResponseProcessor {
    /// Creates a new `ResponseProcessor` with a given chain of handlers.
    pub fn new(handlers: Vec<Box<dyn ResponseHandler>>) -> Self {
        Self {
            handlers: Arc::new(handlers),
        }
    }

    /// The first handler that claims the reply decides the action.
    pub fn process(&self, reply: &UpstreamReply<'_>) -> Action {
        self.handlers
            .iter()
            .find_map(|handler| handler.handle(reply))
            .unwrap_or_else(|| {
                Action::Failure(AppError::UpstreamError {
                    status: reply.status.as_u16(),
                    body: reply.body_text(),
                })
            })
    }
}

impl Default for ResponseProcessor {
    fn default() -> Self {
        Self::new(vec![
            Box::new(SuccessHandler),
            Box::new(RateLimitHandler),
            Box::new(InvalidApiKeyHandler),
            Box::new(BadEndpointHandler),
            Box::new(UpstreamErrorHandler),
        ])
    }
}
