//! Error handling module
//!
//! This module provides:
//! - the proxy error taxonomy, each variant carrying a stable `kind`
//! - infrastructure errors (configuration, storage, IO) for everything else
//! - RFC 7807 style Problem Details responses with correlation IDs

pub mod non_fatal;
pub mod types;

pub use non_fatal::NonFatal;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

/// Standard error response format following RFC 7807 Problem Details
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// A URI reference that identifies the problem type
    #[serde(rename = "type")]
    pub error_type: String,

    /// A short, human-readable summary of the problem type
    pub title: String,

    /// The HTTP status code
    pub status: u16,

    /// A human-readable explanation specific to this occurrence
    pub detail: String,

    /// A URI reference that identifies the specific occurrence
    pub instance: String,

    /// Request ID for tracing
    pub request_id: Option<String>,

    /// Stable machine-readable error kind
    pub kind: String,

    /// Additional error-specific properties
    #[serde(flatten)]
    pub extensions: serde_json::Map<String, serde_json::Value>,
}

/// Main application error type.
///
/// The first block of variants is what a proxy caller can observe; every one
/// of them maps to a stable [`AppError::kind`].
#[derive(Error, Debug)]
pub enum AppError {
    // Proxy taxonomy
    #[error("No available API keys. Please add and configure API keys.")]
    CapacityExhausted,

    #[error("Malformed request: {message}")]
    MalformedRequest { message: String },

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Invalid API key")]
    InvalidCredential,

    #[error("Upstream path not found: check the upstream base URL and model ('{model}')")]
    BadEndpoint { model: String },

    #[error("Upstream API error (status {status})")]
    UpstreamError { status: u16, body: String },

    #[error("Invalid JSON from upstream")]
    BadGateway { body: String },

    #[error("Upstream timeout: cannot reach the upstream API")]
    UpstreamTimeout,

    #[error("Upstream host not found: check the upstream base URL host")]
    UpstreamUnreachable,

    #[error("TLS handshake failed: check http/https scheme and port")]
    UpstreamConfiguration,

    #[error("Internal server error: {message}")]
    Internal { message: String },

    // Access control
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    // Configuration errors
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String, line: Option<usize> },

    #[error("Invalid proxy configuration for '{url}': {message}")]
    ProxyConfig { url: String, message: String },

    // Storage errors
    #[error("Storage connection failed: {message}")]
    StorageConnection { message: String },

    #[error("Storage operation failed: {operation} - {message}")]
    StorageOperation { operation: String, message: String },

    // Request validation and lookup
    #[error("Validation failed: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("IO operation failed: {operation} - {message}")]
    Io { operation: String, message: String },
}

impl AppError {
    /// Create a new configuration validation error
    pub fn config_validation(message: impl Into<String>, field: Option<impl Into<String>>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
            field: field.map(Into::into),
        }
    }

    /// Create a new internal error with context
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRequest {
            message: message.into(),
        }
    }

    /// Stable snake_case name of the error kind, safe for clients to match on.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CapacityExhausted => "capacity_exhausted",
            Self::MalformedRequest { .. } => "malformed_request",
            Self::RateLimited => "rate_limited",
            Self::InvalidCredential => "invalid_credential",
            Self::BadEndpoint { .. } => "bad_endpoint",
            Self::UpstreamError { .. } => "upstream_error",
            Self::BadGateway { .. } => "bad_gateway",
            Self::UpstreamTimeout => "upstream_timeout",
            Self::UpstreamUnreachable => "upstream_unreachable",
            Self::UpstreamConfiguration => "configuration_error",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Validation { .. } => "validation",
            Self::NotFound { .. } => "not_found",
            Self::ConfigValidation { .. }
            | Self::ConfigNotFound { .. }
            | Self::ConfigParse { .. }
            | Self::ProxyConfig { .. } => "configuration",
            Self::StorageConnection { .. } | Self::StorageOperation { .. } => "storage",
            Self::Internal { .. } | Self::Serialization { .. } | Self::Io { .. } => {
                "internal_error"
            }
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedRequest { .. } | Self::Validation { .. } | Self::ConfigParse { .. } => {
                StatusCode::BAD_REQUEST
            }

            Self::InvalidCredential | Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,

            Self::NotFound { .. } | Self::ConfigNotFound { .. } => StatusCode::NOT_FOUND,

            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,

            Self::UpstreamError { status, .. } => StatusCode::from_u16(*status)
                .ok()
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::BAD_GATEWAY),

            Self::BadEndpoint { .. }
            | Self::BadGateway { .. }
            | Self::UpstreamUnreachable
            | Self::UpstreamConfiguration => StatusCode::BAD_GATEWAY,

            Self::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,

            Self::CapacityExhausted | Self::StorageConnection { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            Self::Internal { .. }
            | Self::ConfigValidation { .. }
            | Self::ProxyConfig { .. }
            | Self::StorageOperation { .. }
            | Self::Serialization { .. }
            | Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error type URI for RFC 7807 compliance
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::CapacityExhausted => "https://gemini-keypool.dev/errors/capacity",
            Self::MalformedRequest { .. } | Self::Validation { .. } => {
                "https://gemini-keypool.dev/errors/validation"
            }
            Self::RateLimited => "https://gemini-keypool.dev/errors/rate-limit",
            Self::InvalidCredential | Self::Unauthorized { .. } => {
                "https://gemini-keypool.dev/errors/authentication"
            }
            Self::BadEndpoint { .. }
            | Self::UpstreamError { .. }
            | Self::BadGateway { .. }
            | Self::UpstreamTimeout
            | Self::UpstreamUnreachable
            | Self::UpstreamConfiguration => "https://gemini-keypool.dev/errors/upstream",
            Self::ConfigValidation { .. }
            | Self::ConfigNotFound { .. }
            | Self::ConfigParse { .. }
            | Self::ProxyConfig { .. } => "https://gemini-keypool.dev/errors/configuration",
            Self::StorageConnection { .. } | Self::StorageOperation { .. } => {
                "https://gemini-keypool.dev/errors/storage"
            }
            Self::NotFound { .. } => "https://gemini-keypool.dev/errors/not-found",
            _ => "https://gemini-keypool.dev/errors/internal",
        }
    }

    /// Get a human-readable title for the error
    pub fn title(&self) -> &'static str {
        match self {
            Self::CapacityExhausted => "Capacity Exhausted",
            Self::MalformedRequest { .. } | Self::Validation { .. } => "Validation Error",
            Self::RateLimited => "Rate Limit Exceeded",
            Self::InvalidCredential | Self::Unauthorized { .. } => "Authentication Error",
            Self::BadEndpoint { .. }
            | Self::UpstreamError { .. }
            | Self::BadGateway { .. }
            | Self::UpstreamTimeout
            | Self::UpstreamUnreachable
            | Self::UpstreamConfiguration => "Upstream Error",
            Self::ConfigValidation { .. }
            | Self::ConfigNotFound { .. }
            | Self::ConfigParse { .. }
            | Self::ProxyConfig { .. } => "Configuration Error",
            Self::StorageConnection { .. } | Self::StorageOperation { .. } => "Storage Error",
            Self::NotFound { .. } => "Not Found",
            _ => "Internal Server Error",
        }
    }

    fn extensions(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut extensions = serde_json::Map::new();
        match self {
            Self::UpstreamError { body, .. } | Self::BadGateway { body } => {
                extensions.insert("details".to_string(), serde_json::Value::String(body.clone()));
            }
            Self::Validation { field, .. } => {
                extensions.insert("field".to_string(), serde_json::Value::String(field.clone()));
            }
            _ => {}
        }
        extensions
    }

    /// Log the error with appropriate level
    pub fn log(&self, request_id: Option<&str>) {
        let request_id = request_id.unwrap_or("unknown");

        if self.status_code().is_server_error() {
            error!(
                error = %self,
                request_id = request_id,
                error.kind = self.kind(),
                "Application error occurred"
            );
        } else {
            warn!(
                error = %self,
                request_id = request_id,
                error.kind = self.kind(),
                "Client error occurred"
            );
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = Uuid::new_v4().to_string();

        self.log(Some(&request_id));

        let status = self.status_code();
        let error_response = ErrorResponse {
            error_type: self.error_type().to_string(),
            title: self.title().to_string(),
            status: status.as_u16(),
            detail: self.to_string(),
            instance: format!("/errors/{request_id}"),
            request_id: Some(request_id),
            kind: self.kind().to_string(),
            extensions: self.extensions(),
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for the application
pub type Result<T, E = AppError> = std::result::Result<T, E>;
