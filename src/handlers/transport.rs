// src/handlers/transport.rs

use crate::error::AppError;
use std::error::Error as StdError;
use tracing::warn;

/// Classifies an outbound call that produced no response at all.
pub fn classify_transport_error(err: &reqwest::Error) -> AppError {
    let chain = error_chain_text(err);

    let classified = if err.is_timeout() {
        AppError::UpstreamTimeout
    } else if is_dns_failure(&chain) {
        AppError::UpstreamUnreachable
    } else if is_protocol_mismatch(&chain) {
        AppError::UpstreamConfiguration
    } else if err.is_connect() && chain.contains("timed out") {
        AppError::UpstreamTimeout
    } else {
        AppError::internal(format!("Upstream request failed: {err}"))
    };

    warn!(
        error.kind = classified.kind(),
        is_connect = err.is_connect(),
        is_timeout = err.is_timeout(),
        cause = %chain,
        "Transport-level upstream failure"
    );
    classified
}

/// Lower-cased display text of the error and all of its sources.
fn error_chain_text(err: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(": ").to_lowercase()
}

fn is_dns_failure(chain: &str) -> bool {
    ["dns error", "failed to lookup address", "name or service not known", "no such host"]
        .iter()
        .any(|needle| chain.contains(needle))
}

fn is_protocol_mismatch(chain: &str) -> bool {
    [
        "wrong version number",
        "invalidcontenttype",
        "invalid content type",
        "corrupt message",
        "tls",
        "certificate",
        "invalid http version",
    ]
    .iter()
    .any(|needle| chain.contains(needle))
}
