// src/proxy.rs

use crate::{
    config::UpstreamConfig,
    error::{AppError, Result},
    handlers::{
        base::{Action, UpstreamReply},
        processor::ResponseProcessor,
        transport::classify_transport_error,
    },
    key_manager::KeyManager,
    ledger::CallLedger,
    storage::KeyRecord,
    translation::PreparedRequest,
};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Where the upstream model identifier comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// `upstream.default_model` from configuration.
    Configured,
    /// Taken from the inbound request path.
    Path(String),
}

/// Strips an action qualifier (`gemini-pro:generateContent` -> `gemini-pro`).
///
/// The result becomes a single path segment of the upstream URL, so anything
/// that could leave `{base}/models/` or alter the query is rejected.
pub fn normalize_model(raw: &str) -> Result<String> {
    let model = raw.split(':').next().unwrap_or_default().trim();
    if model.is_empty() {
        return Err(AppError::malformed("Model identifier is empty"));
    }
    let unsafe_char = model
        .chars()
        .any(|c| matches!(c, '/' | '\\' | '?' | '#' | '%') || c.is_whitespace() || c.is_control());
    if unsafe_char || model == "." || model == ".." {
        return Err(AppError::malformed(format!("Invalid model identifier: {model:?}")));
    }
    Ok(model.to_string())
}

/// Runs one inbound request against the pool: select, translate, forward,
/// classify, record. Terminal on the first response.
pub struct ProxyHandler {
    client: Client,
    base_url: String,
    default_model: String,
    key_manager: Arc<KeyManager>,
    ledger: Arc<CallLedger>,
    processor: ResponseProcessor,
}

impl ProxyHandler {
    pub fn new(
        upstream: &UpstreamConfig,
        client: Client,
        key_manager: Arc<KeyManager>,
        ledger: Arc<CallLedger>,
    ) -> Self {
        Self {
            client,
            base_url: upstream.normalized_base_url().to_string(),
            default_model: upstream.default_model.clone(),
            key_manager,
            ledger,
            processor: ResponseProcessor::default(),
        }
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn resolve_model(&self, source: &ModelSource) -> Result<String> {
        match source {
            ModelSource::Configured => normalize_model(&self.default_model),
            ModelSource::Path(raw) => normalize_model(raw),
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }

    /// Proxies `body` to `model` using the next key from the pool.
    #[instrument(level = "info", skip_all, fields(model = %model))]
    pub async fn handle(&self, model: &str, body: &[u8]) -> Result<Value> {
        let key = self
            .key_manager
            .select_key()
            .await?
            .ok_or(AppError::CapacityExhausted)?;

        // The selection stamp stays even when the body turns out to be malformed.
        let prepared = PreparedRequest::from_body(body)?;

        let endpoint = self.endpoint(model);
        info!(
            key.id = key.id,
            key.preview = %key.preview(),
            upstream.url = %endpoint,
            format = ?prepared.format,
            "Forwarding request upstream"
        );

        let response = match self
            .client
            .post(&endpoint)
            .query(&[("key", key.secret.expose_secret())])
            .json(&prepared.payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Err(self.transport_failure(&key, &e).await),
        };

        let status = response.status();
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return Err(self.transport_failure(&key, &e).await),
        };
        debug!(status = status.as_u16(), body.len = bytes.len(), "Upstream responded");

        let reply = UpstreamReply {
            status,
            body: &bytes,
            model,
        };
        match self.processor.process(&reply) {
            Action::Success(upstream_body) => {
                self.key_manager.record_success(key.id).await.log("record_success");
                self.ledger
                    .append(key.id, true, Some(status.as_u16()))
                    .await
                    .log("ledger_append");
                prepared.translate_response(upstream_body, model)
            }
            Action::Failure(err) => {
                warn!(
                    key.id = key.id,
                    status = status.as_u16(),
                    error.kind = err.kind(),
                    "Upstream call failed"
                );
                self.key_manager.record_failure(key.id).await.log("record_failure");
                self.ledger
                    .append(key.id, false, Some(status.as_u16()))
                    .await
                    .log("ledger_append");
                Err(err)
            }
        }
    }

    async fn transport_failure(&self, key: &KeyRecord, err: &reqwest::Error) -> AppError {
        let classified = classify_transport_error(err);
        self.key_manager.record_failure(key.id).await.log("record_failure");
        self.ledger.append(key.id, false, None).await.log("ledger_append");
        classified
    }
}
