//! Common test utilities and fixtures

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use gemini_keypool::{
    config::AppConfig,
    create_router,
    storage::{CallRecord, CallStore, InMemoryStore, KeyRecord, KeyStore, Store},
    AppState,
};
use serde_json::Value;
use std::sync::Arc;
use tower::util::ServiceExt;

pub const ADMIN_TOKEN: &str = "admin-secret-token";
pub const ACCESS_TOKEN: &str = "client-access-token";
pub const TEST_MODEL: &str = "gemini-test";

pub const KEY_A: &str = "AIzaTestKey-0001-aaaaaaaa";
pub const KEY_B: &str = "AIzaTestKey-0002-bbbbbbbb";
pub const KEY_C: &str = "AIzaTestKey-0003-cccccccc";

/// Test configuration builder
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut config = AppConfig::default();
        config.upstream.base_url = base_url.into();
        config.upstream.default_model = TEST_MODEL.to_string();
        config.server.admin_token = Some(ADMIN_TOKEN.to_string());
        config.access.allowed_tokens = vec![ACCESS_TOKEN.to_string()];
        config.pool.recovery_interval_secs = 0;
        Self { config }
    }

    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.config.pool.failure_threshold = threshold;
        self
    }

    pub fn with_request_timeout(mut self, secs: u64) -> Self {
        self.config.server.request_timeout_secs = secs;
        self
    }

    pub fn without_admin_token(mut self) -> Self {
        self.config.server.admin_token = None;
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

/// Router plus direct handles on the state and the backing store.
pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub store: Arc<InMemoryStore>,
}

impl TestApp {
    pub async fn new(config: AppConfig, keys: &[&str]) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let dyn_store: Arc<dyn Store> = store.clone();
        let state = Arc::new(AppState::with_store(config, dyn_store).unwrap());
        for key in keys {
            state.key_manager.add(key).await.unwrap();
        }
        let router = create_router(state.clone());
        Self { router, state, store }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()))
        };
        (status, json)
    }

    pub async fn proxy(&self, body: impl Into<Body>) -> (StatusCode, Value) {
        self.send(json_request("POST", "/api/proxy", body)).await
    }

    pub async fn key(&self, id: i64) -> KeyRecord {
        self.store.get_key(id).await.unwrap().unwrap()
    }

    pub async fn calls(&self, id: i64) -> Vec<CallRecord> {
        self.store.calls_for_key(id).await.unwrap()
    }
}

pub fn json_request(method: &str, uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(body.into())
        .unwrap()
}

pub fn admin_request(method: &str, uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .header("Authorization", format!("Bearer {ADMIN_TOKEN}"))
        .body(body.into())
        .unwrap()
}

/// Path the proxy calls for [`TEST_MODEL`].
pub fn upstream_path() -> String {
    format!("/models/{TEST_MODEL}:generateContent")
}

pub fn native_reply(text: &str) -> Value {
    serde_json::json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP"
        }],
        "usageMetadata": {
            "promptTokenCount": 4,
            "candidatesTokenCount": 3,
            "totalTokenCount": 7
        }
    })
}
