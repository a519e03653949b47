// tests/proxy_tests.rs

mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::json;
use wiremock::{
    matchers::{body_json, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

#[tokio::test]
async fn test_openai_request_is_translated_both_ways() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(upstream_path()))
        .and(query_param("key", KEY_A))
        .and(body_json(json!({
            "contents": [{ "role": "user", "parts": [{ "text": "System: Be brief\nHello" }] }],
            "generationConfig": { "temperature": 0.5, "maxOutputTokens": 64 }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(native_reply("Hi there")))
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::new(TestConfigBuilder::new(server.uri()).build(), &[KEY_A]).await;
    let (status, body) = app
        .proxy(
            json!({
                "model": "ignored-by-proxy",
                "temperature": 0.5,
                "max_tokens": 64,
                "messages": [
                    { "role": "system", "content": "Be brief" },
                    { "role": "user", "content": "Hello" }
                ]
            })
            .to_string(),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["model"], TEST_MODEL);
    assert_eq!(body["choices"][0]["message"]["role"], "assistant");
    assert_eq!(body["choices"][0]["message"]["content"], "Hi there");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    assert_eq!(body["usage"]["total_tokens"], 7);
    assert!(body["id"].as_str().unwrap().starts_with("chatcmpl-"));

    let key = app.key(1).await;
    assert!(key.last_used_at.is_some());
    assert_eq!(key.failure_count, 0);

    let calls = app.calls(1).await;
    assert_eq!(calls.len(), 1);
    assert!(calls[0].success);
    assert_eq!(calls[0].status_code, Some(200));
}

#[tokio::test]
async fn test_native_body_passes_through_unchanged() {
    let server = MockServer::start().await;
    let native = json!({ "contents": [{ "role": "user", "parts": [{ "text": "ping" }] }] });
    let upstream = native_reply("pong");
    Mock::given(method("POST"))
        .and(path(upstream_path()))
        .and(body_json(native.clone()))
        .respond_with(ResponseTemplate::new(200).set_body_json(upstream.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::new(TestConfigBuilder::new(server.uri()).build(), &[KEY_A]).await;
    let (status, body) = app.proxy(native.to_string()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, upstream);
}

#[tokio::test]
async fn test_empty_pool_rejects_without_calling_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(native_reply("x")))
        .expect(0)
        .mount(&server)
        .await;

    let app = TestApp::new(TestConfigBuilder::new(server.uri()).build(), &[]).await;
    let (status, body) = app.proxy(json!({ "contents": [] }).to_string()).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["kind"], "capacity_exhausted");
    assert!(app.state.ledger.aggregate().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rate_limit_counts_against_key_and_is_logged() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(upstream_path()))
        .respond_with(ResponseTemplate::new(429).set_body_string("quota"))
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::new(TestConfigBuilder::new(server.uri()).build(), &[KEY_A]).await;
    let (status, body) = app.proxy(json!({ "contents": [] }).to_string()).await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["kind"], "rate_limited");

    let key = app.key(1).await;
    assert_eq!(key.failure_count, 1);
    assert!(key.healthy);
    assert!(key.last_failure_at.is_some());

    let calls = app.calls(1).await;
    assert_eq!(calls.len(), 1);
    assert!(!calls[0].success);
    assert_eq!(calls[0].status_code, Some(429));
}

#[tokio::test]
async fn test_upstream_statuses_map_to_error_kinds() {
    let cases = [
        (401, StatusCode::UNAUTHORIZED, "invalid_credential"),
        (403, StatusCode::UNAUTHORIZED, "invalid_credential"),
        (404, StatusCode::BAD_GATEWAY, "bad_endpoint"),
        (500, StatusCode::INTERNAL_SERVER_ERROR, "upstream_error"),
        (503, StatusCode::SERVICE_UNAVAILABLE, "upstream_error"),
        (400, StatusCode::BAD_REQUEST, "upstream_error"),
    ];

    for (upstream_status, expected_status, expected_kind) in cases {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(upstream_status).set_body_string("upstream says no"))
            .mount(&server)
            .await;

        let app = TestApp::new(TestConfigBuilder::new(server.uri()).build(), &[KEY_A]).await;
        let (status, body) = app.proxy(json!({ "contents": [] }).to_string()).await;

        assert_eq!(status, expected_status, "upstream status {upstream_status}");
        assert_eq!(body["kind"], expected_kind, "upstream status {upstream_status}");
        assert_eq!(app.key(1).await.failure_count, 1);
        assert_eq!(app.calls(1).await[0].status_code, Some(upstream_status));
    }
}

#[tokio::test]
async fn test_upstream_error_body_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("backend exploded"))
        .mount(&server)
        .await;

    let app = TestApp::new(TestConfigBuilder::new(server.uri()).build(), &[KEY_A]).await;
    let (_, body) = app.proxy(json!({ "contents": [] }).to_string()).await;

    assert_eq!(body["details"], "backend exploded");
}

#[tokio::test]
async fn test_unparsable_success_body_is_bad_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let app = TestApp::new(TestConfigBuilder::new(server.uri()).build(), &[KEY_A]).await;
    let (status, body) = app.proxy(json!({ "contents": [] }).to_string()).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["kind"], "bad_gateway");
    assert_eq!(app.key(1).await.failure_count, 1);
    assert!(!app.calls(1).await[0].success);
}

#[tokio::test]
async fn test_breaker_trips_and_pool_runs_dry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let app = TestApp::new(
        TestConfigBuilder::new(server.uri()).with_threshold(3).build(),
        &[KEY_A],
    )
    .await;

    for _ in 0..3 {
        let (status, _) = app.proxy(json!({ "contents": [] }).to_string()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
    let key = app.key(1).await;
    assert_eq!(key.failure_count, 3);
    assert!(!key.healthy);

    let (status, body) = app.proxy(json!({ "contents": [] }).to_string()).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["kind"], "capacity_exhausted");
    assert_eq!(app.calls(1).await.len(), 3);
}

#[tokio::test]
async fn test_success_resets_failure_count() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(native_reply("ok")))
        .mount(&server)
        .await;

    let app = TestApp::new(TestConfigBuilder::new(server.uri()).build(), &[KEY_A]).await;
    for _ in 0..2 {
        app.proxy(json!({ "contents": [] }).to_string()).await;
    }
    assert_eq!(app.key(1).await.failure_count, 2);

    let (status, _) = app.proxy(json!({ "contents": [] }).to_string()).await;
    assert_eq!(status, StatusCode::OK);
    let key = app.key(1).await;
    assert_eq!(key.failure_count, 0);
    assert!(key.last_failure_at.is_none());
}

#[tokio::test]
async fn test_requests_rotate_across_keys() {
    let server = MockServer::start().await;
    for key in [KEY_A, KEY_B, KEY_C] {
        Mock::given(method("POST"))
            .and(query_param("key", key))
            .respond_with(ResponseTemplate::new(200).set_body_json(native_reply(key)))
            .expect(1)
            .mount(&server)
            .await;
    }

    let app = TestApp::new(
        TestConfigBuilder::new(server.uri()).build(),
        &[KEY_A, KEY_B, KEY_C],
    )
    .await;

    for _ in 0..3 {
        let (status, _) = app.proxy(json!({ "contents": [] }).to_string()).await;
        assert_eq!(status, StatusCode::OK);
    }
    for id in 1..=3 {
        assert_eq!(app.calls(id).await.len(), 1);
    }
}

#[tokio::test]
async fn test_malformed_body_is_rejected_without_upstream_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let app = TestApp::new(TestConfigBuilder::new(server.uri()).build(), &[KEY_A]).await;
    let (status, body) = app.proxy("{not json").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "malformed_request");
    assert_eq!(app.key(1).await.failure_count, 0);
    assert!(app.calls(1).await.is_empty());
}

#[tokio::test]
async fn test_upstream_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(native_reply("late"))
                .set_delay(std::time::Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let app = TestApp::new(
        TestConfigBuilder::new(server.uri()).with_request_timeout(1).build(),
        &[KEY_A],
    )
    .await;
    let (status, body) = app.proxy(json!({ "contents": [] }).to_string()).await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["kind"], "upstream_timeout");
    assert_eq!(app.key(1).await.failure_count, 1);

    let calls = app.calls(1).await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].status_code, None);
}

#[tokio::test]
async fn test_model_route_requires_access_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(native_reply("x")))
        .expect(0)
        .mount(&server)
        .await;

    let app = TestApp::new(TestConfigBuilder::new(server.uri()).build(), &[KEY_A]).await;

    for uri in [
        format!("/v1beta/models/{TEST_MODEL}:generateContent"),
        format!("/v1beta/models/{TEST_MODEL}:generateContent?key=wrong-token"),
    ] {
        let (status, body) = app
            .send(json_request("POST", &uri, json!({ "contents": [] }).to_string()))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["kind"], "unauthorized");
    }

    assert!(app.key(1).await.last_used_at.is_none());
}

#[tokio::test]
async fn test_model_route_uses_path_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-other:generateContent"))
        .and(query_param("key", KEY_A))
        .respond_with(ResponseTemplate::new(200).set_body_json(native_reply("x")))
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::new(TestConfigBuilder::new(server.uri()).build(), &[KEY_A]).await;
    let uri = format!("/v1beta/models/gemini-other:generateContent?key={ACCESS_TOKEN}");
    let (status, _) = app
        .send(json_request("POST", &uri, json!({ "contents": [] }).to_string()))
        .await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_info_and_health_routes() {
    let app = TestApp::new(TestConfigBuilder::new("http://127.0.0.1:9").build(), &[]).await;

    let (status, body) = app.send(json_request("GET", "/health", "")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = app.send(json_request("GET", "/api/proxy", "")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model"], TEST_MODEL);
}

#[tokio::test]
async fn test_model_route_rejects_models_that_escape_the_models_path() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(native_reply("x")))
        .expect(0)
        .mount(&server)
        .await;

    let app = TestApp::new(
        TestConfigBuilder::new(format!("{}/v1beta", server.uri())).build(),
        &[KEY_A],
    )
    .await;

    for model in ["..%2F..%2Fsink", "gemini%3Falt%3Dsse", "gemini%23frag"] {
        let uri = format!("/v1beta/models/{model}?key={ACCESS_TOKEN}");
        let (status, body) = app
            .send(json_request("POST", &uri, json!({ "contents": [] }).to_string()))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "model {model}");
        assert_eq!(body["kind"], "malformed_request", "model {model}");
    }

    let key = app.key(1).await;
    assert!(key.last_used_at.is_none());
    assert!(app.calls(1).await.is_empty());
}

#[tokio::test]
async fn test_model_info_route_is_not_gated() {
    let app = TestApp::new(TestConfigBuilder::new("http://127.0.0.1:9").build(), &[]).await;

    let (status, body) = app
        .send(json_request("GET", &format!("/v1beta/models/{TEST_MODEL}:generateContent"), ""))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model"], TEST_MODEL);

    let (status, _) = app
        .send(json_request("POST", &format!("/v1beta/models/{TEST_MODEL}"), "{}"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
