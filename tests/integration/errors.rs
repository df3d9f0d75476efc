//! Error normalization at the HTTP boundary

use axum::http::StatusCode;
use serde_json::{json, Value};
use wiremock::{matchers::method, Mock, ResponseTemplate};

use crate::common::{bearer, closed_upstream, google_key, test_server};
use crate::mocks::MockUpstream;

const RATE_LIMITED: &str =
    "{\"error\":{\"message\":\"Rate limit reached\",\"type\":\"requests\",\"code\":\"rate_limit_exceeded\"}}";

#[tokio::test]
async fn test_rejection_without_stream_keeps_status_headers_and_body() {
    let upstream = MockUpstream::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "20")
                .set_body_raw(RATE_LIMITED.as_bytes().to_vec(), "application/json"),
        )
        .mount(upstream.server())
        .await;

    let server = test_server(&upstream.uri());
    let response = bearer(server.post("/v1/chat/completions"))
        .json(&json!({"model": "gpt-4o", "messages": [], "stream": false}))
        .await;

    assert_eq!(response.status_code(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers().get("retry-after").unwrap(), "20");
    assert_eq!(response.text(), RATE_LIMITED);
}

#[tokio::test]
async fn test_rejection_with_stream_becomes_body() {
    let upstream = MockUpstream::start().await;
    upstream.mock_error("/v1/chat/completions", 429, RATE_LIMITED).await;

    let server = test_server(&upstream.uri());
    let response = bearer(server.post("/v1/chat/completions"))
        .json(&json!({"model": "gpt-4o", "messages": [], "stream": true}))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/json"
    );
    assert_eq!(response.text(), RATE_LIMITED);
}

#[tokio::test]
async fn test_anthropic_overloaded_relayed_as_is() {
    let upstream = MockUpstream::start().await;
    let overloaded = "{\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}";
    upstream.mock_error("/v1/messages", 529, overloaded).await;

    let server = test_server(&upstream.uri());
    let response = crate::common::anthropic_key(server.post("/anthropic/v1/messages"))
        .json(&json!({"model": "claude", "messages": []}))
        .await;

    assert_eq!(response.status_code().as_u16(), 529);
    assert_eq!(response.text(), overloaded);
}

#[tokio::test]
async fn test_unreachable_upstream_is_transport_failure() {
    let server = test_server(&closed_upstream());

    let response = bearer(server.post("/v1/embeddings"))
        .json(&json!({"input": "x"}))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_GATEWAY);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "TRANSPORT_FAILURE");
    assert_eq!(body["error"]["details"]["host"], "127.0.0.1");
    assert!(body["error"]["details"]["port"].is_u64());
}

#[tokio::test]
async fn test_unreachable_upstream_is_not_softened_by_stream_flag() {
    let server = test_server(&closed_upstream());

    let response = bearer(server.post("/v1/chat/completions"))
        .json(&json!({"model": "gpt-4o", "stream": true}))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_invalid_json_is_bad_request() {
    let upstream = MockUpstream::start().await;
    upstream.expect_no_calls().await;

    let server = test_server(&upstream.uri());
    let response = bearer(server.post("/v1/chat/completions"))
        .bytes("not valid json".as_bytes().to_vec().into())
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_unknown_gemini_method_is_not_found() {
    let upstream = MockUpstream::start().await;
    upstream.expect_no_calls().await;

    let server = test_server(&upstream.uri());
    let response = google_key(server.post("/google/v1beta/models/gemini-pro:predictLongRunning"))
        .json(&json!({}))
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}
