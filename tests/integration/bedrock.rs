//! Bedrock relay tests
//!
//! Credentials come from the request body; the mock upstream stands in for
//! the regional runtime endpoint.

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use crate::common::test_server;
use crate::mocks::{bedrock_chunk, bedrock_exception, header_of, MockUpstream};

const MODEL: &str = "anthropic.claude-3-haiku";

fn bedrock_body() -> Value {
    json!({
        "modelId": MODEL,
        "accessKeyId": "AKIDEXAMPLE",
        "accessKeySecret": "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
        "region": "us-west-2",
        "requestBody": {
            "anthropic_version": "bedrock-2023-05-31",
            "max_tokens": 64,
            "messages": [{"role": "user", "content": "Hi"}]
        }
    })
}

#[tokio::test]
async fn test_invoke_signs_and_returns_model_response() {
    let upstream = MockUpstream::start().await;
    upstream
        .mock_json(
            "POST",
            &format!("/model/{}/invoke", MODEL),
            200,
            json!({"content": [{"type": "text", "text": "Hello"}]}),
        )
        .await;

    let server = test_server(&upstream.uri());
    let response = server
        .post("/bedrock/v1/chat/completions")
        .json(&bedrock_body())
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["content"][0]["text"], "Hello");

    let request = upstream.only_request().await;
    let authorization = header_of(&request, "authorization").unwrap();
    assert!(authorization.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
    assert!(authorization.contains("/us-west-2/bedrock/aws4_request"));
    assert!(header_of(&request, "x-amz-date").is_some());

    // Only the model payload goes upstream
    let sent: Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(sent["max_tokens"], 64);
    assert!(sent.get("accessKeySecret").is_none());
}

#[tokio::test]
async fn test_invoke_rejection_relayed_as_is() {
    let upstream = MockUpstream::start().await;
    let denied = "{\"message\":\"The security token included in the request is invalid.\"}";
    upstream
        .mock_error(&format!("/model/{}/invoke", MODEL), 403, denied)
        .await;

    let server = test_server(&upstream.uri());
    let response = server
        .post("/bedrock/v1/chat/completions")
        .json(&bedrock_body())
        .await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(response.text(), denied);
}

#[tokio::test]
async fn test_stream_reframes_chunks_as_data_events() {
    let upstream = MockUpstream::start().await;
    let mut body = bedrock_chunk("{\"type\":\"message_start\"}");
    body.extend(bedrock_chunk(
        "{\"type\":\"content_block_delta\",\"delta\":{\"text\":\"Hi\"}}",
    ));
    upstream
        .mock_event_stream(&format!("/model/{}/invoke-with-response-stream", MODEL), body)
        .await;

    let server = test_server(&upstream.uri());
    let response = server
        .post("/bedrock/v1/chat/stream-completions")
        .json(&bedrock_body())
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );
    assert_eq!(
        response.text(),
        "data: {\"type\":\"message_start\"}\n\n\
         data: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\"Hi\"}}\n\n\
         data: [DONE]\n\n"
    );

    let request = upstream.only_request().await;
    assert_eq!(
        header_of(&request, "accept"),
        Some("application/vnd.amazon.eventstream")
    );
}

#[tokio::test]
async fn test_stream_exception_ends_with_error_event() {
    let upstream = MockUpstream::start().await;
    let mut body = bedrock_chunk("{\"type\":\"message_start\"}");
    body.extend(bedrock_exception("throttlingException", "Too many requests"));
    upstream
        .mock_event_stream(&format!("/model/{}/invoke-with-response-stream", MODEL), body)
        .await;

    let server = test_server(&upstream.uri());
    let response = server
        .post("/bedrock/v1/chat/stream-completions")
        .json(&bedrock_body())
        .await;

    let text = response.text();
    let events: Vec<&str> = text.split("\n\n").filter(|e| !e.is_empty()).collect();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0], "data: {\"type\":\"message_start\"}");

    let error: Value = serde_json::from_str(events[1].trim_start_matches("data: ")).unwrap();
    assert_eq!(error["error"]["code"], "throttlingException");
    assert_eq!(error["error"]["message"], "Too many requests");
    assert!(!text.contains("[DONE]"));
}

#[tokio::test]
async fn test_stream_rejection_is_single_error_event() {
    let upstream = MockUpstream::start().await;
    upstream
        .mock_error(
            &format!("/model/{}/invoke-with-response-stream", MODEL),
            400,
            "{\"message\":\"Malformed input request\"}",
        )
        .await;

    let server = test_server(&upstream.uri());
    let response = server
        .post("/bedrock/v1/chat/stream-completions")
        .json(&bedrock_body())
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let text = response.text();
    let events: Vec<&str> = text.split("\n\n").filter(|e| !e.is_empty()).collect();
    assert_eq!(events.len(), 1);

    let event: Value = serde_json::from_str(events[0].trim_start_matches("data: ")).unwrap();
    assert_eq!(event["error"]["status"], 400);
    assert_eq!(event["error"]["body"], "{\"message\":\"Malformed input request\"}");
}

#[tokio::test]
async fn test_missing_keys_rejected_before_upstream() {
    let upstream = MockUpstream::start().await;
    upstream.expect_no_calls().await;

    let mut body = bedrock_body();
    body["accessKeySecret"] = json!("");

    let server = test_server(&upstream.uri());
    for route in ["/bedrock/v1/chat/completions", "/bedrock/v1/chat/stream-completions"] {
        let response = server.post(route).json(&body).await;
        assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
        let error: Value = response.json();
        assert_eq!(error["error"]["code"], "MISSING_CREDENTIAL");
    }
}

#[tokio::test]
async fn test_missing_model_is_bad_request() {
    let upstream = MockUpstream::start().await;
    upstream.expect_no_calls().await;

    let mut body = bedrock_body();
    body.as_object_mut().unwrap().remove("modelId");

    let server = test_server(&upstream.uri());
    let response = server.post("/bedrock/v1/chat/completions").json(&body).await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}
