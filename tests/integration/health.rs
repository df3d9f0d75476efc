//! Health and metrics endpoint tests

use axum::http::StatusCode;
use serde_json::Value;

use crate::common::test_server;

#[tokio::test]
async fn test_health_reports_version_and_uptime() {
    let server = test_server("http://127.0.0.1:1");

    let response = server.get("/health").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["uptime_seconds"].is_u64());
    assert!(body["timestamp"].is_string());
    assert_eq!(body["socks_relay"], false);
}

#[tokio::test]
async fn test_liveness_check() {
    let server = test_server("http://127.0.0.1:1");

    let response = server.get("/health/live").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let server = test_server("http://127.0.0.1:1");

    let response = server.get("/v2/unknown").await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}
