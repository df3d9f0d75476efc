//! Common test utilities for Relaygate
//!
//! Shared fixtures and helpers used across integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use axum_test::{TestRequest, TestServer};
use relaygate::{routes::create_router, AppState, Config};

/// Test configuration constants
pub mod constants {
    /// Bearer token sent to OpenAI and xAI routes
    pub const TEST_BEARER: &str = "Bearer sk-test-123";
    /// Anthropic API key
    pub const TEST_ANTHROPIC_KEY: &str = "sk-ant-test";
    /// Gemini API key
    pub const TEST_GOOGLE_KEY: &str = "AIza-test";
}

/// Gateway under test with every provider pointed at `upstream`
pub fn test_server(upstream: &str) -> TestServer {
    server_with_config(Config::with_upstream(upstream))
}

pub fn server_with_config(config: Config) -> TestServer {
    let app = create_router(Arc::new(AppState::new(config)));
    TestServer::new(app).expect("Failed to create test server")
}

/// Base URL on which nothing is listening
pub fn closed_upstream() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

fn with_header(request: TestRequest, name: &'static str, value: &str) -> TestRequest {
    request.add_header(
        HeaderName::from_static(name),
        HeaderValue::from_str(value).expect("valid header value"),
    )
}

pub fn bearer(request: TestRequest) -> TestRequest {
    with_header(request, "authorization", constants::TEST_BEARER)
}

pub fn anthropic_key(request: TestRequest) -> TestRequest {
    with_header(request, "x-api-key", constants::TEST_ANTHROPIC_KEY)
}

pub fn google_key(request: TestRequest) -> TestRequest {
    with_header(request, "x-goog-api-key", constants::TEST_GOOGLE_KEY)
}

pub fn header(request: TestRequest, name: &'static str, value: &str) -> TestRequest {
    with_header(request, name, value)
}

/// Hand-built multipart body with one text field and one file part
pub fn multipart_body(boundary: &str, field: (&str, &str), file: (&str, &str, &[u8])) -> Vec<u8> {
    let (field_name, field_value) = field;
    let (file_field, file_name, file_data) = file;

    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"{n}\"\r\n\r\n{v}\r\n",
            b = boundary,
            n = field_name,
            v = field_value
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"{n}\"; filename=\"{f}\"\r\nContent-Type: audio/mpeg\r\n\r\n",
            b = boundary,
            n = file_field,
            f = file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(file_data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}
