//! Upstream failure normalization
//!
//! Classification order:
//! 1. the provider answered with a status outside the accepted set
//!    (built by the upstream client as [`AppError::UpstreamRejected`]);
//! 2. the request went out but no response came back → transport failure;
//! 3. anything else → internal failure.
//!
//! Callers that asked for a stream get a provider rejection back as ordinary
//! body data, so their stream parsers keep working.

use std::error::Error as StdError;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::Response,
};
use serde_json::Value;
use tracing::warn;

use crate::error::{AppError, AppResult, TransportFailure, UpstreamRejection};

/// Whether the caller asked for an incremental response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamingIntent {
    Streaming,
    Buffered,
}

impl StreamingIntent {
    /// Read the `stream` flag of a JSON request body
    pub fn from_body(body: &Value) -> Self {
        match body.get("stream").and_then(Value::as_bool) {
            Some(true) => StreamingIntent::Streaming,
            _ => StreamingIntent::Buffered,
        }
    }

    pub fn is_streaming(self) -> bool {
        self == StreamingIntent::Streaming
    }
}

/// Classify a reqwest failure
pub fn classify(err: reqwest::Error) -> AppError {
    if err.is_builder() {
        return AppError::InternalFailure(format!("Failed to build upstream request: {}", err));
    }

    let category = if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connect"
    } else if err.is_body() || err.is_decode() {
        "body"
    } else if err.is_request() {
        "request"
    } else {
        return AppError::InternalFailure(format!("Upstream call failed: {}", err));
    };

    let code = if category == "timeout" {
        category.to_string()
    } else {
        io_error_kind(&err).unwrap_or_else(|| category.to_string())
    };

    let (host, port) = match err.url() {
        Some(url) => (
            url.host_str().map(str::to_string),
            url.port_or_known_default(),
        ),
        None => (None, None),
    };

    AppError::TransportFailure(TransportFailure {
        message: err.to_string(),
        code: Some(code),
        host,
        port,
    })
}

/// Transport failure for a call whose response head missed its deadline
pub fn timeout_failure(url: &str, timeout: Duration) -> AppError {
    let parsed = reqwest::Url::parse(url).ok();
    AppError::TransportFailure(TransportFailure {
        message: format!("Upstream did not respond within {:?}", timeout),
        code: Some("timeout".to_string()),
        host: parsed
            .as_ref()
            .and_then(|u| u.host_str().map(str::to_string)),
        port: parsed.as_ref().and_then(|u| u.port_or_known_default()),
    })
}

/// Find the underlying I/O error kind, if the failure came from a socket
fn io_error_kind(err: &(dyn StdError + 'static)) -> Option<String> {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            return Some(format!("{:?}", io.kind()));
        }
        source = cause.source();
    }
    None
}

/// Apply the streaming-intent rule to a handler result.
///
/// With streaming intent, a provider rejection is delivered as a normal `200`
/// response whose body is the provider's error payload, byte for byte.
/// Every other outcome passes through unchanged.
pub fn settle(result: AppResult<Response>, intent: StreamingIntent) -> AppResult<Response> {
    match result {
        Err(AppError::UpstreamRejected(rejection)) if intent.is_streaming() => {
            warn!(
                status = %rejection.status,
                "Upstream rejected a streaming request, relaying error body as stream data"
            );
            Ok(rejection_as_data(rejection))
        }
        other => other,
    }
}

/// Render a rejection as stream data
fn rejection_as_data(rejection: UpstreamRejection) -> Response {
    let mut response = Response::new(Body::from(rejection.body));
    *response.status_mut() = StatusCode::OK;
    if let Some(content_type) = rejection.headers.get(header::CONTENT_TYPE) {
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type.clone());
    }
    response
}
