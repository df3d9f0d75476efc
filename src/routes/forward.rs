//! Shared forwarding helpers for provider handlers

use std::time::Instant;

use axum::{
    extract::Multipart,
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    config::Config,
    error::{AppError, AppResult},
    proxy::{
        client::{FilePart, MultipartForm, RelayResponse},
        normalize::{settle, StreamingIntent},
        CallRole, Provider, ProviderClient,
    },
    routes::metrics::record_request,
    streaming::passthrough_response,
};

/// Parse a JSON request body
pub fn parse_json(body: &Bytes) -> AppResult<Value> {
    serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {}", e)))
}

/// Turn an upstream response into the caller's response, byte for byte
pub fn respond(response: RelayResponse) -> Response {
    match response {
        RelayResponse::Buffered(envelope) => envelope.into_response(),
        RelayResponse::Streamed(streamed) => passthrough_response(streamed),
    }
}

/// Record metrics and log the outcome of one relayed request
pub fn observe(provider: &str, route: &str, start: Instant, result: &AppResult<Response>) {
    let duration = start.elapsed().as_secs_f64();
    let status = match result {
        Ok(response) => response.status(),
        Err(err) => err.status_code(),
    };
    record_request(provider, route, status, duration);

    match result {
        Ok(_) => info!(
            provider = %provider,
            route = %route,
            status = %status,
            duration_ms = %format!("{:.2}", duration * 1000.0),
            "Request relayed"
        ),
        Err(err) => warn!(
            provider = %provider,
            route = %route,
            status = %status,
            error = %err,
            "Request failed"
        ),
    }
}

/// Relay a JSON request, streaming when the body asks for it.
///
/// With `"stream": true` the upstream body is passed through untouched and a
/// provider rejection comes back as a `200` carrying the provider's error body.
#[allow(clippy::too_many_arguments)]
pub async fn forward_json(
    provider: Provider,
    config: &Config,
    route: &str,
    upstream_path: &str,
    headers: &HeaderMap,
    query: Vec<(String, String)>,
    body: Bytes,
    role: CallRole,
) -> AppResult<Response> {
    relay_json(provider, config, route, upstream_path, headers, query, body, role, None).await
}

/// Relay a JSON request to an endpoint that always streams
#[allow(clippy::too_many_arguments)]
pub async fn forward_json_streaming(
    provider: Provider,
    config: &Config,
    route: &str,
    upstream_path: &str,
    headers: &HeaderMap,
    query: Vec<(String, String)>,
    body: Bytes,
    role: CallRole,
) -> AppResult<Response> {
    relay_json(
        provider,
        config,
        route,
        upstream_path,
        headers,
        query,
        body,
        role,
        Some(StreamingIntent::Streaming),
    )
    .await
}

#[allow(clippy::too_many_arguments)]
async fn relay_json(
    provider: Provider,
    config: &Config,
    route: &str,
    upstream_path: &str,
    headers: &HeaderMap,
    query: Vec<(String, String)>,
    body: Bytes,
    role: CallRole,
    forced_intent: Option<StreamingIntent>,
) -> AppResult<Response> {
    let start = Instant::now();

    let result = async {
        let value = parse_json(&body)?;
        let intent = forced_intent.unwrap_or_else(|| StreamingIntent::from_body(&value));
        let client = ProviderClient::for_request(provider, config, headers, &query)?;

        let relayed = client
            .post_json(upstream_path, query, value, role, intent)
            .await
            .map(respond);
        settle(relayed, intent)
    }
    .await;

    observe(provider.name(), route, start, &result);
    result
}

/// Relay a multipart request
pub async fn forward_multipart(
    provider: Provider,
    config: &Config,
    route: &str,
    upstream_path: &str,
    headers: &HeaderMap,
    multipart: Multipart,
) -> AppResult<Response> {
    let start = Instant::now();

    let result = async {
        let client = ProviderClient::for_request(provider, config, headers, &[])?;
        let form = read_multipart(multipart).await?;
        client
            .post_multipart(upstream_path, form, CallRole::Generative)
            .await
            .map(respond)
    }
    .await;

    observe(provider.name(), route, start, &result);
    result
}

/// Collect an inbound multipart body; parts with a file name are files
pub async fn read_multipart(mut multipart: Multipart) -> AppResult<MultipartForm> {
    let mut form = MultipartForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);

        if file_name.is_some() {
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("Failed to read file part: {}", e)))?;
            form.files.push(FilePart {
                field: name,
                file_name,
                content_type,
                data,
            });
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| AppError::BadRequest(format!("Failed to read form field: {}", e)))?;
            form.fields.push((name, value));
        }
    }

    Ok(form)
}
