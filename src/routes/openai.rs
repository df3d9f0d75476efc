//! OpenAI routes
//!
//! Served under `/v1/*` with the caller's bearer token forwarded as-is.

use std::sync::Arc;

use axum::{
    extract::{Multipart, Query, State},
    http::HeaderMap,
    response::Response,
};
use bytes::Bytes;

use crate::{
    error::AppResult,
    proxy::{CallRole, Provider},
    routes::forward::{forward_json, forward_multipart},
    AppState,
};

/// `POST /v1/chat/completions`
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
    body: Bytes,
) -> AppResult<Response> {
    forward_json(
        Provider::OpenAi,
        &state.config,
        "/v1/chat/completions",
        "v1/chat/completions",
        &headers,
        query,
        body,
        CallRole::Generative,
    )
    .await
}

/// `POST /v1/embeddings`
pub async fn embeddings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
    body: Bytes,
) -> AppResult<Response> {
    forward_json(
        Provider::OpenAi,
        &state.config,
        "/v1/embeddings",
        "v1/embeddings",
        &headers,
        query,
        body,
        CallRole::Light,
    )
    .await
}

/// `POST /v1/images/generations`
pub async fn image_generations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
    body: Bytes,
) -> AppResult<Response> {
    forward_json(
        Provider::OpenAi,
        &state.config,
        "/v1/images/generations",
        "v1/images/generations",
        &headers,
        query,
        body,
        CallRole::Generative,
    )
    .await
}

/// `POST /v1/audio/transcriptions` (multipart)
pub async fn transcriptions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> AppResult<Response> {
    forward_multipart(
        Provider::OpenAi,
        &state.config,
        "/v1/audio/transcriptions",
        "v1/audio/transcriptions",
        &headers,
        multipart,
    )
    .await
}

/// `POST /v1/images/edits` (multipart)
pub async fn image_edits(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> AppResult<Response> {
    forward_multipart(
        Provider::OpenAi,
        &state.config,
        "/v1/images/edits",
        "v1/images/edits",
        &headers,
        multipart,
    )
    .await
}

/// `POST /v1/files` (multipart)
pub async fn files(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> AppResult<Response> {
    forward_multipart(
        Provider::OpenAi,
        &state.config,
        "/v1/files",
        "v1/files",
        &headers,
        multipart,
    )
    .await
}
