//! xAI routes
//!
//! xAI speaks the OpenAI wire format; only the base URL differs.

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

/// `POST /xai/v1/chat/completions`
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
    body: Bytes,
) -> AppResult<Response> {
    forward_json(
        Provider::Xai,
        &state.config,
        "/xai/v1/chat/completions",
        "v1/chat/completions",
        &headers,
        query,
        body,
        CallRole::Generative,
    )
    .await
}

/// `POST /xai/v1/embeddings`
pub async fn embeddings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
    body: Bytes,
) -> AppResult<Response> {
    forward_json(
        Provider::Xai,
        &state.config,
        "/xai/v1/embeddings",
        "v1/embeddings",
        &headers,
        query,
        body,
        CallRole::Light,
    )
    .await
}

/// `POST /xai/v1/audio/transcriptions` (multipart)
pub async fn transcriptions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> AppResult<Response> {
    forward_multipart(
        Provider::Xai,
        &state.config,
        "/xai/v1/audio/transcriptions",
        "v1/audio/transcriptions",
        &headers,
        multipart,
    )
    .await
}
