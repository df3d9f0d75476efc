//! Anthropic routes

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::Response,
};
use bytes::Bytes;

use crate::{
    error::AppResult,
    proxy::{CallRole, Provider},
    routes::forward::forward_json,
    AppState,
};

/// `POST /anthropic/v1/messages`, buffered or streamed per the body's `stream` flag
pub async fn messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
    body: Bytes,
) -> AppResult<Response> {
    forward_json(
        Provider::Anthropic,
        &state.config,
        "/anthropic/v1/messages",
        "v1/messages",
        &headers,
        query,
        body,
        CallRole::Generative,
    )
    .await
}

/// `POST /anthropic/v1/messages/count_tokens`
pub async fn count_tokens(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
    body: Bytes,
) -> AppResult<Response> {
    forward_json(
        Provider::Anthropic,
        &state.config,
        "/anthropic/v1/messages/count_tokens",
        "v1/messages/count_tokens",
        &headers,
        query,
        body,
        CallRole::Light,
    )
    .await
}
