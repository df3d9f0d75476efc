//! Amazon Bedrock routes
//!
//! Credentials, region and model id travel in the request body; the model's
//! own payload sits under `requestBody`.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    response::{IntoResponse, Response},
};
use bytes::Bytes;

use crate::{
    error::{AppError, AppResult},
    proxy::bedrock::{BedrockClient, BedrockFrames, BedrockRequest},
    routes::{events::framed_response, forward::observe},
    AppState,
};

const PROVIDER: &str = "bedrock";

/// `POST /bedrock/v1/chat/completions`
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> AppResult<Response> {
    let start = Instant::now();

    let result = async {
        let request = BedrockRequest::parse(&body)?;
        let client = BedrockClient::for_request(&state.config, request);
        Ok::<_, AppError>(client.invoke().await?.into_response())
    }
    .await;

    observe(PROVIDER, "/bedrock/v1/chat/completions", start, &result);
    result
}

/// `POST /bedrock/v1/chat/stream-completions`
pub async fn stream_completions(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> AppResult<Response> {
    let start = Instant::now();

    let result = async {
        let request = BedrockRequest::parse(&body)?;
        let client = BedrockClient::for_request(&state.config, request);
        framed_response(PROVIDER, client.invoke_stream().await, BedrockFrames::new())
    }
    .await;

    observe(PROVIDER, "/bedrock/v1/chat/stream-completions", start, &result);
    result
}
