//! Framed event-stream routes
//!
//! `POST /{provider}/v1/chat/stream-completions` re-frames the provider's chat
//! stream into uniform `data:` events terminated by `data: [DONE]`.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::Response,
};
use bytes::Bytes;
use futures::stream;
use serde_json::Value;
use tracing::warn;

use crate::{
    config::Config,
    error::{AppError, AppResult},
    proxy::{
        client::StreamedResponse, CallRole, Provider, ProviderClient, RelayResponse,
        StreamingIntent,
    },
    routes::forward::{observe, parse_json},
    streaming::{
        event_stream_response, format_rejection_event, relay_frames, FrameDecoder, SseFrames,
    },
    AppState,
};

/// Native chat endpoint the framed relay reads from
fn chat_path(provider: Provider) -> &'static str {
    match provider {
        Provider::Anthropic => "v1/messages",
        Provider::OpenAi | Provider::Xai | Provider::Google => "v1/chat/completions",
    }
}

/// `POST /openai/v1/chat/stream-completions`
pub async fn openai_stream_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
    body: Bytes,
) -> AppResult<Response> {
    stream_completions(Provider::OpenAi, &state.config, &headers, query, body).await
}

/// `POST /anthropic/v1/chat/stream-completions`
pub async fn anthropic_stream_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
    body: Bytes,
) -> AppResult<Response> {
    stream_completions(Provider::Anthropic, &state.config, &headers, query, body).await
}

/// `POST /xai/v1/chat/stream-completions`
pub async fn xai_stream_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
    body: Bytes,
) -> AppResult<Response> {
    stream_completions(Provider::Xai, &state.config, &headers, query, body).await
}

async fn stream_completions(
    provider: Provider,
    config: &Config,
    headers: &HeaderMap,
    query: Vec<(String, String)>,
    body: Bytes,
) -> AppResult<Response> {
    let start = Instant::now();
    let route = format!("/{}/v1/chat/stream-completions", provider.name());

    let result = async {
        let mut value = parse_json(&body)?;
        let Some(object) = value.as_object_mut() else {
            return Err(AppError::BadRequest("Request body must be a JSON object".to_string()));
        };
        object.insert("stream".to_string(), Value::Bool(true));

        let client = ProviderClient::for_request(provider, config, headers, &query)?;
        let relayed = client
            .post_json(
                chat_path(provider),
                query,
                value,
                CallRole::Generative,
                StreamingIntent::Streaming,
            )
            .await
            .map(RelayResponse::into_stream);

        framed_response(provider.name(), relayed, SseFrames::new())
    }
    .await;

    observe(provider.name(), &route, start, &result);
    result
}

/// Serve a relayed call as a framed event stream.
///
/// A rejection before the first frame still answers 200 with a single error
/// event; other failures propagate as ordinary error responses.
pub fn framed_response<D: FrameDecoder>(
    provider: &str,
    relayed: AppResult<StreamedResponse>,
    decoder: D,
) -> AppResult<Response> {
    match relayed {
        Ok(streamed) => event_stream_response(relay_frames(streamed.stream, decoder)),
        Err(AppError::UpstreamRejected(rejection)) => {
            warn!(
                provider = %provider,
                status = %rejection.status,
                "Upstream rejected framed stream request"
            );
            let event = format_rejection_event(&rejection);
            event_stream_response(stream::iter(vec![Ok::<_, Infallible>(event)]))
        }
        Err(other) => Err(other),
    }
}
