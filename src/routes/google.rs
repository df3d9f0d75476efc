//! Google Gemini routes
//!
//! Generation calls are plain JSON relays. File uploads go through the
//! resumable upload coordinator: one init call opens a session, then data calls
//! (single-shot or chunked) are addressed by the session URL.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use tracing::debug;

use crate::{
    error::{AppError, AppResult},
    proxy::{CallRole, Provider, ProviderClient},
    routes::forward::{forward_json, forward_json_streaming, observe, parse_json},
    upload::{coordinator::ChunkQuery, UploadCoordinator},
    AppState,
};

/// Upstream path of the upload collection
const UPLOAD_FILES_PATH: &str = "upload/v1beta/files";

/// Query parameter carrying the session id on session-URL data calls
const UPLOAD_ID_PARAM: &str = "upload_id";

/// Split `models/{model}:{method}` into its parts
fn parse_model_action(path: &str) -> AppResult<(&str, &str)> {
    path.trim_start_matches('/')
        .strip_prefix("models/")
        .and_then(|rest| rest.rsplit_once(':'))
        .filter(|(model, method)| !model.is_empty() && !method.is_empty())
        .ok_or_else(|| AppError::NotFound(format!("Method not found: {}", path)))
}

/// `POST /google/v1beta/models/{model}:{generateContent|streamGenerateContent}`
pub async fn models_action(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
    body: Bytes,
) -> AppResult<Response> {
    let (model, method) = parse_model_action(&path)?;
    let upstream_path = format!("v1beta/models/{}:{}", model, method);
    debug!(model = %model, method = %method, "Routing Gemini model action");

    match method {
        "generateContent" => {
            forward_json(
                Provider::Google,
                &state.config,
                "/google/v1beta/models/{model}:generateContent",
                &upstream_path,
                &headers,
                query,
                body,
                CallRole::Generative,
            )
            .await
        }
        "streamGenerateContent" => {
            forward_json_streaming(
                Provider::Google,
                &state.config,
                "/google/v1beta/models/{model}:streamGenerateContent",
                &upstream_path,
                &headers,
                query,
                body,
                CallRole::Generative,
            )
            .await
        }
        other => Err(AppError::NotFound(format!("Method not found: {}", other))),
    }
}

/// `GET /google/v1beta/{path}` file and model metadata
pub async fn metadata(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
) -> AppResult<Response> {
    let start = Instant::now();

    let result = async {
        let client = ProviderClient::for_request(Provider::Google, &state.config, &headers, &query)?;
        let url = client.url(&format!("v1beta/{}", path.trim_start_matches('/')));
        let envelope = UploadCoordinator::new(&client).file_info(&url, query).await?;
        Ok(envelope.into_response())
    }
    .await;

    observe(Provider::Google.name(), "/google/v1beta/{path}", start, &result);
    result
}

/// `POST /google/upload/v1beta/files`
///
/// Opens an upload session, or relays data when the request is already
/// addressed to a session by `upload_id`.
pub async fn upload_init(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
    body: Bytes,
) -> AppResult<Response> {
    let start = Instant::now();
    let is_data_call = query.iter().any(|(k, _)| k == UPLOAD_ID_PARAM);

    let result = async {
        let chunk_query = ChunkQuery::parse(query)?;
        let client = ProviderClient::for_request(
            Provider::Google,
            &state.config,
            &headers,
            &chunk_query.forwarded,
        )?;
        let url = client.url(UPLOAD_FILES_PATH);

        if is_data_call {
            return relay_upload_data(&client, &url, &headers, chunk_query, body).await;
        }

        let metadata = if body.is_empty() {
            None
        } else {
            Some(parse_json(&body)?)
        };
        let envelope = UploadCoordinator::new(&client)
            .init(&url, &headers, chunk_query.forwarded, metadata)
            .await?;
        Ok(envelope.into_response())
    }
    .await;

    let route = if is_data_call {
        "/google/upload/v1beta/files?upload_id"
    } else {
        "/google/upload/v1beta/files"
    };
    observe(Provider::Google.name(), route, start, &result);
    result
}

/// `POST /google/upload/v1beta/files/{path}` and `.../files/chunk/{path}`
pub async fn upload_data(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
    body: Bytes,
) -> AppResult<Response> {
    let start = Instant::now();
    let path = path.trim_start_matches('/');
    let (route, session_path) = match path.strip_prefix("chunk/") {
        Some(rest) => ("/google/upload/v1beta/files/chunk/{path}", rest),
        None => ("/google/upload/v1beta/files/{path}", path),
    };

    let result = async {
        if session_path.is_empty() {
            return Err(AppError::NotFound("Upload session path is empty".to_string()));
        }
        let chunk_query = ChunkQuery::parse(query)?;
        let client = ProviderClient::for_request(
            Provider::Google,
            &state.config,
            &headers,
            &chunk_query.forwarded,
        )?;
        let url = client.url(&format!("{}/{}", UPLOAD_FILES_PATH, session_path));

        relay_upload_data(&client, &url, &headers, chunk_query, body).await
    }
    .await;

    observe(Provider::Google.name(), route, start, &result);
    result
}

/// Single-shot when the upload is one chunk, chunked otherwise
async fn relay_upload_data(
    client: &ProviderClient,
    url: &str,
    headers: &HeaderMap,
    chunk_query: ChunkQuery,
    body: Bytes,
) -> AppResult<Response> {
    let position = chunk_query.position()?;
    let coordinator = UploadCoordinator::new(client);

    let outcome = if chunk_query.is_chunked() {
        coordinator
            .upload_chunk(url, headers, chunk_query.forwarded, body, position)
            .await?
    } else {
        coordinator
            .upload_data(url, headers, chunk_query.forwarded, body)
            .await?
    };

    Ok(outcome.into_response())
}
