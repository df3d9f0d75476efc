//! Upload coordinator
//!
//! Init results are returned whole because the caller needs the session URL
//! from the response headers. Data calls return the full envelope only when
//! the provider answers `201 Created`; `200`/`308` answers yield the decoded
//! body alone.

use axum::{
    http::{header::CONTENT_LENGTH, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use reqwest::header::HeaderValue;
use serde_json::Value;
use tracing::{info, instrument};

use super::{
    session::{ChunkPosition, UploadCommand, UploadSession},
    CHUNK_INDEX_PARAM, TOTAL_CHUNKS_PARAM, UPLOAD_COMMAND, UPLOAD_HEADER_CONTENT_LENGTH,
    UPLOAD_HEADER_CONTENT_TYPE, UPLOAD_OFFSET, UPLOAD_PROTOCOL, UPLOAD_URL,
};
use crate::{
    error::{AppError, AppResult},
    proxy::{
        client::{AcceptedStatuses, CallRole, Envelope, Relay, RelayRequest, RequestBody},
        headers::{copy_headers, header_str, header_value},
        provider::ProviderClient,
    },
    routes::metrics::record_upload_call,
};

/// Headers forwarded verbatim on the init call
const INIT_HEADERS: &[&str] = &[
    UPLOAD_PROTOCOL,
    UPLOAD_COMMAND,
    UPLOAD_HEADER_CONTENT_LENGTH,
    UPLOAD_HEADER_CONTENT_TYPE,
];

/// Result of a data call
#[derive(Debug, Clone)]
pub enum UploadOutcome {
    /// The provider created the file; status, headers and body all matter
    Envelope(Envelope),
    /// Intermediate or plain answer; only the decoded body
    Body(Value),
}

impl UploadOutcome {
    pub fn from_envelope(envelope: Envelope) -> Self {
        if envelope.status == StatusCode::CREATED {
            UploadOutcome::Envelope(envelope)
        } else {
            UploadOutcome::Body(envelope.decoded_body())
        }
    }
}

impl IntoResponse for UploadOutcome {
    fn into_response(self) -> Response {
        match self {
            UploadOutcome::Envelope(envelope) => {
                (StatusCode::CREATED, Json(envelope.to_json())).into_response()
            }
            // A 308 must not reach the caller as an HTTP redirect
            UploadOutcome::Body(body) => (StatusCode::OK, Json(body)).into_response(),
        }
    }
}

/// Chunk addressing carried in the gateway's query string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkQuery {
    pub chunk_index: Option<u32>,
    pub total_chunks: Option<u32>,
    /// Remaining parameters, forwarded upstream unchanged
    pub forwarded: Vec<(String, String)>,
}

impl ChunkQuery {
    pub fn parse(query: Vec<(String, String)>) -> AppResult<Self> {
        let mut chunk_index = None;
        let mut total_chunks = None;
        let mut forwarded = Vec::with_capacity(query.len());

        for (key, value) in query {
            match key.as_str() {
                CHUNK_INDEX_PARAM => chunk_index = Some(parse_count(CHUNK_INDEX_PARAM, &value)?),
                TOTAL_CHUNKS_PARAM => total_chunks = Some(parse_count(TOTAL_CHUNKS_PARAM, &value)?),
                _ => forwarded.push((key, value)),
            }
        }

        Ok(Self {
            chunk_index,
            total_chunks,
            forwarded,
        })
    }

    /// Position with defaults applied: chunk 0 of 1
    pub fn position(&self) -> AppResult<ChunkPosition> {
        ChunkPosition::new(self.chunk_index.unwrap_or(0), self.total_chunks.unwrap_or(1))
    }

    /// Whether the upload is split across several calls
    pub fn is_chunked(&self) -> bool {
        self.total_chunks.unwrap_or(1) > 1
    }
}

fn parse_count(name: &str, value: &str) -> AppResult<u32> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid {}: {}", name, value)))
}

/// Caller-declared offset, `"0"` when absent
fn declared_offset(incoming: &HeaderMap) -> &str {
    header_str(incoming, UPLOAD_OFFSET)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("0")
}

/// Drives the upload protocol for one inbound request
pub struct UploadCoordinator<'a, R: Relay> {
    client: &'a ProviderClient<R>,
}

impl<'a, R: Relay> UploadCoordinator<'a, R> {
    pub fn new(client: &'a ProviderClient<R>) -> Self {
        Self { client }
    }

    /// Open an upload session; the full envelope goes back to the caller
    #[instrument(skip_all, fields(url = %url))]
    pub async fn init(
        &self,
        url: &str,
        incoming: &HeaderMap,
        query: Vec<(String, String)>,
        metadata: Option<Value>,
    ) -> AppResult<Envelope> {
        let mut headers = self.client.credentials();
        copy_headers(incoming, INIT_HEADERS, &mut headers);

        let body = metadata.map(RequestBody::Json).unwrap_or(RequestBody::Empty);
        let request = RelayRequest::post(url, CallRole::Upload)
            .headers(headers)
            .query(query)
            .body(body)
            .accepting(AcceptedStatuses::UploadPhase);

        let envelope = self.client.send(request).await?.into_envelope().await?;
        record_upload_call("init", envelope.status);

        info!(
            status = %envelope.status,
            session_url_issued = envelope.headers.contains_key(UPLOAD_URL),
            "Upload session initialized"
        );

        Ok(envelope)
    }

    /// Send a whole file in one finalizing call
    #[instrument(skip_all, fields(url = %url, len = data.len()))]
    pub async fn upload_data(
        &self,
        url: &str,
        incoming: &HeaderMap,
        query: Vec<(String, String)>,
        data: Bytes,
    ) -> AppResult<UploadOutcome> {
        let request =
            self.data_request(url, incoming, query, data, UploadCommand::UploadFinalize)?;

        let envelope = self.client.send(request).await?.into_envelope().await?;
        record_upload_call(UploadCommand::UploadFinalize.as_str(), envelope.status);

        info!(status = %envelope.status, "Single-shot upload completed");

        Ok(UploadOutcome::from_envelope(envelope))
    }

    /// Send one chunk; only the last chunk finalizes
    #[instrument(
        skip_all,
        fields(url = %url, chunk_index = position.index, total_chunks = position.total)
    )]
    pub async fn upload_chunk(
        &self,
        url: &str,
        incoming: &HeaderMap,
        query: Vec<(String, String)>,
        data: Bytes,
        position: ChunkPosition,
    ) -> AppResult<UploadOutcome> {
        let mut session = UploadSession::begin(url, position, declared_offset(incoming));
        let command = UploadCommand::for_position(position);
        let chunk_len = data.len();

        let request = self.data_request(url, incoming, query, data, command)?;
        let envelope = self.client.send(request).await?.into_envelope().await?;
        record_upload_call(command.as_str(), envelope.status);

        session.record(command, envelope.status, &envelope.headers, chunk_len);
        info!(
            status = %envelope.status,
            command = command.as_str(),
            byte_offset = session.byte_offset,
            finalized = session.finalized,
            "Upload chunk relayed"
        );

        Ok(UploadOutcome::from_envelope(envelope))
    }

    /// Fetch file metadata
    pub async fn file_info(&self, url: &str, query: Vec<(String, String)>) -> AppResult<Envelope> {
        let request = RelayRequest::get(url, CallRole::Light)
            .headers(self.client.credentials())
            .query(query);
        self.client.send(request).await?.into_envelope().await
    }

    /// Wire request for a data call; identical for single-shot and chunked paths
    fn data_request(
        &self,
        url: &str,
        incoming: &HeaderMap,
        query: Vec<(String, String)>,
        data: Bytes,
        command: UploadCommand,
    ) -> AppResult<RelayRequest> {
        let mut headers = self.client.credentials();
        copy_headers(incoming, &[UPLOAD_PROTOCOL, "content-type"], &mut headers);
        headers.insert(UPLOAD_COMMAND, HeaderValue::from_static(command.as_str()));
        headers.insert(UPLOAD_OFFSET, header_value(declared_offset(incoming))?);
        headers.insert(CONTENT_LENGTH, HeaderValue::from(data.len()));

        Ok(RelayRequest::post(url, CallRole::Upload)
            .headers(headers)
            .query(query)
            .body(RequestBody::Bytes(data))
            .accepting(AcceptedStatuses::UploadPhase))
    }
}
