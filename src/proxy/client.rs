//! Upstream client
//!
//! Issues exactly one HTTP request per [`RelayRequest`]. The response is either
//! fully buffered or handed back as a live byte stream, with status and headers
//! captured before any body bytes are read.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use reqwest::multipart::{Form, Part};
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use crate::{
    error::{AppError, AppResult, UpstreamRejection},
    proxy::{headers::filter_response_headers, normalize, transport::Transport},
};

/// Boxed error carried by upstream byte streams
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Stream type for streaming responses from AI providers
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>>;

/// Kind of endpoint being called, which decides the default timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallRole {
    /// Cheap text endpoints (token counting, metadata, embeddings)
    Light,
    /// Generative endpoints (chat, images, transcription)
    Generative,
    /// Resumable upload phases
    Upload,
}

impl CallRole {
    /// Default timeout for this kind of call
    pub fn default_timeout(self) -> Duration {
        match self {
            CallRole::Light => Duration::from_secs(60),
            CallRole::Generative => Duration::from_secs(10 * 60),
            CallRole::Upload => Duration::from_secs(5 * 60),
        }
    }
}

/// How the response body is handed back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Buffered,
    Streamed,
}

/// Upstream statuses treated as success
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptedStatuses {
    /// Only `200 OK`
    OkOnly,
    /// `200`, `201` and `308` for resumable upload phases
    UploadPhase,
}

impl AcceptedStatuses {
    pub fn accepts(self, status: StatusCode) -> bool {
        match self {
            AcceptedStatuses::OkOnly => status == StatusCode::OK,
            AcceptedStatuses::UploadPhase => matches!(
                status,
                StatusCode::OK | StatusCode::CREATED | StatusCode::PERMANENT_REDIRECT
            ),
        }
    }
}

/// One file part of a multipart body
#[derive(Debug, Clone)]
pub struct FilePart {
    pub field: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Multipart body, rebuilt into a reqwest form at send time
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    pub fields: Vec<(String, String)>,
    pub files: Vec<FilePart>,
}

impl MultipartForm {
    fn into_form(self) -> AppResult<Form> {
        let mut form = Form::new();

        for file in self.files {
            let mut part = Part::bytes(file.data.to_vec());
            if let Some(name) = file.file_name {
                part = part.file_name(name);
            }
            if let Some(content_type) = file.content_type {
                part = part.mime_str(&content_type).map_err(|e| {
                    AppError::BadRequest(format!("Invalid part content type: {}", e))
                })?;
            }
            form = form.part(file.field, part);
        }

        for (name, value) in self.fields {
            form = form.text(name, value);
        }

        Ok(form)
    }
}

/// Body of an outbound request
#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Bytes(Bytes),
    Multipart(MultipartForm),
}

/// A fully described outbound call
#[derive(Debug, Clone)]
pub struct RelayRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
    pub mode: ResponseMode,
    pub timeout: Duration,
    pub accepted: AcceptedStatuses,
}

impl RelayRequest {
    /// Buffered request accepting only `200`, with the role's default timeout
    pub fn new(method: Method, url: impl Into<String>, role: CallRole) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: RequestBody::Empty,
            mode: ResponseMode::Buffered,
            timeout: role.default_timeout(),
            accepted: AcceptedStatuses::OkOnly,
        }
    }

    pub fn post(url: impl Into<String>, role: CallRole) -> Self {
        Self::new(Method::POST, url, role)
    }

    pub fn get(url: impl Into<String>, role: CallRole) -> Self {
        Self::new(Method::GET, url, role)
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    pub fn mode(mut self, mode: ResponseMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn accepting(mut self, accepted: AcceptedStatuses) -> Self {
        self.accepted = accepted;
        self
    }
}

/// A fully materialized upstream response
#[derive(Debug, Clone)]
pub struct Envelope {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Envelope {
    /// Body decoded as JSON when possible, otherwise as text
    pub fn decoded_body(&self) -> Value {
        decode_body(&self.body)
    }

    /// `{status, headers, data}` view handed to callers that need provider metadata
    pub fn to_json(&self) -> Value {
        let mut headers = Map::new();
        for name in self.headers.keys() {
            let values: Vec<Value> = self
                .headers
                .get_all(name)
                .iter()
                .map(|v| Value::String(String::from_utf8_lossy(v.as_bytes()).into_owned()))
                .collect();
            let value = if values.len() == 1 {
                values.into_iter().next().unwrap_or(Value::Null)
            } else {
                Value::Array(values)
            };
            headers.insert(name.as_str().to_string(), value);
        }

        serde_json::json!({
            "status": self.status.as_u16(),
            "headers": Value::Object(headers),
            "data": self.decoded_body(),
        })
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = filter_response_headers(&self.headers);
        response
    }
}

/// A live upstream response
pub struct StreamedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub stream: ByteStream,
}

impl std::fmt::Debug for StreamedResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamedResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Result of one upstream call
#[derive(Debug)]
pub enum RelayResponse {
    Buffered(Envelope),
    Streamed(StreamedResponse),
}

impl RelayResponse {
    /// Materialize the response, draining a live stream if necessary
    pub async fn into_envelope(self) -> AppResult<Envelope> {
        match self {
            RelayResponse::Buffered(envelope) => Ok(envelope),
            RelayResponse::Streamed(streamed) => {
                let chunks: Vec<Bytes> = streamed.stream.try_collect().await.map_err(|e| {
                    AppError::TransportFailure(crate::error::TransportFailure {
                        message: format!("Upstream body aborted: {}", e),
                        code: Some("body".to_string()),
                        ..Default::default()
                    })
                })?;
                Ok(Envelope {
                    status: streamed.status,
                    headers: streamed.headers,
                    body: Bytes::from(chunks.concat()),
                })
            }
        }
    }

    /// Live view of the response; a buffered body becomes a single chunk
    pub fn into_stream(self) -> StreamedResponse {
        match self {
            RelayResponse::Streamed(streamed) => streamed,
            RelayResponse::Buffered(envelope) => StreamedResponse {
                status: envelope.status,
                headers: envelope.headers,
                stream: Box::pin(futures::stream::iter(vec![Ok::<_, BoxError>(envelope.body)])),
            },
        }
    }
}

/// Decode a response body: JSON when it parses, text otherwise, `""` when empty
pub fn decode_body(body: &Bytes) -> Value {
    if body.is_empty() {
        return Value::String(String::new());
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

/// Anything that can perform an outbound call
#[async_trait]
pub trait Relay: Send + Sync {
    async fn call(&self, request: RelayRequest) -> AppResult<RelayResponse>;
}

/// reqwest-backed relay; builds a fresh client for every call
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    transport: Transport,
}

impl UpstreamClient {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }
}

#[async_trait]
impl Relay for UpstreamClient {
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn call(&self, request: RelayRequest) -> AppResult<RelayResponse> {
        let client = self.transport.build_client()?;

        let RelayRequest {
            method,
            url,
            headers,
            query,
            body,
            mode,
            timeout,
            accepted,
        } = request;

        let mut builder = client.request(method, url.as_str()).headers(headers);
        // A live stream may outlast the deadline; it only bounds the response head
        if mode == ResponseMode::Buffered {
            builder = builder.timeout(timeout);
        }
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Bytes(bytes) => builder.body(bytes),
            RequestBody::Multipart(form) => builder.multipart(form.into_form()?),
        };

        let sent = match tokio::time::timeout(timeout, builder.send()).await {
            Ok(sent) => sent.map_err(normalize::classify),
            Err(_) => Err(normalize::timeout_failure(&url, timeout)),
        };
        let response = sent.map_err(|err| {
            warn!(url = %url, error = %err, "Upstream call failed without a response");
            err
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        debug!(url = %url, status = %status, "Received upstream response");

        if !accepted.accepts(status) {
            let body = read_body(response, &url, timeout).await?;
            warn!(url = %url, status = %status, body_len = body.len(), "Upstream rejected request");
            return Err(AppError::UpstreamRejected(UpstreamRejection {
                status,
                headers,
                body,
            }));
        }

        match mode {
            ResponseMode::Buffered => {
                let body = read_body(response, &url, timeout).await?;
                Ok(RelayResponse::Buffered(Envelope {
                    status,
                    headers,
                    body,
                }))
            }
            ResponseMode::Streamed => Ok(RelayResponse::Streamed(StreamedResponse {
                status,
                headers,
                stream: Box::pin(response.bytes_stream().map_err(|e| Box::new(e) as BoxError)),
            })),
        }
    }
}

/// Read a whole response body within the call's deadline
async fn read_body(response: reqwest::Response, url: &str, timeout: Duration) -> AppResult<Bytes> {
    match tokio::time::timeout(timeout, response.bytes()).await {
        Ok(body) => body.map_err(normalize::classify),
        Err(_) => Err(normalize::timeout_failure(url, timeout)),
    }
}
