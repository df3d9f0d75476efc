//! Amazon Bedrock runtime relay
//!
//! Bedrock callers put their AWS credentials, region and model id in the
//! request body. Every call is SigV4-signed with those credentials; nothing is
//! kept once the request ends. Streamed responses arrive as AWS event-stream
//! messages whose `chunk` events carry the model's JSON frames, base64-encoded.

use std::fmt;
use std::time::SystemTime;

use aws_credential_types::Credentials;
use aws_sigv4::{
    http_request::{sign, SignableBody, SignableRequest, SigningSettings},
    sign::v4,
};
use aws_smithy_eventstream::frame::{DecodedFrame, MessageFrameDecoder};
use aws_smithy_types::event_stream::Message;
use axum::http::{header, HeaderMap, HeaderName};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::{Bytes, BytesMut};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::{
    config::Config,
    error::{AppError, AppResult},
    proxy::{
        client::{
            CallRole, Envelope, Relay, RelayRequest, RelayResponse, RequestBody, ResponseMode,
            StreamedResponse, UpstreamClient,
        },
        headers::header_value,
        transport::Transport,
    },
    streaming::{FrameDecoder, FrameError},
};

/// Service name in SigV4 credential scopes
const SIGNING_NAME: &str = "bedrock";

/// Provider name recorded in signed credentials
const CREDENTIALS_SOURCE: &str = "relaygate";

const JSON_CONTENT_TYPE: &str = "application/json";
const EVENT_STREAM_CONTENT_TYPE: &str = "application/vnd.amazon.eventstream";

/// Error code for event-stream bytes that do not decode
const MALFORMED_EVENT_STREAM: &str = "malformed_event_stream";

/// Bedrock runtime operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeAction {
    /// `InvokeModel`
    Invoke,
    /// `InvokeModelWithResponseStream`
    InvokeStream,
}

impl InvokeAction {
    fn path_segment(self) -> &'static str {
        match self {
            InvokeAction::Invoke => "invoke",
            InvokeAction::InvokeStream => "invoke-with-response-stream",
        }
    }

    fn accept(self) -> &'static str {
        match self {
            InvokeAction::Invoke => JSON_CONTENT_TYPE,
            InvokeAction::InvokeStream => EVENT_STREAM_CONTENT_TYPE,
        }
    }

    fn mode(self) -> ResponseMode {
        match self {
            InvokeAction::Invoke => ResponseMode::Buffered,
            InvokeAction::InvokeStream => ResponseMode::Streamed,
        }
    }
}

/// Inbound Bedrock request: credentials, target and the model's own body
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BedrockRequest {
    #[serde(default)]
    pub model_id: String,
    #[serde(default)]
    pub access_key_id: String,
    #[serde(default)]
    pub access_key_secret: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub request_body: Value,
}

impl fmt::Debug for BedrockRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BedrockRequest")
            .field("model_id", &self.model_id)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl BedrockRequest {
    /// Parse and validate an inbound body
    pub fn parse(body: &Bytes) -> AppResult<Self> {
        let request: Self = serde_json::from_slice(body)
            .map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {}", e)))?;
        request.validate()?;
        Ok(request)
    }

    fn validate(&self) -> AppResult<()> {
        if self.access_key_id.trim().is_empty() || self.access_key_secret.trim().is_empty() {
            return Err(AppError::MissingCredential(
                "Missing accessKeyId or accessKeySecret".to_string(),
            ));
        }
        if self.model_id.trim().is_empty() {
            return Err(AppError::BadRequest("modelId is required".to_string()));
        }
        // The region becomes part of the endpoint host
        let region_ok = !self.region.is_empty()
            && self
                .region
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !region_ok {
            return Err(AppError::BadRequest(format!(
                "Invalid region: {:?}",
                self.region
            )));
        }
        if self.request_body.is_null() {
            return Err(AppError::BadRequest("requestBody is required".to_string()));
        }
        Ok(())
    }
}

/// Regional Bedrock runtime endpoint
pub fn regional_endpoint(region: &str) -> String {
    format!("https://bedrock-runtime.{}.amazonaws.com", region)
}

/// Short-lived Bedrock client bound to one request's credentials
pub struct BedrockClient<R: Relay = UpstreamClient> {
    base_url: String,
    request: BedrockRequest,
    relay: R,
}

impl BedrockClient<UpstreamClient> {
    pub fn for_request(config: &Config, request: BedrockRequest) -> Self {
        let base_url = config
            .bedrock_api_url
            .clone()
            .unwrap_or_else(|| regional_endpoint(&request.region));
        let relay = UpstreamClient::new(Transport::select(config));
        Self::with_relay(&base_url, request, relay)
    }
}

impl<R: Relay> BedrockClient<R> {
    pub fn with_relay(base_url: &str, request: BedrockRequest, relay: R) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            request,
            relay,
        }
    }

    /// Absolute URL of an action on the requested model
    pub fn url(&self, action: InvokeAction) -> String {
        format!(
            "{}/model/{}/{}",
            self.base_url,
            urlencoding::encode(&self.request.model_id),
            action.path_segment()
        )
    }

    /// Outbound request for an action, signed at `time`
    pub fn signed_request(&self, action: InvokeAction, time: SystemTime) -> AppResult<RelayRequest> {
        let url = self.url(action);
        let body = serde_json::to_vec(&self.request.request_body)
            .map_err(|e| AppError::BadRequest(format!("Invalid requestBody: {}", e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, header_value(JSON_CONTENT_TYPE)?);
        headers.insert(header::ACCEPT, header_value(action.accept())?);
        headers.extend(self.signature_headers(&url, &body, action, time)?);

        Ok(RelayRequest::post(url, CallRole::Generative)
            .headers(headers)
            .body(RequestBody::Bytes(Bytes::from(body)))
            .mode(action.mode()))
    }

    fn signature_headers(
        &self,
        url: &str,
        body: &[u8],
        action: InvokeAction,
        time: SystemTime,
    ) -> AppResult<HeaderMap> {
        let identity = Credentials::new(
            self.request.access_key_id.clone(),
            self.request.access_key_secret.clone(),
            None,
            None,
            CREDENTIALS_SOURCE,
        )
        .into();
        let params = v4::SigningParams::builder()
            .identity(&identity)
            .region(&self.request.region)
            .name(SIGNING_NAME)
            .time(time)
            .settings(SigningSettings::default())
            .build()
            .map_err(|e| AppError::InternalFailure(format!("Failed to prepare signing: {}", e)))?
            .into();

        let signed = [
            (header::CONTENT_TYPE.as_str(), JSON_CONTENT_TYPE),
            (header::ACCEPT.as_str(), action.accept()),
        ];
        let signable = SignableRequest::new("POST", url, signed.into_iter(), SignableBody::Bytes(body))
            .map_err(|e| AppError::InternalFailure(format!("Failed to sign request: {}", e)))?;
        let (instructions, _signature) = sign(signable, &params)
            .map_err(|e| AppError::InternalFailure(format!("Failed to sign request: {}", e)))?
            .into_parts();

        let mut headers = HeaderMap::new();
        for (name, value) in instructions.headers() {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| AppError::InternalFailure(format!("Invalid header name: {}", e)))?;
            headers.insert(name, header_value(value)?);
        }
        Ok(headers)
    }

    /// `InvokeModel`: the model's complete JSON response
    pub async fn invoke(&self) -> AppResult<Envelope> {
        let request = self.signed_request(InvokeAction::Invoke, SystemTime::now())?;
        debug!(model = %self.request.model_id, region = %self.request.region, "Invoking Bedrock model");
        self.relay.call(request).await?.into_envelope().await
    }

    /// `InvokeModelWithResponseStream`: the live event-stream body
    pub async fn invoke_stream(&self) -> AppResult<StreamedResponse> {
        let request = self.signed_request(InvokeAction::InvokeStream, SystemTime::now())?;
        debug!(model = %self.request.model_id, region = %self.request.region, "Streaming Bedrock model");
        self.relay
            .call(request)
            .await
            .map(RelayResponse::into_stream)
    }
}

#[derive(Deserialize)]
struct ChunkPayload {
    bytes: Option<String>,
}

/// Model frames carried in a Bedrock event stream
pub struct BedrockFrames {
    buffer: BytesMut,
    decoder: MessageFrameDecoder,
}

impl Default for BedrockFrames {
    fn default() -> Self {
        Self::new()
    }
}

impl BedrockFrames {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
            decoder: MessageFrameDecoder::new(),
        }
    }

    /// Length of the message at the head of the buffer, once its prelude is in
    fn next_message_len(&self) -> Option<usize> {
        let prelude = self.buffer.get(..4)?;
        Some(u32::from_be_bytes([prelude[0], prelude[1], prelude[2], prelude[3]]) as usize)
    }

    fn decode_message(message: &Message) -> Result<Option<String>, FrameError> {
        match message_header(message, ":message-type") {
            Some("exception") => {
                let code = message_header(message, ":exception-type").unwrap_or("bedrock_exception");
                return Err(FrameError::new(code, exception_message(message.payload())));
            }
            Some("error") => {
                let code = message_header(message, ":error-code").unwrap_or("bedrock_error");
                let text = message_header(message, ":error-message")
                    .unwrap_or("Bedrock reported a stream error");
                return Err(FrameError::new(code, text));
            }
            _ => {}
        }
        if message_header(message, ":event-type") != Some("chunk") {
            return Ok(None);
        }

        let chunk: ChunkPayload = serde_json::from_slice(message.payload())
            .map_err(|e| FrameError::new(MALFORMED_EVENT_STREAM, format!("Invalid chunk event: {}", e)))?;
        let Some(encoded) = chunk.bytes else {
            return Ok(None);
        };
        let decoded = STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| FrameError::new(MALFORMED_EVENT_STREAM, format!("Invalid chunk encoding: {}", e)))?;
        let text = String::from_utf8(decoded)
            .map_err(|e| FrameError::new(MALFORMED_EVENT_STREAM, format!("Chunk is not UTF-8: {}", e)))?;
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| FrameError::new(MALFORMED_EVENT_STREAM, format!("Chunk is not JSON: {}", e)))?;

        // A frame must fit on a single `data:` line
        if text.contains('\n') {
            Ok(Some(value.to_string()))
        } else {
            Ok(Some(text))
        }
    }
}

impl FrameDecoder for BedrockFrames {
    fn feed(&mut self, bytes: &[u8]) -> Vec<Result<String, FrameError>> {
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        while let Some(len) = self.next_message_len() {
            if self.buffer.len() < len {
                break;
            }
            let mut raw = self.buffer.split_to(len);
            let decoded = match self.decoder.decode_frame(&mut raw) {
                Ok(DecodedFrame::Complete(message)) => Self::decode_message(&message),
                Ok(DecodedFrame::Incomplete) => Err(FrameError::new(
                    MALFORMED_EVENT_STREAM,
                    format!("Event-stream message length {} is too short", len),
                )),
                Err(e) => Err(FrameError::new(
                    MALFORMED_EVENT_STREAM,
                    format!("Malformed event-stream message: {}", e),
                )),
            };

            match decoded {
                Ok(Some(frame)) => frames.push(Ok(frame)),
                Ok(None) => {}
                Err(err) => {
                    frames.push(Err(err));
                    break;
                }
            }
        }
        frames
    }

    fn finish(&mut self) -> Option<Result<String, FrameError>> {
        (!self.buffer.is_empty()).then(|| {
            Err(FrameError::new(
                MALFORMED_EVENT_STREAM,
                "Event stream ended inside a message",
            ))
        })
    }
}

/// String header of an event-stream message
fn message_header<'m>(message: &'m Message, name: &str) -> Option<&'m str> {
    message
        .headers()
        .iter()
        .find(|h| h.name().as_str() == name)
        .and_then(|h| h.value().as_string().ok())
        .map(|v| v.as_str())
}

fn exception_message(payload: &[u8]) -> String {
    serde_json::from_slice::<Value>(payload)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("Message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| String::from_utf8_lossy(payload).into_owned())
}
