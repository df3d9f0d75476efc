//! Streaming relay
//!
//! Two ways of handing an upstream byte stream to the caller:
//! - raw pass-through, chunk for chunk, for endpoints that already speak the
//!   provider's native stream format;
//! - framed relay, which decodes the upstream into frames (SSE `data:` lines,
//!   or any other [`FrameDecoder`]) and re-emits each frame as its own `data:`
//!   event.

use std::borrow::Cow;
use std::convert::Infallible;
use std::fmt::Display;

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::Response,
};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::{
    error::{AppError, AppResult, UpstreamRejection},
    proxy::{client::StreamedResponse, headers::filter_response_headers},
    routes::metrics::record_stream_frames,
};

/// Terminal event of a framed relay
pub const DONE_SENTINEL: &str = "[DONE]";

/// Buffer for accumulating incomplete lines across chunk boundaries.
///
/// Stream data arrives as byte chunks that may not align with line boundaries
/// or even with UTF-8 character boundaries, so raw bytes are kept until a
/// `\n` completes the line.
///
/// # Example
/// ```
/// use relaygate::streaming::SseLineBuffer;
///
/// let mut buffer = SseLineBuffer::new();
///
/// let lines1 = buffer.feed(b"data: {\"content\":\"hel");
/// assert!(lines1.is_empty());
///
/// let lines2 = buffer.feed(b"lo\"}\n");
/// assert_eq!(lines2, vec!["data: {\"content\":\"hello\"}"]);
/// ```
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    incomplete: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes into the buffer and return any complete, non-empty lines.
    ///
    /// Line terminators (`\n` or `\r\n`) are stripped. Incomplete trailing
    /// data is retained for the next call.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.incomplete.extend_from_slice(bytes);

        let mut complete_lines = Vec::new();
        while let Some(newline_pos) = self.incomplete.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.incomplete.drain(..=newline_pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }

            // Blank lines separate SSE events
            if !line.is_empty() {
                complete_lines.push(String::from_utf8_lossy(&line).into_owned());
            }
        }

        complete_lines
    }

    pub fn has_incomplete(&self) -> bool {
        !self.incomplete.is_empty()
    }

    /// Remaining incomplete data, for inspection
    pub fn remaining(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.incomplete)
    }

    /// Drain the unterminated tail at end of stream, if it holds anything
    pub fn take_remaining(&mut self) -> Option<String> {
        let tail = std::mem::take(&mut self.incomplete);
        let text = String::from_utf8_lossy(&tail);
        let text = text.trim_end_matches('\r');
        if text.trim().is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }
}

/// Failure while decoding frames, or a failure the upstream reported in-band
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct FrameError {
    pub code: String,
    pub message: String,
}

impl FrameError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Splits an upstream byte stream into frame payloads
pub trait FrameDecoder: Send + 'static {
    /// Feed one upstream chunk and return every frame it completes, in order.
    ///
    /// An `Err` entry ends the relay; entries after it are ignored.
    fn feed(&mut self, bytes: &[u8]) -> Vec<Result<String, FrameError>>;

    /// Flush whatever the upstream left unterminated
    fn finish(&mut self) -> Option<Result<String, FrameError>>;
}

/// `data:` payloads of an SSE stream.
///
/// Other SSE fields, comments and the upstream's own `[DONE]` are dropped.
#[derive(Debug, Default)]
pub struct SseFrames {
    lines: SseLineBuffer,
}

impl SseFrames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payload of one complete line, if it is a `data:` line
    pub fn decode_line(line: &str) -> Option<String> {
        let payload = line.strip_prefix("data:")?;
        let payload = payload.strip_prefix(' ').unwrap_or(payload);
        if payload.is_empty() || payload == DONE_SENTINEL {
            None
        } else {
            Some(payload.to_string())
        }
    }
}

impl FrameDecoder for SseFrames {
    fn feed(&mut self, bytes: &[u8]) -> Vec<Result<String, FrameError>> {
        self.lines
            .feed(bytes)
            .iter()
            .filter_map(|line| Self::decode_line(line))
            .map(Ok)
            .collect()
    }

    fn finish(&mut self) -> Option<Result<String, FrameError>> {
        self.lines
            .take_remaining()
            .and_then(|line| Self::decode_line(&line))
            .map(Ok)
    }
}

/// Format one frame as an event
pub fn format_frame(frame: &str) -> Bytes {
    Bytes::from(format!("data: {}\n\n", frame))
}

/// Terminal event after the last frame
pub fn format_done() -> Bytes {
    Bytes::from(format!("data: {}\n\n", DONE_SENTINEL))
}

/// Format a mid-stream failure as the single error event of a framed relay
pub fn format_error_event(message: &str, code: Option<&str>) -> Bytes {
    let mut error = json!({
        "message": message,
        "type": "stream_error",
    });
    if let Some(code) = code {
        error["code"] = Value::String(code.to_string());
    }
    Bytes::from(format!("data: {}\n\n", json!({ "error": error })))
}

/// Error event for a provider that rejected the call before streaming began
pub fn format_rejection_event(rejection: &UpstreamRejection) -> Bytes {
    let event = json!({
        "error": {
            "message": format!("Upstream rejected request with status {}", rejection.status),
            "type": "upstream_error",
            "status": rejection.status.as_u16(),
            "body": String::from_utf8_lossy(&rejection.body),
        }
    });
    Bytes::from(format!("data: {}\n\n", event))
}

fn emit(bytes: Bytes) -> Result<Bytes, Infallible> {
    Ok(bytes)
}

/// Re-frame an upstream byte stream.
///
/// Yields one chunk per decoded frame, then `data: [DONE]`. An upstream or
/// decoding error ends the relay with exactly one error event; the returned
/// stream itself never fails.
pub fn relay_frames<S, E, D>(
    upstream: S,
    mut decoder: D,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
    D: FrameDecoder,
{
    async_stream::stream! {
        let mut frames: u64 = 0;
        futures::pin_mut!(upstream);

        while let Some(chunk) = upstream.next().await {
            let decoded = match chunk {
                Ok(bytes) => decoder.feed(&bytes),
                Err(e) => vec![Err(FrameError::new("upstream_stream_error", e.to_string()))],
            };

            for frame in decoded {
                match frame {
                    Ok(frame) => {
                        frames += 1;
                        yield emit(format_frame(&frame));
                    }
                    Err(err) => {
                        warn!(error = %err, code = %err.code, frames = frames, "Upstream stream failed mid-flight");
                        record_stream_frames("error", frames);
                        yield emit(format_error_event(&err.message, Some(&err.code)));
                        return;
                    }
                }
            }
        }

        match decoder.finish() {
            Some(Ok(frame)) => {
                frames += 1;
                yield emit(format_frame(&frame));
            }
            Some(Err(err)) => {
                warn!(error = %err, code = %err.code, frames = frames, "Upstream stream ended mid-frame");
                record_stream_frames("error", frames);
                yield emit(format_error_event(&err.message, Some(&err.code)));
                return;
            }
            None => {}
        }

        debug!(frames = frames, "Framed relay completed");
        record_stream_frames("completed", frames);
        yield emit(format_done());
    }
}

/// Build an event-stream response around a framed relay
pub fn event_stream_response<S>(stream: S) -> AppResult<Response>
where
    S: Stream<Item = Result<Bytes, Infallible>> + Send + 'static,
{
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(stream))
        .map_err(|e| AppError::InternalFailure(format!("Failed to build response: {}", e)))
}

/// Hand an upstream stream to the caller untouched
pub fn passthrough_response(streamed: StreamedResponse) -> Response {
    let mut response = Response::new(Body::from_stream(streamed.stream));
    *response.status_mut() = streamed.status;
    *response.headers_mut() = filter_response_headers(&streamed.headers);
    response.headers_mut().insert("X-Accel-Buffering", header::HeaderValue::from_static("no"));
    response
}
