//! Header utilities for AI provider proxying
//!
//! Outbound requests carry only the headers each provider needs: the caller's
//! credential plus a named set of protocol headers copied verbatim. Responses
//! keep every upstream header except connection-level framing.

use axum::http::header::{self, HeaderName};
use reqwest::header::{HeaderMap, HeaderValue};

use crate::error::{AppError, AppResult};

/// Hop-by-hop headers that must never be forwarded
const HOP_BY_HOP_HEADERS: &[HeaderName] = &[
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Check if a header is a hop-by-hop header that should not be forwarded
pub fn is_hop_by_hop_header(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(name)
}

/// Filter framing headers from a response
///
/// Used when converting provider responses back to client responses. The
/// gateway re-frames the body, so `content-length` is recomputed downstream.
pub fn filter_response_headers(response_headers: &HeaderMap) -> HeaderMap {
    let mut filtered = HeaderMap::new();

    for (name, value) in response_headers {
        if !is_hop_by_hop_header(name) && *name != header::CONTENT_LENGTH {
            filtered.append(name.clone(), value.clone());
        }
    }

    filtered
}

/// Copy the named headers from an inbound request, preserving their values
pub fn copy_headers(incoming: &HeaderMap, names: &[&str], target: &mut HeaderMap) {
    for name in names {
        if let Some(value) = incoming.get(*name) {
            if let Ok(name) = HeaderName::from_bytes(name.as_bytes()) {
                target.insert(name, value.clone());
            }
        }
    }
}

/// Fetch a mandatory credential header, failing with a client error when absent
pub fn require_header(incoming: &HeaderMap, name: &str) -> AppResult<HeaderValue> {
    incoming
        .get(name)
        .filter(|v| !v.as_bytes().is_empty())
        .cloned()
        .ok_or_else(|| AppError::MissingCredential(format!("Missing {} header", name)))
}

/// Header value as a string, when present and valid
pub fn header_str<'a>(incoming: &'a HeaderMap, name: &str) -> Option<&'a str> {
    incoming.get(name).and_then(|v| v.to_str().ok())
}

/// Build a header value, mapping invalid bytes to an internal failure
pub fn header_value(value: &str) -> AppResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| AppError::InternalFailure(format!("Invalid header value: {}", e)))
}
