//! Error types for Relaygate
//!
//! Every failure leaving the gateway is one of three outward shapes:
//! the provider's own rejection, a transport failure, or an internal failure.
//! Client-side problems (missing credentials, malformed input) get their own
//! variants so they are never mistaken for upstream faults.

use axum::{
    body::Body,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

use crate::proxy::headers::filter_response_headers;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Upstream rejected request with status {}", .0.status)]
    UpstreamRejected(UpstreamRejection),

    #[error("Transport failure: {}", .0.message)]
    TransportFailure(TransportFailure),

    #[error("Internal failure: {0}")]
    InternalFailure(String),
}

/// Coarse classification of an [`AppError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The provider answered with a status outside the accepted set
    UpstreamRejected,
    /// A request was sent but no response arrived
    TransportFailure,
    /// Gateway-side fault
    InternalFailure,
    /// The caller's request was unusable before any upstream call
    Client,
}

/// A provider response outside the accepted status set, kept verbatim
#[derive(Debug, Clone)]
pub struct UpstreamRejection {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Low-level detail of a call that never produced a response
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct TransportFailure {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl AppError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::UpstreamRejected(_) => ErrorKind::UpstreamRejected,
            AppError::TransportFailure(_) => ErrorKind::TransportFailure,
            AppError::InternalFailure(_) => ErrorKind::InternalFailure,
            AppError::MissingCredential(_) | AppError::BadRequest(_) | AppError::NotFound(_) => {
                ErrorKind::Client
            }
        }
    }

    /// HTTP status this error is rendered with
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::UpstreamRejected(rejection) => rejection.status,
            AppError::MissingCredential(_) => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::TransportFailure(_) => StatusCode::BAD_GATEWAY,
            AppError::InternalFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Upstream status, when the provider answered
    pub fn upstream_status(&self) -> Option<StatusCode> {
        match self {
            AppError::UpstreamRejected(rejection) => Some(rejection.status),
            _ => None,
        }
    }

    /// Upstream body, when the provider answered
    pub fn upstream_body(&self) -> Option<&Bytes> {
        match self {
            AppError::UpstreamRejected(rejection) => Some(&rejection.body),
            _ => None,
        }
    }

    /// Upstream headers, when the provider answered
    pub fn upstream_headers(&self) -> Option<&HeaderMap> {
        match self {
            AppError::UpstreamRejected(rejection) => Some(&rejection.headers),
            _ => None,
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error details
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<TransportFailure>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (code, message, details) = match self {
            // The provider's payload goes back untouched so native SDK clients can parse it
            AppError::UpstreamRejected(rejection) => return rejection.into_response(),
            AppError::MissingCredential(msg) => ("MISSING_CREDENTIAL", msg, None),
            AppError::BadRequest(msg) => ("BAD_REQUEST", msg, None),
            AppError::NotFound(msg) => ("NOT_FOUND", msg, None),
            AppError::TransportFailure(failure) => (
                "TRANSPORT_FAILURE",
                format!("Failed to reach upstream: {}", failure.message),
                Some(failure),
            ),
            AppError::InternalFailure(msg) => ("INTERNAL_FAILURE", msg, None),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl IntoResponse for UpstreamRejection {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = filter_response_headers(&self.headers);
        response
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
