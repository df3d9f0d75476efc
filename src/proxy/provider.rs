//! Provider catalogue
//!
//! Each inbound request gets its own [`ProviderClient`], bound to that
//! request's credentials and dropped when the request finishes.

use axum::http::HeaderMap;
use reqwest::header::HeaderValue;
use serde_json::Value;
use tracing::debug;

use crate::{
    config::Config,
    error::{AppError, AppResult},
    proxy::{
        client::{
            CallRole, MultipartForm, Relay, RelayRequest, RelayResponse, RequestBody,
            ResponseMode, UpstreamClient,
        },
        headers::{copy_headers, require_header},
        normalize::StreamingIntent,
        transport::Transport,
    },
};

/// Default Anthropic API version when the caller sends none
pub const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";

/// Upstream AI provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Anthropic,
    Xai,
    Google,
}

impl Provider {
    /// Get the provider name for logging and metrics
    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Xai => "xai",
            Provider::Google => "google",
        }
    }

    pub fn base_url<'a>(&self, config: &'a Config) -> &'a str {
        match self {
            Provider::OpenAi => &config.openai_api_url,
            Provider::Anthropic => &config.anthropic_api_url,
            Provider::Xai => &config.xai_api_url,
            Provider::Google => &config.google_api_url,
        }
    }

    /// Outbound credential headers taken from the inbound request
    pub fn credential_headers(
        &self,
        incoming: &HeaderMap,
        query: &[(String, String)],
    ) -> AppResult<HeaderMap> {
        let mut headers = HeaderMap::new();

        match self {
            Provider::OpenAi | Provider::Xai => {
                headers.insert("authorization", require_header(incoming, "authorization")?);
                if *self == Provider::OpenAi {
                    copy_headers(
                        incoming,
                        &["openai-organization", "openai-project"],
                        &mut headers,
                    );
                }
            }
            Provider::Anthropic => {
                headers.insert("x-api-key", require_header(incoming, "x-api-key")?);
                let version = incoming
                    .get("anthropic-version")
                    .cloned()
                    .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_ANTHROPIC_VERSION));
                headers.insert("anthropic-version", version);
                copy_headers(incoming, &["anthropic-beta"], &mut headers);
            }
            Provider::Google => {
                // The API key may travel in the forwarded query string instead
                let key_in_query = query.iter().any(|(k, v)| k == "key" && !v.is_empty());
                if !key_in_query {
                    headers.insert("x-goog-api-key", require_header(incoming, "x-goog-api-key")?);
                }
            }
        }

        Ok(headers)
    }
}

/// Short-lived client for one inbound request
pub struct ProviderClient<R: Relay = UpstreamClient> {
    provider: Provider,
    base_url: String,
    credentials: HeaderMap,
    relay: R,
}

impl ProviderClient<UpstreamClient> {
    /// Build a client for one request, selecting the transport and binding credentials
    pub fn for_request(
        provider: Provider,
        config: &Config,
        incoming: &HeaderMap,
        query: &[(String, String)],
    ) -> AppResult<Self> {
        let credentials = provider.credential_headers(incoming, query)?;
        let relay = UpstreamClient::new(Transport::select(config));
        Ok(Self::with_relay(
            provider,
            provider.base_url(config),
            credentials,
            relay,
        ))
    }
}

impl<R: Relay> ProviderClient<R> {
    pub fn with_relay(provider: Provider, base_url: &str, credentials: HeaderMap, relay: R) -> Self {
        Self {
            provider,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            relay,
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn relay(&self) -> &R {
        &self.relay
    }

    /// Absolute upstream URL for a path
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Fresh copy of the credential headers for an outbound call
    pub fn credentials(&self) -> HeaderMap {
        self.credentials.clone()
    }

    /// Send a fully described request through the relay
    pub async fn send(&self, request: RelayRequest) -> AppResult<RelayResponse> {
        self.relay.call(request).await
    }

    /// POST a JSON body; streamed when the caller asked for a stream
    pub async fn post_json(
        &self,
        path: &str,
        query: Vec<(String, String)>,
        body: Value,
        role: CallRole,
        intent: StreamingIntent,
    ) -> AppResult<RelayResponse> {
        let mode = if intent.is_streaming() {
            ResponseMode::Streamed
        } else {
            ResponseMode::Buffered
        };
        debug!(provider = self.provider.name(), path = %path, ?mode, "Relaying JSON request");

        let request = RelayRequest::post(self.url(path), role)
            .headers(self.credentials())
            .query(query)
            .body(RequestBody::Json(body))
            .mode(mode);
        self.send(request).await
    }

    /// POST a multipart form
    pub async fn post_multipart(
        &self,
        path: &str,
        form: MultipartForm,
        role: CallRole,
    ) -> AppResult<RelayResponse> {
        if form.files.is_empty() && form.fields.is_empty() {
            return Err(AppError::BadRequest("Empty multipart body".to_string()));
        }
        debug!(
            provider = self.provider.name(),
            path = %path,
            files = form.files.len(),
            "Relaying multipart request"
        );

        let request = RelayRequest::post(self.url(path), role)
            .headers(self.credentials())
            .body(RequestBody::Multipart(form));
        self.send(request).await
    }
}
