//! Configuration management for Relaygate
//!
//! Configuration is loaded from environment variables.

use anyhow::{Context, Result};
use std::env;

/// Default request body limit (50 MiB), large enough for single-shot uploads
const DEFAULT_MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,

    /// SOCKS relay used for every outbound call when set
    pub socks_host: Option<String>,

    /// OpenAI API base URL (without version segment)
    pub openai_api_url: String,
    /// Anthropic API base URL
    pub anthropic_api_url: String,
    /// xAI API base URL
    pub xai_api_url: String,
    /// Google Generative Language API base URL
    pub google_api_url: String,
    /// Bedrock runtime base URL; unset means the regional AWS endpoint
    pub bedrock_api_url: Option<String>,

    /// Maximum accepted inbound request body, in bytes
    pub max_body_bytes: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("RELAYGATE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("RELAYGATE_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("Invalid RELAYGATE_PORT")?,

            socks_host: env::var("SOCKS_HOST").ok().filter(|v| !v.trim().is_empty()),

            openai_api_url: base_url("OPENAI_API_URL", "https://api.openai.com"),
            anthropic_api_url: base_url("ANTHROPIC_API_URL", "https://api.anthropic.com"),
            xai_api_url: base_url("XAI_API_URL", "https://api.x.ai"),
            google_api_url: base_url(
                "GOOGLE_API_URL",
                "https://generativelanguage.googleapis.com",
            ),
            bedrock_api_url: env::var("BEDROCK_API_URL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(|v| v.trim_end_matches('/').to_string()),

            max_body_bytes: match env::var("MAX_BODY_BYTES") {
                Ok(v) => v.parse().context("Invalid MAX_BODY_BYTES")?,
                Err(_) => DEFAULT_MAX_BODY_BYTES,
            },
        })
    }

    /// Configuration pointing every provider at a single base URL.
    ///
    /// Used by tests that stand up one mock upstream for all providers.
    pub fn with_upstream(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            socks_host: None,
            openai_api_url: base.clone(),
            anthropic_api_url: base.clone(),
            xai_api_url: base.clone(),
            google_api_url: base.clone(),
            bedrock_api_url: Some(base),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Read a base URL from the environment, trimming any trailing slash
fn base_url(key: &str, default: &str) -> String {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .trim_end_matches('/')
        .to_string()
}
