//! Relaygate - AI provider gateway
//!
//! Relays client requests to OpenAI, Anthropic, xAI and Google Gemini,
//! preserving provider payloads byte for byte. Large files go through the
//! Gemini resumable upload protocol; chat streams are passed through or
//! re-framed as uniform events.

pub mod config;
pub mod error;
pub mod proxy;
pub mod routes;
pub mod streaming;
pub mod upload;

use std::time::Instant;

pub use crate::config::Config;
pub use crate::error::{AppError, AppResult};
pub use crate::proxy::{Provider, ProviderClient, Relay, UpstreamClient};

/// Application state shared across all request handlers
///
/// Read-only after startup; upstream clients are built per request.
pub struct AppState {
    pub config: Config,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            start_time: Instant::now(),
        }
    }
}
