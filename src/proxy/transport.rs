//! Outbound transport selection
//!
//! Every upstream call builds its own client from process configuration:
//! either a direct connection or a tunnel through the configured SOCKS relay.
//! The tunnelled client skips certificate verification; the direct client
//! never does.

use reqwest::{redirect::Policy, Client, Proxy};
use tracing::debug;

use crate::{
    config::Config,
    error::{AppError, AppResult},
};

/// Transport used for one outbound call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// Plain connection to the provider
    Direct,
    /// HTTP and HTTPS traffic tunnelled through a SOCKS relay
    Socks { proxy_url: String },
}

impl Transport {
    /// Pick the transport for the current configuration
    pub fn select(config: &Config) -> Self {
        match config.socks_host.as_deref() {
            Some(host) => Transport::Socks {
                proxy_url: socks_url(host),
            },
            None => Transport::Direct,
        }
    }

    /// Whether TLS certificate verification is disabled on this transport.
    ///
    /// Only the SOCKS tunnel relaxes verification.
    pub fn accepts_invalid_certs(&self) -> bool {
        matches!(self, Transport::Socks { .. })
    }

    /// Build a client for a single call
    pub fn build_client(&self) -> AppResult<Client> {
        let builder = match self {
            Transport::Direct => Client::builder(),
            Transport::Socks { proxy_url } => {
                debug!("Routing upstream call through SOCKS relay");
                let proxy = Proxy::all(proxy_url.as_str()).map_err(|e| {
                    AppError::InternalFailure(format!("Invalid SOCKS proxy: {}", e))
                })?;
                Client::builder().proxy(proxy)
            }
        };

        // Upload phases answer 308 without a redirect target; never follow
        builder
            .redirect(Policy::none())
            .danger_accept_invalid_certs(self.accepts_invalid_certs())
            .build()
            .map_err(|e| AppError::InternalFailure(format!("Failed to build HTTP client: {}", e)))
    }
}

/// Normalize a configured SOCKS host into a proxy URL
fn socks_url(host: &str) -> String {
    let host = host.trim();
    if host.contains("://") {
        host.to_string()
    } else {
        format!("socks5://{}", host)
    }
}
