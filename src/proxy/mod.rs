//! Proxy module
//!
//! Handles request forwarding to upstream AI providers.

pub mod bedrock;
pub mod client;
pub mod headers;
pub mod normalize;
pub mod provider;
pub mod transport;

pub use client::{
    CallRole, Envelope, MultipartForm, Relay, RelayRequest, RelayResponse, RequestBody,
    UpstreamClient,
};
pub use bedrock::{BedrockClient, BedrockFrames, BedrockRequest};
pub use normalize::StreamingIntent;
pub use provider::{Provider, ProviderClient};
pub use transport::Transport;
