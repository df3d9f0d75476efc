//! HTTP routes for Relaygate
//!
//! This module defines all HTTP endpoints exposed by the gateway.

pub mod anthropic;
pub mod bedrock;
pub mod events;
pub mod forward;
pub mod google;
pub mod health;
pub mod metrics;
pub mod openai;
pub mod xai;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::AppState;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let openai_routes = Router::new()
        .route("/v1/chat/completions", post(openai::chat_completions))
        .route("/v1/embeddings", post(openai::embeddings))
        .route("/v1/audio/transcriptions", post(openai::transcriptions))
        .route("/v1/images/generations", post(openai::image_generations))
        .route("/v1/images/edits", post(openai::image_edits))
        .route("/v1/files", post(openai::files))
        .route(
            "/openai/v1/chat/stream-completions",
            post(events::openai_stream_completions),
        );

    let anthropic_routes = Router::new()
        .route("/anthropic/v1/messages", post(anthropic::messages))
        .route(
            "/anthropic/v1/messages/count_tokens",
            post(anthropic::count_tokens),
        )
        .route(
            "/anthropic/v1/chat/stream-completions",
            post(events::anthropic_stream_completions),
        );

    let xai_routes = Router::new()
        .route("/xai/v1/chat/completions", post(xai::chat_completions))
        .route("/xai/v1/embeddings", post(xai::embeddings))
        .route("/xai/v1/audio/transcriptions", post(xai::transcriptions))
        .route(
            "/xai/v1/chat/stream-completions",
            post(events::xai_stream_completions),
        );

    let bedrock_routes = Router::new()
        .route("/bedrock/v1/chat/completions", post(bedrock::chat_completions))
        .route(
            "/bedrock/v1/chat/stream-completions",
            post(bedrock::stream_completions),
        );

    // Model actions contain a `:` inside the last segment, so the whole tail is
    // captured and dispatched in the handler
    let google_routes = Router::new()
        .route("/google/upload/v1beta/files", post(google::upload_init))
        .route("/google/upload/v1beta/files/*path", post(google::upload_data))
        .route(
            "/google/v1beta/*path",
            get(google::metadata).post(google::models_action),
        );

    // Public routes (health checks, metrics)
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/live", get(health::liveness_check))
        .route("/metrics", get(metrics::prometheus_metrics));

    let body_limit = DefaultBodyLimit::max(state.config.max_body_bytes);

    Router::new()
        .merge(public_routes)
        .merge(openai_routes)
        .merge(anthropic_routes)
        .merge(xai_routes)
        .merge(bedrock_routes)
        .merge(google_routes)
        // Global middleware (applied to all routes)
        .layer(body_limit)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
