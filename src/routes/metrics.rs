//! Prometheus metrics endpoint
//!
//! Exposes application metrics in Prometheus format for monitoring.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::warn;

/// Global Prometheus handle for metrics export
static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize metrics (call once at startup)
pub fn init_metrics() {
    let installed = PROMETHEUS_HANDLE.get_or_try_init(|| PrometheusBuilder::new().install_recorder());
    if let Err(e) = installed {
        warn!(error = %e, "Failed to install Prometheus recorder, metrics disabled");
        return;
    }

    register_metrics();
}

/// Register all custom metrics
fn register_metrics() {
    metrics::describe_counter!(
        "relaygate_requests_total",
        "Total number of requests relayed, by provider, route and status"
    );
    metrics::describe_histogram!(
        "relaygate_request_duration_seconds",
        "Request duration in seconds"
    );
    metrics::describe_counter!(
        "relaygate_upload_chunks_total",
        "Upload protocol calls relayed, by command and upstream status"
    );
    metrics::describe_counter!(
        "relaygate_stream_frames_total",
        "Frames emitted by the framed stream relay"
    );
}

/// Prometheus metrics endpoint handler
pub async fn prometheus_metrics() -> impl IntoResponse {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::SERVICE_UNAVAILABLE, String::new()),
    }
}

/// Record a relayed request
pub fn record_request(provider: &str, route: &str, status: StatusCode, duration_secs: f64) {
    metrics::counter!(
        "relaygate_requests_total",
        "provider" => provider.to_string(),
        "route" => route.to_string(),
        "status" => status.as_u16().to_string()
    )
    .increment(1);
    metrics::histogram!(
        "relaygate_request_duration_seconds",
        "provider" => provider.to_string(),
        "route" => route.to_string()
    )
    .record(duration_secs);
}

/// Record one upload protocol call (`init`, `upload`, `upload, finalize`)
pub fn record_upload_call(command: &str, status: StatusCode) {
    metrics::counter!(
        "relaygate_upload_chunks_total",
        "command" => command.to_string(),
        "status" => status.as_u16().to_string()
    )
    .increment(1);
}

/// Record the frames a framed relay emitted before it ended
pub fn record_stream_frames(outcome: &str, frames: u64) {
    metrics::counter!("relaygate_stream_frames_total", "outcome" => outcome.to_string())
        .increment(frames);
}
