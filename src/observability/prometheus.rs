//! Prometheus HTTP endpoint for metrics scraping.
//!
//! Provides:
//! - `/metrics` - Prometheus metrics endpoint
//! - `/health` - Basic health check
//! - `/ready` - Readiness check

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};

use super::metrics::MetricsEndpoint;

/// Prometheus route state.
#[derive(Clone)]
pub struct PrometheusState {
    endpoint: MetricsEndpoint,
}

impl PrometheusState {
    /// Create the state serving the given metric pipeline.
    pub fn new(endpoint: MetricsEndpoint) -> Self {
        Self { endpoint }
    }
}

/// Create the Prometheus HTTP router.
pub fn create_router(state: PrometheusState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .with_state(state)
}

/// Handle GET /metrics - Prometheus metrics endpoint.
async fn metrics_handler(State(state): State<PrometheusState>) -> impl IntoResponse {
    if state.endpoint.is_closed() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            [("content-type", "text/plain; charset=utf-8")],
            b"metrics pipeline is shut down".to_vec(),
        );
    }

    match state.endpoint.encode() {
        Ok(buffer) => (
            StatusCode::OK,
            [("content-type", state.endpoint.content_type())],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain; charset=utf-8")],
                format!("Failed to encode metrics: {e}").into_bytes(),
            )
        }
    }
}

/// Handle GET /health - Basic health check.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Handle GET /ready - Readiness check.
async fn ready_handler(State(state): State<PrometheusState>) -> impl IntoResponse {
    if state.endpoint.is_closed() {
        (StatusCode::SERVICE_UNAVAILABLE, "SHUTTING DOWN")
    } else {
        (StatusCode::OK, "READY")
    }
}
