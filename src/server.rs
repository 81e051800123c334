//! HTTP server setup and lifecycle.
//!
//! Configures the axum router with:
//! - The instrumented `/ping` or `/pong` endpoint
//! - Prometheus `/metrics`, `/health` and `/ready`
//! - Graceful shutdown support

use axum::{
    extract::{ConnectInfo, State},
    http::{header::USER_AGENT, HeaderMap},
    routing::get,
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use crate::config::ServiceSettings;
use crate::error::Result;
use crate::observability::metrics::MetricsEndpoint;
use crate::observability::prometheus::{self, PrometheusState};
use crate::observability::registry::TelemetryRegistry;
use crate::service::{Downstream, EndpointSpec, HttpDownstream, RequestHandler, RequestMeta};

/// Create the service router.
///
/// `route` is served by `handler`; the Prometheus routes read `metrics`.
pub fn create_router(route: &str, handler: Arc<RequestHandler>, metrics: MetricsEndpoint) -> Router {
    Router::new()
        .route(route, get(instrumented_handler))
        .with_state(handler)
        .merge(prometheus::create_router(PrometheusState::new(metrics)))
        .layer(TraceLayer::new_for_http())
}

/// Handle GET on the instrumented endpoint.
async fn instrumented_handler(
    State(handler): State<Arc<RequestHandler>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> String {
    let user_agent = headers.get(USER_AGENT).and_then(|v| v.to_str().ok());
    handler.handle(RequestMeta::new(Some(remote), user_agent)).await
}

/// Build the request handler for the configured service.
pub fn build_handler(settings: &ServiceSettings, telemetry: &TelemetryRegistry) -> Result<RequestHandler> {
    let downstream = match &settings.downstream_url {
        Some(url) => {
            let client = HttpDownstream::new(url.clone(), settings.downstream_timeout)?;
            tracing::info!(url = %client.url(), timeout = ?settings.downstream_timeout, "Downstream configured");
            Some(Arc::new(client) as Arc<dyn Downstream>)
        }
        None => None,
    };

    Ok(RequestHandler::new(
        telemetry,
        EndpointSpec::for_service(settings.kind, &settings.environment),
        downstream,
    ))
}

/// Serve `app` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    Ok(())
}

/// Run the service HTTP server.
///
/// # Arguments
///
/// * `settings` - Validated service settings
/// * `telemetry` - Initialized telemetry registry
/// * `shutdown_rx` - Receiver for shutdown signal
///
/// # Returns
///
/// Returns when the server has shut down. Telemetry is left running; the
/// caller shuts it down.
pub async fn run_server(
    settings: &ServiceSettings,
    telemetry: &TelemetryRegistry,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    let handler = Arc::new(build_handler(settings, telemetry)?);
    let app = create_router(
        settings.kind.route(),
        handler,
        telemetry.metrics().scrape_endpoint(),
    );

    let listener = TcpListener::bind(settings.bind_addr).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        route = settings.kind.route(),
        "Starting HTTP server"
    );

    serve(listener, app, async move {
        // Wait for shutdown signal
        let _ = shutdown_rx.changed().await;
        tracing::info!("Shutdown signal received, stopping server");
    })
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}
