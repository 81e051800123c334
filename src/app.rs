//! Process entry point shared by the `ping` and `pong` binaries.
//!
//! Startup order: configuration, logging, telemetry, HTTP server. Telemetry
//! is shut down after the server stops, within the configured deadline.

use tokio::sync::watch;

use crate::config::{Config, ServiceKind, ServiceSettings};
use crate::observability::logging::init_logging;
use crate::observability::registry::TelemetryRegistry;
use crate::server::run_server;

/// Print startup banner with version and configuration.
fn print_banner(settings: &ServiceSettings) {
    let version = env!("CARGO_PKG_VERSION");
    let downstream = settings
        .downstream_url
        .as_ref()
        .map_or_else(|| "-".to_string(), |url| url.to_string());

    eprintln!(
        r#"
  {} v{} - instrumented {} service

  Configuration:
    Address:      {}
    Downstream:   {}
    Traces:       {} ({:?})
    Environment:  {}

  Press Ctrl+C to shutdown gracefully.
"#,
        settings.kind.service_name(),
        version,
        settings.kind.name(),
        settings.bind_addr,
        downstream,
        settings.trace.endpoint,
        settings.trace.protocol,
        settings.environment,
    );
}

/// Run one service until SIGINT/SIGTERM.
///
/// Startup errors abort before anything is served.
pub async fn run(kind: ServiceKind) -> anyhow::Result<()> {
    // Parse configuration from CLI arguments and environment
    let config = Config::parse_args();

    init_logging(kind.name(), &config.log_level, config.log_format)?;

    let settings = config.validate(kind)?;
    print_banner(&settings);

    let telemetry = TelemetryRegistry::init(
        kind.service_name(),
        &settings.environment,
        &settings.trace,
    )?;

    // Create shutdown signal channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let served = run_server(&settings, &telemetry, shutdown_rx).await;

    // Flush telemetry even when the server failed.
    telemetry.shutdown(settings.shutdown_timeout).await;

    served?;
    tracing::info!(service = kind.name(), "Shutdown complete");
    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {
                        tracing::info!("Received SIGINT (Ctrl+C), initiating shutdown...");
                    }
                    _ = sigterm.recv() => {
                        tracing::info!("Received SIGTERM, initiating shutdown...");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler, waiting for Ctrl+C only");
                if let Err(e) = ctrl_c.await {
                    tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = ctrl_c.await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
        tracing::info!("Received Ctrl+C, initiating shutdown...");
    }
}
