//! OpenTelemetry observability infrastructure.
//!
//! Provides:
//! - A resource descriptor shared by all signals
//! - A batching OTLP trace pipeline
//! - A Prometheus-scraped metric pipeline
//! - The telemetry registry tying both together
//! - HTTP endpoints for Prometheus scraping
//! - Process logging

pub mod logging;
pub mod metrics;
pub mod prometheus;
pub mod registry;
pub mod resource;
pub mod traces;

use std::time::Duration;

use crate::error::{Error, Result};

/// Run a blocking SDK flush/shutdown call on the blocking pool, giving up
/// after `deadline`.
///
/// On timeout the call keeps running in the background and whatever it has
/// not exported yet is abandoned.
pub(crate) async fn run_with_deadline<F>(what: &'static str, deadline: Duration, f: F) -> Result<()>
where
    F: FnOnce() -> std::result::Result<(), String> + Send + 'static,
{
    match tokio::time::timeout(deadline, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(Ok(()))) => Ok(()),
        Ok(Ok(Err(e))) => Err(Error::ShutdownFlush(format!("{what}: {e}"))),
        Ok(Err(e)) => Err(Error::ShutdownFlush(format!("{what} task failed: {e}"))),
        Err(_) => Err(Error::ShutdownFlush(format!(
            "{what} did not finish within {deadline:?}"
        ))),
    }
}
