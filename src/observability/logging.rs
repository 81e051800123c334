//! Process logging setup.
//!
//! Configures structured logging with:
//! - Environment-based filter (via RUST_LOG), falling back to the given level
//! - Human-readable or JSON output

use clap::ValueEnum;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::error::{Error, Result};

/// Output format for process logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Initialize logging for a service.
///
/// This sets up:
/// - Console logging with target, thread ids, file and line
/// - A filter from `RUST_LOG`, or `level` when unset
///
/// # Errors
///
/// Returns [`Error::Configuration`] if the filter is invalid or logging was
/// already initialized.
pub fn init_logging(service_name: &str, level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| Error::Configuration(format!("invalid log filter {level:?}: {e}")))?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let fmt_layer = match format {
        LogFormat::Text => fmt_layer.boxed(),
        LogFormat::Json => fmt_layer.json().boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| Error::Configuration(format!("logging already initialized: {e}")))?;

    tracing::info!(service = service_name, "Logging initialized");
    Ok(())
}

/// Initialize logging for tests (only logs errors).
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("error")
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_test_logging_is_repeatable() {
        init_test_logging();
        init_test_logging();
    }

    #[test]
    fn test_second_init_is_reported() {
        init_test_logging();
        // A global subscriber is already installed at this point.
        let result = init_logging("pong", "info", LogFormat::Text);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
