//! Configuration parsing for the ping and pong services.
//!
//! Supports:
//! - CLI arguments via clap
//! - Environment variable fallbacks (`ADDRESS`, `PONG_ENDPOINT`, `JAEGER_ADDRESS`)
//! - Startup validation into [`ServiceSettings`]

use clap::{Parser, ValueEnum};
use reqwest::Url;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::observability::logging::LogFormat;
use crate::observability::traces::{TraceProtocol, TraceSettings};

/// Which of the two services a process runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ServiceKind {
    Ping,
    Pong,
}

impl ServiceKind {
    /// Lowercase name used for routes, span names and meters.
    pub fn name(self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Pong => "pong",
        }
    }

    /// Value reported as `service.name`.
    pub fn service_name(self) -> &'static str {
        match self {
            Self::Ping => "Ping",
            Self::Pong => "Pong",
        }
    }

    /// Path of the instrumented endpoint.
    pub fn route(self) -> &'static str {
        match self {
            Self::Ping => "/ping",
            Self::Pong => "/pong",
        }
    }

    /// Body returned when the request succeeds.
    pub fn success_body(self) -> &'static str {
        match self {
            Self::Ping => "ok",
            Self::Pong => "pong",
        }
    }
}

/// Instrumented ping/pong HTTP service.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Address to listen on (`host:port` or `:port`)
    #[arg(long, env = "ADDRESS", default_value = "0.0.0.0:8080")]
    pub address: String,

    /// Address of the pong service (`host:port`), required by ping
    #[arg(long, env = "PONG_ENDPOINT")]
    pub pong_endpoint: Option<String>,

    /// OTLP collector address for span export
    #[arg(long, env = "JAEGER_ADDRESS")]
    pub trace_endpoint: Option<String>,

    /// OTLP transport used for span export
    #[arg(long, env = "TRACE_PROTOCOL", value_enum, default_value_t = TraceProtocol::Http)]
    pub trace_protocol: TraceProtocol,

    /// Value of the `environment` span attribute
    #[arg(long, env = "DEPLOY_ENVIRONMENT", default_value = "staging")]
    pub environment: String,

    /// Interval between span batch exports, in milliseconds
    #[arg(long, default_value_t = 2000)]
    pub batch_timeout_ms: u64,

    /// Deadline for a single downstream call, in milliseconds
    #[arg(long, default_value_t = 5000)]
    pub downstream_timeout_ms: u64,

    /// Deadline for flushing telemetry at shutdown, in milliseconds
    #[arg(long, default_value_t = 5000)]
    pub shutdown_timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Validated settings for one service process.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub kind: ServiceKind,
    pub bind_addr: SocketAddr,
    /// Full URL of the downstream endpoint (ping only).
    pub downstream_url: Option<Url>,
    pub downstream_timeout: Duration,
    pub environment: String,
    pub trace: TraceSettings,
    pub shutdown_timeout: Duration,
}

impl Config {
    /// Parse configuration from CLI arguments and environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the raw configuration for the given service.
    ///
    /// Fails fast with [`Error::Configuration`] so that no request ever sees
    /// a half-configured process.
    pub fn validate(&self, kind: ServiceKind) -> Result<ServiceSettings> {
        let bind_addr = parse_bind_addr(&self.address)?;

        let downstream_url = match kind {
            ServiceKind::Ping => {
                let endpoint = self
                    .pong_endpoint
                    .as_deref()
                    .map(str::trim)
                    .filter(|e| !e.is_empty())
                    .ok_or_else(|| {
                        Error::Configuration("PONG_ENDPOINT is required for ping".into())
                    })?;
                Some(downstream_url(endpoint, ServiceKind::Pong.route())?)
            }
            ServiceKind::Pong => None,
        };

        let trace_endpoint = self
            .trace_endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| Error::Configuration("JAEGER_ADDRESS is required".into()))?;

        if self.environment.trim().is_empty() {
            return Err(Error::Configuration("environment cannot be empty".into()));
        }

        let batch_timeout = non_zero_millis("batch-timeout-ms", self.batch_timeout_ms)?;
        let downstream_timeout =
            non_zero_millis("downstream-timeout-ms", self.downstream_timeout_ms)?;
        let shutdown_timeout = non_zero_millis("shutdown-timeout-ms", self.shutdown_timeout_ms)?;

        Ok(ServiceSettings {
            kind,
            bind_addr,
            downstream_url,
            downstream_timeout,
            environment: self.environment.clone(),
            trace: TraceSettings {
                endpoint: trace_endpoint.to_string(),
                protocol: self.trace_protocol,
                batch_timeout,
                ..TraceSettings::default()
            },
            shutdown_timeout,
        })
    }

    /// Create a configuration for testing.
    #[cfg(test)]
    pub fn test_config() -> Self {
        Self {
            address: "127.0.0.1:0".into(),
            pong_endpoint: Some("127.0.0.1:8081".into()),
            trace_endpoint: Some("127.0.0.1:4318".into()),
            trace_protocol: TraceProtocol::Http,
            environment: "test".into(),
            batch_timeout_ms: 100,
            downstream_timeout_ms: 1000,
            shutdown_timeout_ms: 1000,
            log_level: "debug".into(),
            log_format: LogFormat::Text,
        }
    }
}

/// Resolve a listen address, accepting the `:port` shorthand for all
/// interfaces. Hostnames are resolved and the first address is used.
fn parse_bind_addr(address: &str) -> Result<SocketAddr> {
    let address = address.trim();
    let full = if address.starts_with(':') {
        format!("0.0.0.0{address}")
    } else {
        address.to_string()
    };

    full.to_socket_addrs()
        .map_err(|e| Error::Configuration(format!("invalid ADDRESS {address:?}: {e}")))?
        .next()
        .ok_or_else(|| Error::Configuration(format!("ADDRESS {address:?} resolved to nothing")))
}

/// Convert a millisecond option to a duration, rejecting zero.
fn non_zero_millis(option: &str, millis: u64) -> Result<Duration> {
    if millis == 0 {
        return Err(Error::Configuration(format!("--{option} must be greater than zero")));
    }
    Ok(Duration::from_millis(millis))
}

/// Build the URL for `route` on a `host:port` (or full URL) endpoint.
fn downstream_url(endpoint: &str, route: &str) -> Result<Url> {
    let base = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    };

    let base = Url::parse(&base)
        .map_err(|e| Error::Configuration(format!("invalid PONG_ENDPOINT {endpoint:?}: {e}")))?;
    if base.host_str().is_none() {
        return Err(Error::Configuration(format!(
            "PONG_ENDPOINT {endpoint:?} has no host"
        )));
    }

    base.join(route)
        .map_err(|e| Error::Configuration(format!("invalid PONG_ENDPOINT {endpoint:?}: {e}")))
}
