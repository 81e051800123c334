//! Error taxonomy shared by startup, request handling and shutdown.
//!
//! - `Configuration` and `ExporterInit` only occur at startup and are fatal.
//! - `DownstreamCall` is contained to a single request.
//! - `ShutdownFlush` is logged by the registry and never propagated further.

use thiserror::Error;

/// Errors produced by the pingpong services.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid configuration, or an irreconcilable resource merge.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A telemetry exporter or provider could not be constructed.
    #[error("exporter initialization error: {0}")]
    ExporterInit(String),

    /// The downstream collaborator failed or could not be reached.
    #[error("downstream call failed: {0}")]
    DownstreamCall(String),

    /// Buffered telemetry could not be flushed before the deadline.
    #[error("shutdown flush error: {0}")]
    ShutdownFlush(String),

    /// Socket bind or serve failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
