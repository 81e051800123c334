//! Pingpong: two HTTP services, ping calling pong, instrumented with
//! OpenTelemetry tracing and Prometheus metrics.
//!
//! Every request to `/ping` or `/pong` gets one root span, one counter
//! increment and one latency observation, whatever the downstream outcome.
//!
//! # Architecture
//!
//! - **Explicit telemetry registry**: no global providers; built once at startup
//! - **Batched span export**: OTLP push, never on the request path
//! - **Pull metrics**: Prometheus scrape on `/metrics`
//! - **Bounded shutdown**: pipelines are flushed within a deadline
//!
//! # Modules
//!
//! - [`app`]: Process startup and shutdown sequence
//! - [`config`]: CLI and environment configuration
//! - [`error`]: Error taxonomy
//! - [`observability`]: Resource, trace/metric pipelines, registry, logging
//! - [`server`]: HTTP router and server lifecycle
//! - [`service`]: Request instrumentation handler and downstream client

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions,    // observability::metrics::MetricPipeline is fine
    clippy::must_use_candidate,         // Not all functions need #[must_use]
    clippy::missing_errors_doc,         // Error docs can be verbose
    clippy::missing_panics_doc          // Panic docs can be verbose
)]

pub mod app;
pub mod config;
pub mod error;
pub mod observability;
pub mod server;
pub mod service;

pub use error::{Error, Result};
