//! Trace pipeline: OTLP span exporter behind a batching processor.
//!
//! Spans are buffered by the processor and exported on the batch interval or
//! on an explicit flush, so the request path never waits on exporter I/O.

use clap::ValueEnum;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::{Protocol, WithExportConfig};
use opentelemetry_sdk::export::trace::SpanExporter;
use opentelemetry_sdk::runtime;
use opentelemetry_sdk::trace::{BatchConfigBuilder, BatchSpanProcessor, Tracer, TracerProvider};
use reqwest::Url;
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::resource::ResourceDescriptor;
use super::run_with_deadline;
use crate::error::{Error, Result};

/// Path appended to bare OTLP/HTTP endpoints.
const OTLP_HTTP_TRACES_PATH: &str = "/v1/traces";

/// OTLP transport for span export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TraceProtocol {
    /// OTLP over HTTP with protobuf payloads.
    Http,
    /// OTLP over gRPC.
    Grpc,
}

/// Settings for the trace pipeline.
#[derive(Debug, Clone)]
pub struct TraceSettings {
    /// Collector address, either `host:port` or a full `http://` URL.
    pub endpoint: String,
    pub protocol: TraceProtocol,
    /// Maximum time a finished span waits in the buffer before export.
    pub batch_timeout: Duration,
    /// Deadline for a single export call.
    pub export_timeout: Duration,
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            endpoint: "localhost:4318".into(),
            protocol: TraceProtocol::Http,
            batch_timeout: Duration::from_secs(2),
            export_timeout: Duration::from_secs(10),
        }
    }
}

/// Owns the span exporter, batching processor and tracer provider.
pub struct TracePipeline {
    provider: TracerProvider,
    shut_down: AtomicBool,
}

impl TracePipeline {
    /// Build a pipeline exporting to the configured OTLP collector.
    ///
    /// The transport is insecure and uncompressed.
    pub fn create(settings: &TraceSettings, resource: &ResourceDescriptor) -> Result<Self> {
        // The batch worker cannot tick on a zero interval.
        if settings.batch_timeout.is_zero() {
            return Err(Error::Configuration("batch timeout must be greater than zero".into()));
        }
        let endpoint = collector_url(&settings.endpoint, settings.protocol)?;

        let exporter = match settings.protocol {
            TraceProtocol::Http => opentelemetry_otlp::SpanExporter::builder()
                .with_http()
                .with_endpoint(endpoint.as_str())
                .with_protocol(Protocol::HttpBinary)
                .with_timeout(settings.export_timeout)
                .build(),
            TraceProtocol::Grpc => opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint.as_str())
                .with_protocol(Protocol::Grpc)
                .with_timeout(settings.export_timeout)
                .build(),
        }
        .map_err(|e| Error::ExporterInit(format!("OTLP span exporter for {endpoint}: {e}")))?;

        tracing::info!(endpoint = %endpoint, protocol = ?settings.protocol, "OTLP span exporter configured");
        Ok(Self::with_exporter(exporter, settings, resource))
    }

    /// Build a pipeline around an arbitrary span exporter.
    ///
    /// `settings.batch_timeout` must be non-zero.
    pub fn with_exporter<E>(exporter: E, settings: &TraceSettings, resource: &ResourceDescriptor) -> Self
    where
        E: SpanExporter + 'static,
    {
        let batch_config = BatchConfigBuilder::default()
            .with_scheduled_delay(settings.batch_timeout)
            .with_max_export_timeout(settings.export_timeout)
            .build();

        let processor = BatchSpanProcessor::builder(exporter, runtime::Tokio)
            .with_batch_config(batch_config)
            .build();

        let provider = TracerProvider::builder()
            .with_span_processor(processor)
            .with_resource(resource.inner().clone())
            .build();

        Self {
            provider,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Get a tracer for the named instrumentation scope.
    pub fn tracer(&self, name: impl Into<Cow<'static, str>>) -> Tracer {
        self.provider.tracer(name)
    }

    /// Export every buffered span, waiting at most `deadline`.
    pub async fn force_flush(&self, deadline: Duration) -> Result<()> {
        let provider = self.provider.clone();
        run_with_deadline("trace flush", deadline, move || {
            provider
                .force_flush()
                .into_iter()
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
        .await
    }

    /// Flush buffered spans and release the exporter.
    ///
    /// Only the first call does any work; later calls return `Ok(())`.
    pub async fn shutdown(&self, deadline: Duration) -> Result<()> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            tracing::debug!("Trace pipeline already shut down");
            return Ok(());
        }

        let provider = self.provider.clone();
        run_with_deadline("trace shutdown", deadline, move || {
            provider.shutdown().map_err(|e| e.to_string())
        })
        .await
    }
}

/// Resolve the collector URL for `endpoint`.
///
/// Bare `host:port` values get an `http://` scheme; OTLP/HTTP endpoints
/// without a path get the standard traces path.
fn collector_url(endpoint: &str, protocol: TraceProtocol) -> Result<Url> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return Err(Error::Configuration("trace endpoint cannot be empty".into()));
    }

    let raw = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    };

    let mut url = Url::parse(&raw)
        .map_err(|e| Error::Configuration(format!("invalid trace endpoint {endpoint:?}: {e}")))?;
    if url.host_str().is_none() {
        return Err(Error::Configuration(format!(
            "trace endpoint {endpoint:?} has no host"
        )));
    }

    if protocol == TraceProtocol::Http && url.path() == "/" {
        url.set_path(OTLP_HTTP_TRACES_PATH);
    }
    Ok(url)
}
