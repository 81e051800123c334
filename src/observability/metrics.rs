//! Metric pipeline: meter provider read by a Prometheus pull exporter.
//!
//! Key metrics (per instrumented endpoint):
//! - request_count: Counter of handled requests
//! - duration: Histogram of end-to-end handling time in milliseconds

use opentelemetry::metrics::{Counter, Histogram, Meter, MeterProvider as _};
use opentelemetry::{InstrumentationScope, KeyValue};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::resource::ResourceDescriptor;
use super::run_with_deadline;
use crate::error::{Error, Result};

/// Counter incremented once per handled request.
pub const REQUEST_COUNT: &str = "request_count";
/// Histogram receiving one observation per handled request.
pub const DURATION: &str = "duration";

/// Instruments recorded by a request handler.
///
/// Created once per endpoint; recording is safe from concurrent requests.
#[derive(Clone)]
pub struct RequestInstruments {
    /// Total number of handled requests.
    pub request_count: Counter<u64>,
    /// End-to-end handling time in milliseconds.
    pub duration: Histogram<f64>,
}

impl RequestInstruments {
    /// Create the instruments from a meter.
    pub fn new(meter: &Meter) -> Self {
        Self {
            request_count: meter
                .u64_counter(REQUEST_COUNT)
                .with_description("Incoming request count")
                .with_unit("request")
                .build(),
            duration: meter
                .f64_histogram(DURATION)
                .with_description("Incoming end to end duration")
                .with_unit("ms")
                .build(),
        }
    }

    /// Record one completed request.
    ///
    /// The counter and the histogram receive the same attribute set.
    pub fn record(&self, elapsed: Duration, attributes: &[KeyValue]) {
        self.request_count.add(1, attributes);
        self.duration.record(duration_millis(elapsed), attributes);
    }
}

/// Convert a duration to fractional milliseconds.
pub fn duration_millis(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}

/// Owns the meter provider and the Prometheus registry it is scraped through.
pub struct MetricPipeline {
    provider: SdkMeterProvider,
    registry: Registry,
    closed: Arc<AtomicBool>,
}

impl MetricPipeline {
    /// Build a pipeline backed by a private Prometheus registry.
    pub fn create(resource: &ResourceDescriptor) -> Result<Self> {
        let registry = Registry::new();

        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .without_units()
            .build()
            .map_err(|e| Error::ExporterInit(format!("Prometheus exporter: {e}")))?;

        let provider = SdkMeterProvider::builder()
            .with_resource(resource.inner().clone())
            .with_reader(exporter)
            .build();

        tracing::info!("Prometheus metrics exporter configured");
        Ok(Self {
            provider,
            registry,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Get a meter for the named, versioned instrumentation scope.
    pub fn meter(&self, name: &str, version: &str) -> Meter {
        let scope = InstrumentationScope::builder(name.to_string())
            .with_version(version.to_string())
            .build();
        self.provider.meter_with_scope(scope)
    }

    /// View used by the `/metrics` route.
    pub fn scrape_endpoint(&self) -> MetricsEndpoint {
        MetricsEndpoint {
            registry: self.registry.clone(),
            closed: Arc::clone(&self.closed),
        }
    }

    /// Stop serving scrapes and shut down the meter provider.
    ///
    /// Only the first call does any work; later calls return `Ok(())`.
    pub async fn shutdown(&self, deadline: Duration) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("Metric pipeline already shut down");
            return Ok(());
        }

        let provider = self.provider.clone();
        run_with_deadline("metric shutdown", deadline, move || {
            provider.shutdown().map_err(|e| e.to_string())
        })
        .await
    }
}

/// Pull side of the metric pipeline.
#[derive(Clone)]
pub struct MetricsEndpoint {
    registry: Registry,
    closed: Arc<AtomicBool>,
}

impl MetricsEndpoint {
    /// Whether the pipeline has been shut down.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Gather every metric family and encode it in the Prometheus text format.
    pub fn encode(&self) -> std::result::Result<Vec<u8>, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }

    /// Content type of [`MetricsEndpoint::encode`] output.
    pub fn content_type(&self) -> &'static str {
        "text/plain; version=0.0.4; charset=utf-8"
    }
}
