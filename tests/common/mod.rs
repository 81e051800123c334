//! Test utilities for pingpong tests.
//!
//! Provides:
//! - A span exporter that records everything it is given
//! - An isolated telemetry registry per test
//! - Scripted downstream collaborators
//! - Prometheus text helpers

#![allow(dead_code)]

use async_trait::async_trait;
use futures::future::BoxFuture;
use opentelemetry_sdk::export::trace::{ExportResult, SpanData, SpanExporter};
use pingpong::observability::metrics::MetricPipeline;
use pingpong::observability::registry::TelemetryRegistry;
use pingpong::observability::resource::ResourceDescriptor;
use pingpong::observability::traces::{TracePipeline, TraceSettings};
use pingpong::service::Downstream;
use pingpong::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Span exporter keeping every exported span in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingExporter {
    spans: Arc<Mutex<Vec<SpanData>>>,
}

impl RecordingExporter {
    pub fn spans(&self) -> Vec<SpanData> {
        self.spans.lock().unwrap().clone()
    }
}

impl SpanExporter for RecordingExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        self.spans.lock().unwrap().extend(batch);
        Box::pin(std::future::ready(Ok(())))
    }
}

/// Isolated telemetry registry whose spans land in a [`RecordingExporter`].
pub struct TestTelemetry {
    pub registry: TelemetryRegistry,
    pub exporter: RecordingExporter,
}

impl TestTelemetry {
    /// Must be called from within a tokio runtime.
    pub fn new(service_name: &str) -> Self {
        // Long enough that only explicit flushes export during a test.
        Self::with_batch_timeout(service_name, Duration::from_secs(60))
    }

    /// Registry whose batch processor exports every `batch_timeout`.
    pub fn with_batch_timeout(service_name: &str, batch_timeout: Duration) -> Self {
        let resource = ResourceDescriptor::build(service_name, "v0.0.1", vec![])
            .expect("failed to build resource");
        let exporter = RecordingExporter::default();

        let settings = TraceSettings {
            batch_timeout,
            ..TraceSettings::default()
        };
        let traces = TracePipeline::with_exporter(exporter.clone(), &settings, &resource);
        let metrics = MetricPipeline::create(&resource).expect("failed to create metric pipeline");

        Self {
            registry: TelemetryRegistry::from_parts(resource, traces, metrics),
            exporter,
        }
    }

    /// Flush the trace pipeline and return everything exported so far.
    pub async fn flushed_spans(&self) -> Vec<SpanData> {
        self.registry
            .traces()
            .force_flush(Duration::from_secs(5))
            .await
            .expect("trace flush failed");
        self.exporter.spans()
    }

    /// Current Prometheus text exposition.
    pub fn scrape(&self) -> String {
        let bytes = self
            .registry
            .metrics()
            .scrape_endpoint()
            .encode()
            .expect("failed to encode metrics");
        String::from_utf8(bytes).expect("metrics are not UTF-8")
    }

    pub async fn shutdown(&self) {
        self.registry.shutdown(Duration::from_secs(5)).await;
    }
}

/// Downstream with a scripted outcome and optional latency.
#[derive(Debug, Default)]
pub struct ScriptedDownstream {
    failure: Option<String>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedDownstream {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Downstream for ScriptedDownstream {
    async fn call(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.failure {
            Some(message) => Err(Error::DownstreamCall(message.clone())),
            None => Ok(()),
        }
    }
}

/// Downstream that panics mid-request.
pub struct PanickingDownstream;

#[async_trait]
impl Downstream for PanickingDownstream {
    async fn call(&self) -> Result<()> {
        panic!("downstream exploded");
    }
}

/// Sample lines (not comments) of the metric family `name`.
pub fn samples<'a>(text: &'a str, name: &str) -> Vec<&'a str> {
    text.lines()
        .filter(|line| !line.starts_with('#'))
        .filter(|line| {
            line.strip_prefix(name)
                .is_some_and(|rest| rest.starts_with('{') || rest.starts_with(' '))
        })
        .collect()
}

/// Value of the single `name` sample whose labels contain `label`.
pub fn sample_value(text: &str, name: &str, label: &str) -> Option<f64> {
    samples(text, name)
        .into_iter()
        .find(|line| line.contains(label))
        .and_then(|line| line.rsplit(' ').next())
        .and_then(|value| value.parse().ok())
}

/// Label set (`{...}`) of the first `name` sample containing `label`.
pub fn sample_labels<'a>(text: &'a str, name: &str, label: &str) -> Option<&'a str> {
    let line = samples(text, name).into_iter().find(|line| line.contains(label))?;
    let start = line.find('{')?;
    let end = line.rfind('}')?;
    Some(&line[start..=end])
}

/// Wait for a condition to become true with timeout.
///
/// # Arguments
///
/// * `timeout` - Maximum time to wait
/// * `condition` - Closure that returns true when condition is met
///
/// # Returns
///
/// `true` if condition was met, `false` if timeout expired
pub async fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
