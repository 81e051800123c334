//! Telemetry registry: the process-wide trace and metric pipelines.
//!
//! The registry is an explicitly constructed value rather than global state,
//! so each test can build an isolated instance.

use std::time::{Duration, Instant};

use super::metrics::MetricPipeline;
use super::resource::ResourceDescriptor;
use super::traces::{TracePipeline, TraceSettings};
use crate::error::Result;

/// Version reported by the service resource and instrumentation scopes.
pub const SERVICE_VERSION: &str = "v0.0.1";

/// Holds the active pipelines from startup until shutdown.
pub struct TelemetryRegistry {
    resource: ResourceDescriptor,
    traces: TracePipeline,
    metrics: MetricPipeline,
}

impl TelemetryRegistry {
    /// Build the resource, then the trace pipeline, then the metric pipeline.
    ///
    /// Any failure aborts startup; no partially initialized registry is
    /// returned.
    pub fn init(service_name: &str, environment: &str, trace: &TraceSettings) -> Result<Self> {
        let resource = ResourceDescriptor::build(
            service_name,
            SERVICE_VERSION,
            vec![("deployment.environment".to_string(), environment.to_string())],
        )?;
        let traces = TracePipeline::create(trace, &resource)?;
        let metrics = MetricPipeline::create(&resource)?;

        tracing::info!(service = service_name, "Telemetry initialized");
        Ok(Self::from_parts(resource, traces, metrics))
    }

    /// Assemble a registry from already built pipelines.
    pub fn from_parts(
        resource: ResourceDescriptor,
        traces: TracePipeline,
        metrics: MetricPipeline,
    ) -> Self {
        Self {
            resource,
            traces,
            metrics,
        }
    }

    pub fn resource(&self) -> &ResourceDescriptor {
        &self.resource
    }

    pub fn traces(&self) -> &TracePipeline {
        &self.traces
    }

    pub fn metrics(&self) -> &MetricPipeline {
        &self.metrics
    }

    /// Shut down both pipelines in reverse creation order.
    ///
    /// Both steps share `deadline`. Failures are logged and swallowed so a
    /// slow or unreachable backend cannot stall process exit.
    pub async fn shutdown(&self, deadline: Duration) {
        let started = Instant::now();

        if let Err(e) = self.metrics.shutdown(deadline).await {
            tracing::warn!(error = %e, "Metric pipeline shutdown failed");
        }

        let remaining = deadline.saturating_sub(started.elapsed());
        if let Err(e) = self.traces.shutdown(remaining).await {
            tracing::warn!(error = %e, "Trace pipeline shutdown failed");
        }

        tracing::info!("Telemetry shut down");
    }
}
