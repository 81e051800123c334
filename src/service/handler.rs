//! Per-request instrumentation.
//!
//! Every request goes through [`RequestHandler::handle`]:
//!
//! 1. Start a root span and capture the start time.
//! 2. Do the work, optionally calling a [`Downstream`].
//! 3. Record the counter and histogram, then end the span.
//!
//! Step 3 lives in `RequestScope`'s `Drop`, so it runs exactly once on
//! every exit path, including panics and cancelled futures.

use opentelemetry::trace::{Span as _, Status, Tracer as _};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::trace::{Span, Tracer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use super::downstream::Downstream;
use crate::config::ServiceKind;
use crate::observability::metrics::RequestInstruments;
use crate::observability::registry::{TelemetryRegistry, SERVICE_VERSION};

/// Longest user agent kept as a metric attribute.
pub const MAX_USER_AGENT_LEN: usize = 256;

pub const EVENT_START: &str = "Start request processing";
pub const EVENT_INVOKE: &str = "Invoke external endpoint";
pub const EVENT_SUCCESS: &str = "Response success";
pub const EVENT_ERROR: &str = "Response with error";
pub const EVENT_METRICS: &str = "Update metrics";

/// Static description of an instrumented endpoint.
#[derive(Debug, Clone)]
pub struct EndpointSpec {
    /// Name of the tracer and meter scope; the span is `<name>-request`.
    pub name: String,
    /// Value of the `environment` span attribute.
    pub environment: String,
    /// Body returned on success.
    pub success_body: String,
}

impl EndpointSpec {
    /// The endpoint served by `kind`.
    pub fn for_service(kind: ServiceKind, environment: &str) -> Self {
        Self {
            name: kind.name().to_string(),
            environment: environment.to_string(),
            success_body: kind.success_body().to_string(),
        }
    }
}

/// Request metadata the handler turns into metric attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMeta {
    /// Caller IP, without the ephemeral port.
    pub remote_addr: String,
    /// Caller user agent, truncated to [`MAX_USER_AGENT_LEN`] characters.
    pub user_agent: String,
}

impl RequestMeta {
    pub fn new(remote: Option<SocketAddr>, user_agent: Option<&str>) -> Self {
        Self {
            remote_addr: remote.map(|addr| addr.ip().to_string()).unwrap_or_default(),
            user_agent: user_agent
                .unwrap_or_default()
                .chars()
                .take(MAX_USER_AGENT_LEN)
                .collect(),
        }
    }

    /// Attribute set shared by the counter and the histogram.
    pub fn metric_attributes(&self) -> Vec<KeyValue> {
        vec![
            KeyValue::new("remoteAddr", self.remote_addr.clone()),
            KeyValue::new("userAgent", self.user_agent.clone()),
        ]
    }
}

/// Instrumented handler for one endpoint.
///
/// Tracer and instruments are obtained once at construction and shared by
/// all concurrent requests.
pub struct RequestHandler {
    span_name: String,
    environment: String,
    success_body: String,
    tracer: Tracer,
    instruments: RequestInstruments,
    downstream: Option<Arc<dyn Downstream>>,
}

impl RequestHandler {
    pub fn new(
        telemetry: &TelemetryRegistry,
        spec: EndpointSpec,
        downstream: Option<Arc<dyn Downstream>>,
    ) -> Self {
        let tracer = telemetry.traces().tracer(spec.name.clone());
        let meter = telemetry.metrics().meter(&spec.name, SERVICE_VERSION);

        Self {
            span_name: format!("{}-request", spec.name),
            environment: spec.environment,
            success_body: spec.success_body,
            tracer,
            instruments: RequestInstruments::new(&meter),
            downstream,
        }
    }

    /// Handle one request and return the response body.
    ///
    /// Downstream failures never escape: the error text becomes the body.
    /// A non-2xx downstream response counts as a failure.
    pub async fn handle(&self, meta: RequestMeta) -> String {
        let mut scope = RequestScope::start(self, meta);
        scope.event(EVENT_START);

        let Some(downstream) = &self.downstream else {
            scope.event(EVENT_SUCCESS);
            return self.success_body.clone();
        };

        scope.event(EVENT_INVOKE);
        match downstream.call().await {
            Ok(()) => {
                scope.event(EVENT_SUCCESS);
                self.success_body.clone()
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(endpoint = %self.span_name, error = %message, "Downstream call failed");
                scope.fail(&message);
                message
            }
        }
    }
}

/// Owns the span of one in-flight request.
///
/// Dropping the scope records the metrics and ends the span.
struct RequestScope<'a> {
    span: Span,
    started: Instant,
    meta: RequestMeta,
    instruments: &'a RequestInstruments,
}

impl<'a> RequestScope<'a> {
    fn start(handler: &'a RequestHandler, meta: RequestMeta) -> Self {
        // Always a new root: any incoming trace context is ignored.
        let mut span = handler
            .tracer
            .start_with_context(handler.span_name.clone(), &Context::new());
        span.set_attribute(KeyValue::new("environment", handler.environment.clone()));

        Self {
            span,
            started: Instant::now(),
            meta,
            instruments: &handler.instruments,
        }
    }

    fn event(&mut self, name: &'static str) {
        self.span.add_event(name, Vec::new());
    }

    fn fail(&mut self, message: &str) {
        self.span.add_event(
            EVENT_ERROR,
            vec![KeyValue::new("error.message", message.to_string())],
        );
        self.span.set_status(Status::error(message.to_string()));
    }
}

impl Drop for RequestScope<'_> {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed();
        let attributes = self.meta.metric_attributes();

        self.span.add_event(EVENT_METRICS, Vec::new());
        self.instruments.record(elapsed, &attributes);
        self.span.end();

        tracing::debug!(
            remote_addr = %self.meta.remote_addr,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "Request handled"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_strips_port() {
        let meta = RequestMeta::new(Some("10.0.0.7:53211".parse().unwrap()), Some("curl/8.0"));
        assert_eq!(meta.remote_addr, "10.0.0.7");
        assert_eq!(meta.user_agent, "curl/8.0");
    }

    #[test]
    fn test_meta_truncates_user_agent() {
        let long = "x".repeat(MAX_USER_AGENT_LEN + 50);
        let meta = RequestMeta::new(None, Some(&long));
        assert_eq!(meta.user_agent.chars().count(), MAX_USER_AGENT_LEN);
        assert_eq!(meta.remote_addr, "");
    }

    #[test]
    fn test_metric_attributes_keys() {
        let meta = RequestMeta::new(Some("127.0.0.1:1".parse().unwrap()), None);
        let keys: Vec<String> = meta
            .metric_attributes()
            .iter()
            .map(|kv| kv.key.to_string())
            .collect();
        assert_eq!(keys, vec!["remoteAddr", "userAgent"]);
    }

    #[test]
    fn test_endpoint_spec_for_service() {
        let spec = EndpointSpec::for_service(ServiceKind::Ping, "staging");
        assert_eq!(spec.name, "ping");
        assert_eq!(spec.success_body, "ok");
        assert_eq!(EndpointSpec::for_service(ServiceKind::Pong, "staging").success_body, "pong");
    }
}
