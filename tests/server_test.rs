//! End-to-end tests: a ping server calling a real pong server over TCP.

mod common;

use common::{sample_labels, sample_value, samples, TestTelemetry};
use pingpong::config::ServiceKind;
use pingpong::server::{create_router, serve};
use pingpong::service::{Downstream, EndpointSpec, HttpDownstream, RequestHandler};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// A server bound to an ephemeral port, stopped by `stop`.
struct RunningServer {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<pingpong::Result<()>>,
}

impl RunningServer {
    async fn start(
        kind: ServiceKind,
        telemetry: &TestTelemetry,
        downstream: Option<Arc<dyn Downstream>>,
    ) -> Self {
        let handler = RequestHandler::new(
            &telemetry.registry,
            EndpointSpec::for_service(kind, "test"),
            downstream,
        );
        let app = create_router(
            kind.route(),
            Arc::new(handler),
            telemetry.registry.metrics().scrape_endpoint(),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(serve(listener, app, async move {
            let _ = stopped.await;
        }));

        Self { addr, stop, task }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn stop(self) {
        let _ = self.stop.send(());
        self.task.await.unwrap().unwrap();
    }
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .user_agent("e2e-test")
        .build()
        .unwrap()
}

fn downstream_to(url: &str) -> Arc<dyn Downstream> {
    let url = reqwest::Url::parse(url).unwrap();
    Arc::new(HttpDownstream::new(url, Duration::from_secs(2)).unwrap())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ping_calls_pong() {
    let pong_telemetry = TestTelemetry::new("Pong");
    let ping_telemetry = TestTelemetry::new("Ping");

    let pong = RunningServer::start(ServiceKind::Pong, &pong_telemetry, None).await;
    let ping = RunningServer::start(
        ServiceKind::Ping,
        &ping_telemetry,
        Some(downstream_to(&pong.url("/pong"))),
    )
    .await;

    let response = client().get(ping.url("/ping")).send().await.unwrap();
    assert!(response.status().is_success());
    assert_eq!(response.text().await.unwrap(), "ok");

    // Both sides recorded exactly one request.
    let ping_text = ping_telemetry.scrape();
    assert_eq!(
        sample_value(&ping_text, "request_count_total", "userAgent=\"e2e-test\""),
        Some(1.0),
        "{ping_text}"
    );
    let pong_text = pong_telemetry.scrape();
    assert_eq!(
        samples_total(&pong_text, "request_count_total"),
        1.0,
        "{pong_text}"
    );

    let ping_spans = ping_telemetry.flushed_spans().await;
    let pong_spans = pong_telemetry.flushed_spans().await;
    assert_eq!(ping_spans.len(), 1);
    assert_eq!(ping_spans[0].name, "ping-request");
    assert_eq!(pong_spans.len(), 1);
    assert_eq!(pong_spans[0].name, "pong-request");

    ping.stop().await;
    pong.stop().await;
    ping_telemetry.shutdown().await;
    pong_telemetry.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ping_with_unreachable_pong_reports_error() {
    // Bind and drop to get a port nothing listens on.
    let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let closed_addr = closed.local_addr().unwrap();
    drop(closed);

    let telemetry = TestTelemetry::new("Ping");
    let ping = RunningServer::start(
        ServiceKind::Ping,
        &telemetry,
        Some(downstream_to(&format!("http://{closed_addr}/pong"))),
    )
    .await;

    let response = client().get(ping.url("/ping")).send().await.unwrap();
    // The error text is the body; the status stays 200.
    assert!(response.status().is_success());
    let body = response.text().await.unwrap();
    assert_ne!(body, "ok");
    assert!(!body.is_empty());

    let text = telemetry.scrape();
    assert_eq!(
        sample_value(&text, "request_count_total", "userAgent=\"e2e-test\""),
        Some(1.0),
        "{text}"
    );

    ping.stop().await;
    telemetry.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_metrics_endpoint_over_http() {
    let telemetry = TestTelemetry::new("Pong");
    let pong = RunningServer::start(ServiceKind::Pong, &telemetry, None).await;
    let client = client();

    client.get(pong.url("/pong")).send().await.unwrap();

    let response = client.get(pong.url("/metrics")).send().await.unwrap();
    assert!(response.status().is_success());
    let text = response.text().await.unwrap();
    assert!(text.contains("# TYPE request_count_total counter"), "{text}");
    assert!(text.contains("duration_bucket"), "{text}");

    let ready = client.get(pong.url("/ready")).send().await.unwrap();
    assert!(ready.status().is_success());

    // After telemetry shutdown the scrape endpoint reports unavailable.
    telemetry.shutdown().await;
    let response = client.get(pong.url("/metrics")).send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);

    pong.stop().await;
}

fn samples_total(text: &str, name: &str) -> f64 {
    samples(text, name)
        .iter()
        .filter_map(|line| line.rsplit(' ').next())
        .filter_map(|v| v.parse::<f64>().ok())
        .sum()
}

#[test]
fn test_sample_helpers_parse_exposition() {
    const TEXT: &str = "\
# HELP request_count_total Incoming request count
# TYPE request_count_total counter
request_count_total{otel_scope_name=\"ping\",userAgent=\"a\"} 2
duration_sum{otel_scope_name=\"ping\",userAgent=\"a\"} 12.5
duration_count{otel_scope_name=\"ping\",userAgent=\"a\"} 2
";

    assert_eq!(sample_value(TEXT, "request_count_total", "userAgent=\"a\""), Some(2.0));
    assert_eq!(sample_value(TEXT, "duration_sum", "userAgent=\"a\""), Some(12.5));
    assert_eq!(
        sample_labels(TEXT, "duration_count", "userAgent"),
        Some("{otel_scope_name=\"ping\",userAgent=\"a\"}")
    );
    assert!(samples(TEXT, "duration").is_empty());
    assert_eq!(samples_total(TEXT, "request_count_total"), 2.0);
}
