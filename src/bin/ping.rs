//! ping: instrumented service that calls pong on every request.
//!
//! # Usage
//!
//! ```bash
//! ADDRESS=:8080 PONG_ENDPOINT=pong:8081 JAEGER_ADDRESS=jaeger:4318 ping
//! ```

use pingpong::config::ServiceKind;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pingpong::app::run(ServiceKind::Ping).await
}
