//! pong: instrumented service answering `/pong`.
//!
//! # Usage
//!
//! ```bash
//! ADDRESS=:8081 JAEGER_ADDRESS=jaeger:4318 pong
//! ```

use pingpong::config::ServiceKind;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pingpong::app::run(ServiceKind::Pong).await
}
