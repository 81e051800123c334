//! Downstream collaborator invoked by the ping handler.

use async_trait::async_trait;
use reqwest::{Client, Url};
use std::error::Error as StdError;
use std::time::Duration;

use crate::error::{Error, Result};

/// A unit of downstream work performed while handling a request.
#[async_trait]
pub trait Downstream: Send + Sync {
    /// Perform the call. Failures are reported as [`Error::DownstreamCall`].
    async fn call(&self) -> Result<()>;
}

/// Calls another service endpoint over plain HTTP.
#[derive(Debug, Clone)]
pub struct HttpDownstream {
    client: Client,
    url: Url,
}

impl HttpDownstream {
    /// Create a collaborator issuing `GET url`, bounded by `timeout`.
    pub fn new(url: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| Error::Configuration(format!("HTTP client: {e}")))?;
        Ok(Self { client, url })
    }

    /// Target of every call.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

/// Any response outside 2xx counts as a failed call.
#[async_trait]
impl Downstream for HttpDownstream {
    async fn call(&self) -> Result<()> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| Error::DownstreamCall(error_chain(&e)))?;

        response
            .error_for_status()
            .map_err(|e| Error::DownstreamCall(error_chain(&e)))?;
        Ok(())
    }
}

/// Join an error with all of its sources, e.g.
/// `error sending request: client error (Connect): tcp connect error: Connection refused`.
fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
