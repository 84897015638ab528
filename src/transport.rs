//! Outbound delivery of serialized envelopes

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::error::{DeliveryError, DeliveryResult};

/// What the ingestion endpoint tells us after accepting an envelope
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeliveryResponse {
    /// The server asks this client to shut down
    #[serde(default)]
    pub should_shutdown: bool,
}

/// Sends one serialized envelope to the ingestion side.
///
/// Any `Err` is treated as transient by the delivery worker: the item goes back on
/// the queue.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, body: &[u8]) -> DeliveryResult<DeliveryResponse>;
}

/// POSTs envelopes as JSON over HTTP
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, timeout: Duration) -> DeliveryResult<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, body: &[u8]) -> DeliveryResult<DeliveryResponse> {
        trace!("{}: sending {} bytes", self.url, body.len());

        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        debug!("{}: server response status code: {status}", self.url);

        // an empty or non-JSON acknowledgement carries no directive
        Ok(serde_json::from_slice(&bytes)
            .inspect_err(|e| trace!("{}: response is not a directive: {e}", self.url))
            .unwrap_or_default())
    }
}
