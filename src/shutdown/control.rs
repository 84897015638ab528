//! Client for the ingestion side's shutdown negotiation API

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, info, trace};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Answer of `GET /api/check-shutdown`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ShutdownCheck {
    #[serde(default)]
    pub should_shutdown: bool,
    /// Server clock, to be sent back as `last_check` on the next poll
    pub server_time: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ControlClient {
    client: reqwest::Client,
    base: Url,
}

impl ControlClient {
    pub fn new(mut base: Url) -> Result<Self> {
        // relative joins replace the last segment unless the path ends in '/'
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .context("failed to build HTTP client")?,
            base,
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("invalid control endpoint {path}"))
    }

    /// Withdraw the pending shutdown for `client_id`
    pub async fn cancel_shutdown(&self, client_id: &str) -> Result<()> {
        info!("cancelling shutdown for client {client_id}");

        let response = self
            .client
            .post(self.endpoint("api/cancel-shutdown")?)
            .query(&[("client_id", client_id)])
            .send()
            .await
            .context("failed to send cancel request")?;

        response
            .error_for_status()
            .context("server rejected shutdown cancellation")?;

        info!("shutdown cancelled successfully");
        Ok(())
    }

    /// Ask whether a shutdown was requested since `last_check`
    pub async fn check_shutdown(&self, last_check: f64) -> Result<ShutdownCheck> {
        trace!("checking for shutdown requests since {last_check}");

        let response = self
            .client
            .get(self.endpoint("api/check-shutdown")?)
            .query(&[("last_check", last_check)])
            .send()
            .await
            .context("failed to send shutdown check")?
            .error_for_status()
            .context("shutdown check failed")?;

        let check: ShutdownCheck = response
            .json()
            .await
            .context("failed to parse shutdown check response")?;
        debug!("shutdown check: {check:?}");

        Ok(check)
    }
}
