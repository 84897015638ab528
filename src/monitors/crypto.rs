use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::{MetricResult, config::CryptoConfig};

use super::{Monitor, as_number, fetch_json, http_client};

/// Spot price of one cryptocurrency, e.g. a Binance `ticker/price` endpoint.
///
/// The metric unit is the configured quote currency.
#[derive(Debug)]
pub struct CryptoPriceMonitor {
    symbol: String,
    api_url: String,
    currency: String,
    enabled: bool,
    client: reqwest::Client,
    running: AtomicBool,
}

impl CryptoPriceMonitor {
    pub fn new(symbol: &str, config: &CryptoConfig, timeout: Duration) -> Result<Self> {
        debug!("{symbol} monitor initialized");
        Ok(Self {
            symbol: symbol.to_string(),
            api_url: config.api_url(symbol),
            currency: config.currency.clone(),
            enabled: config.enabled,
            client: http_client(timeout)?,
            running: AtomicBool::new(true),
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

#[async_trait]
impl Monitor for CryptoPriceMonitor {
    fn name(&self) -> &str {
        &self.symbol
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[instrument(skip(self), fields(symbol = %self.symbol))]
    async fn measure(&self) -> MetricResult {
        let price = fetch_json(&self.client, &self.api_url)
            .await
            .and_then(|data| parse_price(&data));

        match price {
            Ok(price) => MetricResult::ok(price, &self.currency),
            Err(e) => MetricResult::failed(
                &self.currency,
                format!("error fetching {} price: {e:#}", self.symbol),
            ),
        }
    }

    fn stop(&self) {
        debug!("stopping {} monitor", self.symbol);
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// `{"price": "61234.50"}` or `{"price": 61234.5}`
fn parse_price(data: &serde_json::Value) -> Result<f64> {
    let price = data.get("price").context("price not found in response")?;
    as_number(price).with_context(|| format!("price is not a number: {price}"))
}
