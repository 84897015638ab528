//! Leaf monitors producing one named metric per tick
//!
//! Local monitors query the operating system through `sysinfo`, remote monitors
//! issue a single GET against a JSON API. Neither ever fails past `collect`: a
//! failed measurement is reported as a [`MetricResult`] carrying the error.

pub mod crypto;
pub mod resources;
pub mod space;
pub mod weather;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::{MetricResult, config::MonitoringConfig};

use self::{
    crypto::CryptoPriceMonitor,
    resources::ResourceMonitor,
    space::PeopleInSpaceMonitor,
    weather::{WeatherField, WeatherMonitor},
};

#[async_trait]
pub trait Monitor: Send + Sync {
    /// Key of this metric inside its group
    fn name(&self) -> &str;

    fn is_enabled(&self) -> bool;

    /// Take the measurement, converting every failure into an error result
    async fn measure(&self) -> MetricResult;

    /// Idempotent
    fn stop(&self);

    fn is_running(&self) -> bool;

    /// Measure if enabled. A disabled monitor warns on every call and yields nothing.
    async fn collect(&self) -> Option<MetricResult> {
        if !self.is_enabled() {
            warn!("{} monitoring is disabled in config", self.name());
            return None;
        }

        let result = self.measure().await;
        match (result.error(), result.value()) {
            (Some(e), _) => error!("error collecting {} metrics: {e}", self.name()),
            (None, Some(value)) => info!("{}: {value} {}", self.name(), result.unit()),
            (None, None) => {}
        }

        Some(result)
    }
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("failed to build HTTP client")
}

/// GET `url` and decode the JSON body
pub(crate) async fn fetch_json(client: &reqwest::Client, url: &str) -> Result<serde_json::Value> {
    let response = client
        .get(url)
        .send()
        .await
        .context("failed to send HTTP request")?;

    if !response.status().is_success() {
        anyhow::bail!("HTTP error: {}", response.status());
    }

    response
        .json::<serde_json::Value>()
        .await
        .context("failed to parse response JSON")
}

/// Read a finite number that APIs send either as JSON number or as numeric string
pub(crate) fn as_number(value: &serde_json::Value) -> Option<f64> {
    let number = match value {
        serde_json::Value::Number(number) => number.as_f64(),
        serde_json::Value::String(raw) => raw.trim().parse().ok(),
        _ => None,
    };
    number.filter(|number| number.is_finite())
}

/// Instantiate every enabled monitor from configuration, in collection order
pub fn from_config(config: &MonitoringConfig) -> Result<Vec<Arc<dyn Monitor>>> {
    let timeout = config.monitor_timeout();
    let system = &config.system;

    let mut monitors: Vec<Arc<dyn Monitor>> = vec![
        Arc::new(ResourceMonitor::cpu(system.cpu_usage.enabled)),
        Arc::new(ResourceMonitor::memory(system.memory_usage.enabled)),
        Arc::new(ResourceMonitor::disk(
            system.disk_usage.enabled,
            system.disk_usage.path.clone(),
        )),
        Arc::new(ResourceMonitor::processes(system.process_count.enabled)),
    ];

    for (symbol, crypto) in &config.crypto {
        monitors.push(Arc::new(CryptoPriceMonitor::new(symbol, crypto, timeout)?));
    }

    let weather = &config.weather;
    monitors.push(Arc::new(WeatherMonitor::new(
        WeatherField::Temperature,
        &weather.temperature,
        timeout,
    )?));
    monitors.push(Arc::new(WeatherMonitor::new(
        WeatherField::Humidity,
        &weather.humidity,
        timeout,
    )?));
    monitors.push(Arc::new(PeopleInSpaceMonitor::new(
        &config.space.people_in_space,
        timeout,
    )?));

    monitors.retain(|monitor| {
        if !monitor.is_enabled() {
            debug!("skipping disabled monitor {}", monitor.name());
        }
        monitor.is_enabled()
    });

    Ok(monitors)
}
