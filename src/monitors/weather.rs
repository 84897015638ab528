use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::{MetricResult, config::RemoteToggle};

use super::{Monitor, as_number, fetch_json, http_client};

/// Field read from a weatherapi.com style `{"current": {...}}` response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeatherField {
    Temperature,
    Humidity,
}

impl WeatherField {
    pub fn name(self) -> &'static str {
        match self {
            WeatherField::Temperature => "temperature",
            WeatherField::Humidity => "humidity",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            WeatherField::Temperature => "Celsius",
            WeatherField::Humidity => "percent",
        }
    }

    fn key(self) -> &'static str {
        match self {
            WeatherField::Temperature => "temp_c",
            WeatherField::Humidity => "humidity",
        }
    }

    fn label(self) -> &'static str {
        match self {
            WeatherField::Temperature => "Temperature",
            WeatherField::Humidity => "Humidity",
        }
    }

    fn extract(self, data: &serde_json::Value) -> Option<f64> {
        data.get("current")?.get(self.key()).and_then(as_number)
    }
}

#[derive(Debug)]
pub struct WeatherMonitor {
    field: WeatherField,
    api_url: String,
    enabled: bool,
    client: reqwest::Client,
    running: AtomicBool,
}

impl WeatherMonitor {
    pub fn new(field: WeatherField, config: &RemoteToggle, timeout: Duration) -> Result<Self> {
        debug!("{} monitor initialized", field.name());
        Ok(Self {
            field,
            api_url: config.api_url.clone().unwrap_or_default(),
            enabled: config.enabled,
            client: http_client(timeout)?,
            running: AtomicBool::new(true),
        })
    }
}

#[async_trait]
impl Monitor for WeatherMonitor {
    fn name(&self) -> &str {
        self.field.name()
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn measure(&self) -> MetricResult {
        let unit = self.field.unit();

        let data = match fetch_json(&self.client, &self.api_url).await {
            Ok(data) => data,
            Err(e) => {
                return MetricResult::failed(
                    unit,
                    format!("error fetching {} data: {e:#}", self.field.name()),
                );
            }
        };

        match self.field.extract(&data) {
            Some(value) => MetricResult::ok(value, unit),
            None => MetricResult::failed(unit, format!("{} data not found", self.field.label())),
        }
    }

    fn stop(&self) {
        debug!("stopping {} monitor", self.name());
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
