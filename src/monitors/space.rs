use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::{MetricResult, config::RemoteToggle};

use super::{Monitor, fetch_json, http_client};

const UNIT: &str = "people";

/// Number of people currently in space, e.g. from open-notify `astros.json`
#[derive(Debug)]
pub struct PeopleInSpaceMonitor {
    api_url: String,
    enabled: bool,
    client: reqwest::Client,
    running: AtomicBool,
}

impl PeopleInSpaceMonitor {
    pub fn new(config: &RemoteToggle, timeout: Duration) -> Result<Self> {
        debug!("people_in_space monitor initialized");
        Ok(Self {
            api_url: config.api_url.clone().unwrap_or_default(),
            enabled: config.enabled,
            client: http_client(timeout)?,
            running: AtomicBool::new(true),
        })
    }
}

#[async_trait]
impl Monitor for PeopleInSpaceMonitor {
    fn name(&self) -> &str {
        "people_in_space"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[instrument(skip(self))]
    async fn measure(&self) -> MetricResult {
        let count = fetch_json(&self.client, &self.api_url)
            .await
            .and_then(|data| parse_count(&data));

        match count {
            Ok(count) => MetricResult::ok(count, UNIT),
            Err(e) => MetricResult::failed(UNIT, format!("{e:#}")),
        }
    }

    fn stop(&self) {
        debug!("stopping people_in_space monitor");
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Accepts a bare integer, `{"number": n}`, or `{"people": [...]}`, in that order
fn parse_count(data: &Value) -> Result<i64> {
    match data {
        Value::Number(number) => match number.as_i64() {
            Some(count) => Ok(count),
            None => bail!("Invalid response format: unexpected response type"),
        },
        Value::Object(object) => {
            if let Some(count) = object.get("number").and_then(Value::as_i64) {
                return Ok(count);
            }
            if let Some(people) = object.get("people").and_then(Value::as_array) {
                return Ok(people.len() as i64);
            }
            bail!("Invalid response format: no valid people count found")
        }
        _ => bail!("Invalid response format: unexpected response type"),
    }
}
