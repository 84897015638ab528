//! Transport envelope wrapping one tick of collected metrics
//!
//! ```text
//! {
//!   "timestamp": "2024-03-01 12:00:05",
//!   "unix_timestamp": 1709294405,
//!   "metadata": { "source": "...", "system_id": "...", "version": "1.0" },
//!   "data": { "System": { "cpu_usage": { "value": 45.5, "unit": "percent" } }, ... }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{error, trace, warn};

use crate::MetricResult;

pub const ENVELOPE_VERSION: &str = "1.0";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const NON_FINITE_ERROR: &str = "non-finite value";

/// Monitor results of one group, keyed by monitor name
pub type GroupData = BTreeMap<String, MetricResult>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub source: String,
    pub system_id: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsEnvelope {
    /// Local wall clock at measurement time
    pub timestamp: String,
    pub unix_timestamp: i64,
    pub metadata: Metadata,
    pub data: BTreeMap<String, GroupData>,
}

impl MetricsEnvelope {
    pub fn metric(&self, group: &str, monitor: &str) -> Option<&MetricResult> {
        self.data.get(group)?.get(monitor)
    }

    /// Number of metrics across all groups
    pub fn len(&self) -> usize {
        self.data.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Which configured group each monitor reports into
#[derive(Debug, Clone, Default)]
pub struct GroupMap {
    groups: Vec<String>,
    members: HashMap<String, String>,
}

impl GroupMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group<I, S>(mut self, group: impl Into<String>, monitors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let group = group.into();
        for monitor in monitors {
            self.members.insert(monitor.into(), group.clone());
        }
        if !self.groups.contains(&group) {
            self.groups.push(group);
        }
        self
    }

    pub fn group_of(&self, monitor: &str) -> Option<&str> {
        self.members.get(monitor).map(String::as_str)
    }

    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct EnvelopeBuilder {
    source: String,
    system_id: String,
    groups: GroupMap,
}

impl EnvelopeBuilder {
    pub fn new(source: impl Into<String>, system_id: impl Into<String>, groups: GroupMap) -> Self {
        Self {
            source: source.into(),
            system_id: system_id.into(),
            groups,
        }
    }

    pub fn groups(&self) -> &GroupMap {
        &self.groups
    }

    /// Build the envelope for one tick, stamped with the current local time
    pub fn build<I>(&self, collected: I) -> MetricsEnvelope
    where
        I: IntoIterator<Item = (String, MetricResult)>,
    {
        self.build_at(collected, Local::now())
    }

    /// A value JSON cannot carry (NaN, infinity) is replaced by an error result
    /// for that monitor only.
    pub fn build_at<I>(&self, collected: I, now: DateTime<Local>) -> MetricsEnvelope
    where
        I: IntoIterator<Item = (String, MetricResult)>,
    {
        let mut data: BTreeMap<String, GroupData> = self
            .groups
            .groups()
            .map(|group| (group.to_string(), GroupData::new()))
            .collect();

        for (monitor, mut result) in collected {
            let Some(group) = self.groups.group_of(&monitor) else {
                warn!("monitor {monitor} does not belong to any configured group");
                continue;
            };

            if let Some(value) = result.value()
                && !value.is_finite()
            {
                error!("non-finite value for {group}.{monitor}");
                result = MetricResult::failed(result.unit(), NON_FINITE_ERROR);
            }

            trace!("adding {monitor} to group {group}");
            data.entry(group.to_string())
                .or_default()
                .insert(monitor, result);
        }

        MetricsEnvelope {
            timestamp: now.format(TIMESTAMP_FORMAT).to_string(),
            unix_timestamp: now.timestamp(),
            metadata: Metadata {
                source: self.source.clone(),
                system_id: self.system_id.clone(),
                version: ENVELOPE_VERSION.to_string(),
            },
            data,
        }
    }
}
