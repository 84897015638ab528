pub mod actors;
pub mod config;
pub mod envelope;
pub mod error;
pub mod logging;
pub mod monitors;
pub mod orchestrator;
pub mod queue;
pub mod shutdown;
pub mod transport;
pub mod util;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Numeric reading of a single metric.
///
/// Integers stay integers on the wire (process count, people in space), everything
/// else is a float.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Integer(i64),
    Float(f64),
}

impl MetricValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            MetricValue::Integer(value) => *value as f64,
            MetricValue::Float(value) => *value,
        }
    }

    /// JSON has no representation for NaN or infinities.
    pub fn is_finite(&self) -> bool {
        match self {
            MetricValue::Integer(_) => true,
            MetricValue::Float(value) => value.is_finite(),
        }
    }
}

impl From<i64> for MetricValue {
    fn from(value: i64) -> Self {
        MetricValue::Integer(value)
    }
}

impl From<usize> for MetricValue {
    fn from(value: usize) -> Self {
        MetricValue::Integer(value as i64)
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Float(value)
    }
}

impl From<f32> for MetricValue {
    fn from(value: f32) -> Self {
        MetricValue::Float(value as f64)
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Integer(value) => write!(f, "{value}"),
            MetricValue::Float(value) => write!(f, "{value:.2}"),
        }
    }
}

/// Result of one measurement taken by a monitor.
///
/// A failed measurement never carries a value. The `error` key is only written to
/// the wire when the measurement failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    value: Option<MetricValue>,
    unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl MetricResult {
    pub fn ok(value: impl Into<MetricValue>, unit: impl ToString) -> Self {
        Self {
            value: Some(value.into()),
            unit: unit.to_string(),
            error: None,
        }
    }

    pub fn failed(unit: impl ToString, error: impl ToString) -> Self {
        Self {
            value: None,
            unit: unit.to_string(),
            error: Some(error.to_string()),
        }
    }

    pub fn value(&self) -> Option<MetricValue> {
        self.value
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
