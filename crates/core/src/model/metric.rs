use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Namespace every dial metric is published under.
pub const DIAL_NAMESPACE: &str = "Service/Dial";

pub const STATE_METRIC: &str = "State";
pub const LATENCY_METRIC: &str = "Latency";

pub const SERVICE_NAME_DIMENSION: &str = "ServiceName";
pub const ENVIRONMENT_DIMENSION: &str = "Environment";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Unit {
    None,
    Milliseconds,
}

impl Unit {
    /// UCUM code used on the OTLP wire.
    pub fn ucum(self) -> &'static str {
        match self {
            Self::None => "1",
            Self::Milliseconds => "ms",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

impl Dimension {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricPoint {
    pub ts: DateTime<Utc>,
    pub name: String,
    pub unit: Unit,
    pub value: f64,
    pub dimensions: Vec<Dimension>,
}

impl MetricPoint {
    pub fn new(name: impl Into<String>, unit: Unit, value: f64, dimensions: Vec<Dimension>) -> Self {
        Self {
            ts: Utc::now(),
            name: name.into(),
            unit,
            value,
            dimensions,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricBatch {
    pub namespace: String,
    pub points: Vec<MetricPoint>,
}

impl MetricBatch {
    pub fn new(namespace: impl Into<String>, points: Vec<MetricPoint>) -> Self {
        Self {
            namespace: namespace.into(),
            points,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
