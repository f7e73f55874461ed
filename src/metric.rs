//! Metric value types
//!
//! A [`Metric`] is an id plus a tagged [`MetricValue`]. The kind of a metric
//! is derived from its value, so a counter always carries a delta and a gauge
//! always carries a floating value.
//!
//! [`MetricRecord`] is the wire form (`{"id", "type", "delta"?, "value"?}`)
//! shared by the snapshot file and the HTTP layer. Conversion from a record
//! into a [`Metric`] is where optional fields are resolved and validated.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::storage::error::{StorageError, StorageResult};

/// Kind tag of a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Repeated writes accumulate
    Counter,
    /// Repeated writes replace the previous value
    Gauge,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        }
    }

    /// Parse a raw text payload into a value of this kind
    ///
    /// Only used at the HTTP boundary; the store never sees raw strings.
    pub fn parse_value(&self, raw: &str) -> StorageResult<MetricValue> {
        match self {
            MetricKind::Counter => raw
                .trim()
                .parse::<i64>()
                .map(MetricValue::Counter)
                .map_err(|e| StorageError::InvalidValue(format!("{raw:?}: {e}"))),
            MetricKind::Gauge => raw
                .trim()
                .parse::<f64>()
                .map(MetricValue::Gauge)
                .map_err(|e| StorageError::InvalidValue(format!("{raw:?}: {e}"))),
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "counter" => Ok(MetricKind::Counter),
            "gauge" => Ok(MetricKind::Gauge),
            other => Err(StorageError::InvalidType(other.to_string())),
        }
    }
}

/// The numeric payload of a metric
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Counter(i64),
    Gauge(f64),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Counter(_) => MetricKind::Counter,
            MetricValue::Gauge(_) => MetricKind::Gauge,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Counter(delta) => write!(f, "{delta}"),
            MetricValue::Gauge(value) => write!(f, "{value}"),
        }
    }
}

/// Lookup key: id plus the kind the caller expects
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricKey {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
}

impl MetricKey {
    pub fn new(id: impl Into<String>, kind: MetricKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    pub fn counter(id: impl Into<String>) -> Self {
        Self::new(id, MetricKind::Counter)
    }

    pub fn gauge(id: impl Into<String>) -> Self {
        Self::new(id, MetricKind::Gauge)
    }
}

/// A validated metric
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    id: String,
    value: MetricValue,
}

impl Metric {
    /// Build a metric, rejecting empty ids and non-finite gauge values
    pub fn new(id: impl Into<String>, value: MetricValue) -> StorageResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(StorageError::InvalidValue("metric id must not be empty".into()));
        }
        if let MetricValue::Gauge(v) = value
            && !v.is_finite()
        {
            return Err(StorageError::InvalidValue(format!(
                "gauge {id} has non-finite value {v}"
            )));
        }
        Ok(Self { id, value })
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> StorageResult<Self> {
        Self::new(id, MetricValue::Counter(delta))
    }

    pub fn gauge(id: impl Into<String>, value: f64) -> StorageResult<Self> {
        Self::new(id, MetricValue::Gauge(value))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }

    pub fn value(&self) -> MetricValue {
        self.value
    }

    pub fn key(&self) -> MetricKey {
        MetricKey::new(self.id.clone(), self.kind())
    }

    /// Merge an incoming update into this stored metric
    ///
    /// Counters accumulate, gauges are replaced. The stored metric is left
    /// untouched when the update is rejected.
    pub fn merge(&mut self, incoming: &Metric) -> StorageResult<()> {
        match (&mut self.value, incoming.value) {
            (MetricValue::Counter(stored), MetricValue::Counter(delta)) => {
                *stored = stored.checked_add(delta).ok_or_else(|| {
                    StorageError::InvalidValue(format!("counter {} overflows", self.id))
                })?;
            }
            (MetricValue::Gauge(stored), MetricValue::Gauge(value)) => *stored = value,
            (stored, _) => {
                return Err(StorageError::KindMismatch {
                    id: self.id.clone(),
                    stored: stored.kind(),
                    incoming: incoming.kind(),
                });
            }
        }
        Ok(())
    }
}

/// Wire representation of a metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl From<&Metric> for MetricRecord {
    fn from(metric: &Metric) -> Self {
        let (delta, value) = match metric.value {
            MetricValue::Counter(delta) => (Some(delta), None),
            MetricValue::Gauge(value) => (None, Some(value)),
        };
        Self {
            id: metric.id.clone(),
            kind: metric.kind().to_string(),
            delta,
            value,
        }
    }
}

impl TryFrom<MetricRecord> for Metric {
    type Error = StorageError;

    fn try_from(record: MetricRecord) -> Result<Self, Self::Error> {
        let kind: MetricKind = record.kind.parse()?;
        let value = match (kind, record.delta, record.value) {
            (MetricKind::Counter, Some(delta), None) => MetricValue::Counter(delta),
            (MetricKind::Gauge, None, Some(value)) => MetricValue::Gauge(value),
            (MetricKind::Counter, None, _) => {
                return Err(StorageError::InvalidValue(format!(
                    "counter {} has no delta",
                    record.id
                )));
            }
            (MetricKind::Gauge, _, None) => {
                return Err(StorageError::InvalidValue(format!(
                    "gauge {} has no value",
                    record.id
                )));
            }
            _ => {
                return Err(StorageError::InvalidValue(format!(
                    "{} {} carries both delta and value",
                    kind, record.id
                )));
            }
        };
        Metric::new(record.id, value)
    }
}
