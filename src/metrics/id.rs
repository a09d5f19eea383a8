//! Metric identity: a name plus the kind it was registered with.

use crate::core::{DashtapError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The closed set of metric shapes the registry can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Accumulated signed total
    Counter,
    /// Current value with a display range
    Gauge,
    /// Instantaneous reading
    Pulse,
    /// String key/value map
    Dict,
    /// Stream of messages
    Logger,
    /// Bucketed value distribution
    Histogram,
    /// Grid of cells with fixed columns
    Table,
}

impl MetricKind {
    /// All kinds, in wire tag order
    pub const ALL: [MetricKind; 7] = [
        MetricKind::Counter,
        MetricKind::Gauge,
        MetricKind::Pulse,
        MetricKind::Dict,
        MetricKind::Logger,
        MetricKind::Histogram,
        MetricKind::Table,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Pulse => "pulse",
            MetricKind::Dict => "dict",
            MetricKind::Logger => "logger",
            MetricKind::Histogram => "histogram",
            MetricKind::Table => "table",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable identity of a registered metric
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricId {
    name: Arc<str>,
    kind: MetricKind,
}

impl MetricId {
    /// Create an id, rejecting empty names
    pub fn new(name: &str, kind: MetricKind) -> Result<Self> {
        if name.is_empty() {
            return Err(DashtapError::InvalidName);
        }
        Ok(Self {
            name: Arc::from(name),
            kind,
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> MetricKind {
        self.kind
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_name_rejected() {
        assert!(matches!(MetricId::new("", MetricKind::Counter), Err(DashtapError::InvalidName)));
    }

    #[test]
    fn test_id_display() {
        let id = MetricId::new("requests", MetricKind::Counter).unwrap();
        assert_eq!(id.to_string(), "counter:requests");
        assert_eq!(id.name(), "requests");
        assert_eq!(id.kind(), MetricKind::Counter);
    }

    #[test]
    fn test_kind_names_are_unique() {
        let mut names: Vec<_> = MetricKind::ALL.iter().map(MetricKind::as_str).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), MetricKind::ALL.len());
    }
}
