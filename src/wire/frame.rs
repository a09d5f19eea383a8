//! Wire types consumers decode.
//!
//! The layout of these types is the protocol: changing a variant or field is
//! a protocol version bump.

use crate::metrics::{Cell, Change, Column, Delta, GaugeRange, MetricKind, RowId};
use serde::{Deserialize, Serialize};

/// Kind-specific frame body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Counter {
        value: f64,
    },
    Gauge {
        value: f64,
        /// Present at the metric's first appearance
        range: Option<GaugeRange>,
    },
    Pulse {
        value: f64,
    },
    /// Full current mapping
    Dict {
        entries: Vec<(String, String)>,
    },
    /// Messages appended since the previous delivery
    Logger {
        messages: Vec<String>,
        /// Messages lost to the pending bound since the previous delivery
        dropped: u64,
    },
    Histogram {
        /// Present at the metric's first appearance
        bounds: Option<Vec<f64>>,
        /// One count per bound plus the overflow bucket
        counts: Vec<u64>,
    },
    Table {
        /// Present at the metric's first appearance, together with every row and cell
        columns: Option<Vec<Column>>,
        /// All rows at first appearance, rows added since the previous delivery after that
        rows: Vec<RowId>,
        cells: Vec<Cell>,
    },
}

impl Payload {
    pub fn kind(&self) -> MetricKind {
        match self {
            Payload::Counter { .. } => MetricKind::Counter,
            Payload::Gauge { .. } => MetricKind::Gauge,
            Payload::Pulse { .. } => MetricKind::Pulse,
            Payload::Dict { .. } => MetricKind::Dict,
            Payload::Logger { .. } => MetricKind::Logger,
            Payload::Histogram { .. } => MetricKind::Histogram,
            Payload::Table { .. } => MetricKind::Table,
        }
    }

    /// Carries first-appearance metadata
    pub fn has_schema(&self) -> bool {
        match self {
            Payload::Gauge { range, .. } => range.is_some(),
            Payload::Histogram { bounds, .. } => bounds.is_some(),
            Payload::Table { columns, .. } => columns.is_some(),
            Payload::Counter { .. }
            | Payload::Pulse { .. }
            | Payload::Dict { .. }
            | Payload::Logger { .. } => false,
        }
    }
}

impl From<&Delta> for Payload {
    fn from(delta: &Delta) -> Self {
        match delta {
            Delta::Counter { value } => Payload::Counter { value: *value },
            Delta::Gauge { value, range } => Payload::Gauge {
                value: *value,
                range: *range,
            },
            Delta::Pulse { value } => Payload::Pulse { value: *value },
            Delta::Dict { entries } => Payload::Dict {
                entries: entries.clone(),
            },
            Delta::Logger { messages, dropped } => Payload::Logger {
                messages: messages.clone(),
                dropped: *dropped,
            },
            Delta::Histogram { bounds, counts } => Payload::Histogram {
                bounds: bounds.clone(),
                counts: counts.clone(),
            },
            Delta::Table {
                columns,
                rows,
                cells,
            } => Payload::Table {
                columns: columns.clone(),
                rows: rows.clone(),
                cells: cells.clone(),
            },
        }
    }
}

/// One metric's change, self-describing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub name: String,
    pub kind: MetricKind,
    pub payload: Payload,
}

impl From<&Change> for Frame {
    fn from(change: &Change) -> Self {
        Frame {
            name: change.id().name().to_string(),
            kind: change.id().kind(),
            payload: Payload::from(change.delta()),
        }
    }
}

/// Everything one flush cycle delivers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    /// Application name of the producer
    pub source: String,
    /// Increments per delivered packet within a producer session
    pub sequence: u64,
    pub frames: Vec<Frame>,
}

impl Packet {
    pub fn frame(&self, name: &str) -> Option<&Frame> {
        self.frames.iter().find(|frame| frame.name == name)
    }
}
