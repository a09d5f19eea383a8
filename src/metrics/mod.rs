//! Metric registry and change tracking.
//!
//! - `id`: identity of a registered metric
//! - `state`: per-kind values and their flush deltas
//! - `registry`: name-keyed storage plus the dirty queue
//! - `changeset`: what one flush cycle captured
//! - `handles`: the typed API application code mutates

pub mod changeset;
pub mod handles;
pub mod id;
pub mod registry;
pub mod state;

pub use changeset::{Change, ChangeSet};
pub use handles::{Counter, Dict, Gauge, Histogram, Logger, Pulse, Table};
pub use id::{MetricId, MetricKind};
pub use registry::{Metric, Registry};
pub use state::{Cell, Column, ColumnId, Delta, GaugeRange, MetricSpec, MetricState, RowId};
