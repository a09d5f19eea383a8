//! Typed metric handles.
//!
//! Handles are cheap to clone; every clone for the same name refers to the
//! same registered state. Mutations take the metric lock briefly and never
//! wait on the reporting pipeline.

use crate::core::{DashtapError, Result};
use crate::metrics::registry::{Metric, Registry};
use crate::metrics::state::{Column, ColumnId, MetricSpec, Mutation, RowId};
use std::sync::Arc;

macro_rules! metric_handle {
    ($(#[$meta:meta])* $handle:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $handle {
            metric: Arc<Metric>,
            registry: Registry,
        }

        impl $handle {
            fn register(registry: &Registry, name: &str, spec: MetricSpec) -> Result<Self> {
                let metric = registry.get_or_create(name, spec)?;
                Ok(Self {
                    metric,
                    registry: registry.clone(),
                })
            }

            /// Registered name
            pub fn name(&self) -> &str {
                self.metric.id().name()
            }

            /// True while a reporter is delivering this metric's registry
            pub fn is_active(&self) -> bool {
                self.registry.is_active()
            }

            /// The underlying registered metric
            pub fn metric(&self) -> &Arc<Metric> {
                &self.metric
            }
        }
    };
}

/// Apply a mutation the metric's kind always accepts
fn apply_total(metric: &Arc<Metric>, mutation: Mutation) {
    if let Err(e) = metric.apply(mutation) {
        tracing::error!(metric = %metric.id(), "mutation rejected: {}", e);
    }
}

metric_handle!(
    /// Accumulating total
    Counter
);

impl Counter {
    pub fn new(registry: &Registry, name: &str) -> Result<Self> {
        Self::register(registry, name, MetricSpec::Counter)
    }

    /// Register against the process default registry
    pub fn create(name: &str) -> Result<Self> {
        Self::new(Registry::global(), name)
    }

    /// Add `delta`, which may be negative
    pub fn inc(&self, delta: f64) {
        apply_total(&self.metric, Mutation::CounterInc(delta));
    }
}

metric_handle!(
    /// Current value with a display range that is never enforced
    Gauge
);

impl Gauge {
    pub fn new(registry: &Registry, name: &str, min: f64, max: f64) -> Result<Self> {
        Self::register(registry, name, MetricSpec::Gauge { min, max })
    }

    pub fn create(name: &str, min: f64, max: f64) -> Result<Self> {
        Self::new(Registry::global(), name, min, max)
    }

    pub fn set(&self, value: f64) {
        apply_total(&self.metric, Mutation::GaugeSet(value));
    }
}

metric_handle!(
    /// Instantaneous reading
    Pulse
);

impl Pulse {
    pub fn new(registry: &Registry, name: &str) -> Result<Self> {
        Self::register(registry, name, MetricSpec::Pulse)
    }

    pub fn create(name: &str) -> Result<Self> {
        Self::new(Registry::global(), name)
    }

    pub fn set(&self, value: f64) {
        apply_total(&self.metric, Mutation::PulseSet(value));
    }

    pub fn inc(&self, delta: f64) {
        apply_total(&self.metric, Mutation::PulseInc(delta));
    }

    pub fn dec(&self, delta: f64) {
        apply_total(&self.metric, Mutation::PulseInc(-delta));
    }
}

metric_handle!(
    /// String key/value map, reported in full on every change
    Dict
);

impl Dict {
    pub fn new(registry: &Registry, name: &str) -> Result<Self> {
        Self::register(registry, name, MetricSpec::Dict)
    }

    pub fn create(name: &str) -> Result<Self> {
        Self::new(Registry::global(), name)
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        apply_total(&self.metric, Mutation::DictSet(key.into(), value.into()));
    }
}

metric_handle!(
    /// Message stream; only undelivered messages are kept
    Logger
);

impl Logger {
    pub fn new(registry: &Registry, name: &str) -> Result<Self> {
        Self::register(registry, name, MetricSpec::Logger)
    }

    pub fn create(name: &str) -> Result<Self> {
        Self::new(Registry::global(), name)
    }

    pub fn log(&self, message: impl Into<String>) {
        apply_total(&self.metric, Mutation::Log(message.into()));
    }
}

metric_handle!(
    /// Counts of values per fixed bucket
    Histogram
);

impl Histogram {
    /// `bounds` are bucket upper bounds, finite and strictly increasing.
    /// Values above the last bound land in an implicit overflow bucket.
    pub fn new(registry: &Registry, name: &str, bounds: &[f64]) -> Result<Self> {
        Self::register(registry, name, MetricSpec::Histogram { bounds: bounds.to_vec() })
    }

    pub fn create(name: &str, bounds: &[f64]) -> Result<Self> {
        Self::new(Registry::global(), name, bounds)
    }

    /// Count `value`; NaN and infinities are rejected with `InvalidValue`
    pub fn add(&self, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(DashtapError::invalid_value(format!(
                "histogram '{}' got non-finite value {}",
                self.name(),
                value
            )));
        }
        self.metric.apply(Mutation::HistogramAdd(value))
    }
}

metric_handle!(
    /// Grid with fixed columns and dynamic rows
    Table
);

impl Table {
    pub fn new<L: Into<String>>(
        registry: &Registry,
        name: &str,
        columns: impl IntoIterator<Item = (ColumnId, L)>,
    ) -> Result<Self> {
        let columns = columns
            .into_iter()
            .map(|(id, label)| Column::new(id, label))
            .collect();
        Self::register(registry, name, MetricSpec::Table { columns })
    }

    pub fn create<L: Into<String>>(
        name: &str,
        columns: impl IntoIterator<Item = (ColumnId, L)>,
    ) -> Result<Self> {
        Self::new(Registry::global(), name, columns)
    }

    /// Add a row; adding an existing row is a no-op
    pub fn add_row(&self, row: RowId) -> Result<()> {
        self.metric.apply(Mutation::AddRow(row))
    }

    /// Set a cell of an existing row and column, failing with
    /// `UnknownRowOrColumn` otherwise
    pub fn set_cell(&self, row: RowId, column: ColumnId, value: impl Into<String>) -> Result<()> {
        self.metric.apply(Mutation::SetCell {
            row,
            column,
            value: value.into(),
        })
    }
}
