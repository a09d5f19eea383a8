//! Per-kind metric state.
//!
//! Every kind keeps its current value plus whatever it needs to produce a
//! delta at flush time. Mutations are stamped with the metric's version so a
//! successful flush can drop exactly the pending data it delivered, leaving
//! anything recorded after the snapshot for the next cycle.

use crate::core::{DashtapError, Result};
use crate::metrics::id::{MetricId, MetricKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Table row identifier
pub type RowId = u64;
/// Table column identifier
pub type ColumnId = u64;

/// Display range of a gauge
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaugeRange {
    pub min: f64,
    pub max: f64,
}

/// Fixed table column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: ColumnId,
    pub label: String,
}

impl Column {
    pub fn new(id: ColumnId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
        }
    }
}

/// A set table cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub row: RowId,
    pub column: ColumnId,
    pub value: String,
}

/// Construction parameters, one per kind
#[derive(Debug, Clone, PartialEq)]
pub enum MetricSpec {
    Counter,
    Gauge { min: f64, max: f64 },
    Pulse,
    Dict,
    Logger,
    Histogram { bounds: Vec<f64> },
    Table { columns: Vec<Column> },
}

impl MetricSpec {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricSpec::Counter => MetricKind::Counter,
            MetricSpec::Gauge { .. } => MetricKind::Gauge,
            MetricSpec::Pulse => MetricKind::Pulse,
            MetricSpec::Dict => MetricKind::Dict,
            MetricSpec::Logger => MetricKind::Logger,
            MetricSpec::Histogram { .. } => MetricKind::Histogram,
            MetricSpec::Table { .. } => MetricKind::Table,
        }
    }

    /// Validate the parameters and build the initial state.
    ///
    /// Loggers share `log_bound` with their registry and read it on every push.
    pub(crate) fn build(self, log_bound: &Arc<AtomicUsize>) -> Result<MetricState> {
        let state = match self {
            MetricSpec::Counter => MetricState::Counter(CounterState::default()),
            MetricSpec::Gauge { min, max } => {
                MetricState::Gauge(GaugeState::new(GaugeRange { min, max })?)
            },
            MetricSpec::Pulse => MetricState::Pulse(PulseState::default()),
            MetricSpec::Dict => MetricState::Dict(DictState::default()),
            MetricSpec::Logger => MetricState::Logger(LoggerState::new(Arc::clone(log_bound))),
            MetricSpec::Histogram { bounds } => MetricState::Histogram(HistogramState::new(bounds)?),
            MetricSpec::Table { columns } => MetricState::Table(TableState::new(columns)?),
        };
        Ok(state)
    }
}

/// A single change requested by a handle
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    CounterInc(f64),
    GaugeSet(f64),
    PulseSet(f64),
    PulseInc(f64),
    DictSet(String, String),
    Log(String),
    HistogramAdd(f64),
    AddRow(RowId),
    SetCell {
        row: RowId,
        column: ColumnId,
        value: String,
    },
}

/// What a flush reports for one metric
#[derive(Debug, Clone, PartialEq)]
pub enum Delta {
    Counter {
        value: f64,
    },
    Gauge {
        value: f64,
        range: Option<GaugeRange>,
    },
    Pulse {
        value: f64,
    },
    Dict {
        entries: Vec<(String, String)>,
    },
    Logger {
        messages: Vec<String>,
        dropped: u64,
    },
    Histogram {
        bounds: Option<Vec<f64>>,
        counts: Vec<u64>,
    },
    Table {
        columns: Option<Vec<Column>>,
        rows: Vec<RowId>,
        cells: Vec<Cell>,
    },
}

impl Delta {
    pub fn kind(&self) -> MetricKind {
        match self {
            Delta::Counter { .. } => MetricKind::Counter,
            Delta::Gauge { .. } => MetricKind::Gauge,
            Delta::Pulse { .. } => MetricKind::Pulse,
            Delta::Dict { .. } => MetricKind::Dict,
            Delta::Logger { .. } => MetricKind::Logger,
            Delta::Histogram { .. } => MetricKind::Histogram,
            Delta::Table { .. } => MetricKind::Table,
        }
    }
}

#[derive(Debug, Default)]
pub struct CounterState {
    total: f64,
}

impl CounterState {
    pub fn total(&self) -> f64 {
        self.total
    }
}

#[derive(Debug)]
pub struct GaugeState {
    value: f64,
    range: GaugeRange,
}

impl GaugeState {
    fn new(range: GaugeRange) -> Result<Self> {
        if !range.min.is_finite() || !range.max.is_finite() || range.min > range.max {
            return Err(DashtapError::invalid_value(format!(
                "gauge range [{}, {}] must be finite and ordered",
                range.min, range.max
            )));
        }
        Ok(Self { value: 0.0, range })
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn range(&self) -> GaugeRange {
        self.range
    }
}

#[derive(Debug, Default)]
pub struct PulseState {
    value: f64,
}

impl PulseState {
    pub fn value(&self) -> f64 {
        self.value
    }
}

#[derive(Debug, Default)]
pub struct DictState {
    entries: BTreeMap<String, String>,
}

impl DictState {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Messages not yet delivered, tagged with the version that appended them
#[derive(Debug)]
pub struct LoggerState {
    pending: VecDeque<(u64, String)>,
    max_pending: Arc<AtomicUsize>,
    dropped: u64,
}

impl LoggerState {
    fn new(max_pending: Arc<AtomicUsize>) -> Self {
        Self {
            pending: VecDeque::new(),
            max_pending,
            dropped: 0,
        }
    }

    fn push(&mut self, version: u64, message: String) {
        let max_pending = self.max_pending.load(Ordering::Relaxed).max(1);
        while self.pending.len() >= max_pending {
            self.pending.pop_front();
            self.dropped += 1;
        }
        self.pending.push_back((version, message));
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[derive(Debug)]
pub struct HistogramState {
    bounds: Vec<f64>,
    /// One slot per bound plus the overflow bucket
    counts: Vec<u64>,
}

impl HistogramState {
    fn new(bounds: Vec<f64>) -> Result<Self> {
        if bounds.iter().any(|bound| !bound.is_finite()) {
            return Err(DashtapError::invalid_value("histogram bounds must be finite"));
        }
        if bounds.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(DashtapError::invalid_value(
                "histogram bounds must be strictly increasing",
            ));
        }
        let counts = vec![0; bounds.len() + 1];
        Ok(Self { bounds, counts })
    }

    /// Index of the first bucket whose bound is >= value, or the overflow slot
    #[inline]
    pub fn bucket_for(&self, value: f64) -> usize {
        self.bounds.partition_point(|bound| *bound < value)
    }

    fn add(&mut self, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(DashtapError::invalid_value(format!(
                "histogram value {} is not finite",
                value
            )));
        }
        let bucket = self.bucket_for(value);
        self.counts[bucket] += 1;
        Ok(())
    }

    pub fn bounds(&self) -> &[f64] {
        &self.bounds
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

#[derive(Debug)]
pub struct TableState {
    columns: Vec<Column>,
    rows: BTreeSet<RowId>,
    cells: BTreeMap<(RowId, ColumnId), String>,
    pending_rows: BTreeMap<RowId, u64>,
    pending_cells: BTreeMap<(RowId, ColumnId), u64>,
}

impl TableState {
    fn new(columns: Vec<Column>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for column in &columns {
            if !seen.insert(column.id) {
                return Err(DashtapError::invalid_value(format!(
                    "duplicate table column id {}",
                    column.id
                )));
            }
        }
        Ok(Self {
            columns,
            rows: BTreeSet::new(),
            cells: BTreeMap::new(),
            pending_rows: BTreeMap::new(),
            pending_cells: BTreeMap::new(),
        })
    }

    fn has_column(&self, column: ColumnId) -> bool {
        self.columns.iter().any(|c| c.id == column)
    }

    fn add_row(&mut self, version: u64, row: RowId) -> bool {
        if !self.rows.insert(row) {
            return false;
        }
        self.pending_rows.insert(row, version);
        true
    }

    fn set_cell(
        &mut self,
        table: &str,
        version: u64,
        row: RowId,
        column: ColumnId,
        value: String,
    ) -> Result<()> {
        if !self.rows.contains(&row) || !self.has_column(column) {
            return Err(DashtapError::UnknownRowOrColumn {
                table: table.to_string(),
                row,
                column,
            });
        }
        self.cells.insert((row, column), value);
        self.pending_cells.insert((row, column), version);
        Ok(())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn has_row(&self, row: RowId) -> bool {
        self.rows.contains(&row)
    }

    /// `None` when the cell was never set
    pub fn cell(&self, row: RowId, column: ColumnId) -> Option<&str> {
        self.cells.get(&(row, column)).map(String::as_str)
    }

    fn cell_list<'a>(&self, keys: impl Iterator<Item = &'a (RowId, ColumnId)>) -> Vec<Cell> {
        keys.filter_map(|key| {
            self.cells.get(key).map(|value| Cell {
                row: key.0,
                column: key.1,
                value: value.clone(),
            })
        })
        .collect()
    }
}

/// Closed sum over every metric kind
#[derive(Debug)]
pub enum MetricState {
    Counter(CounterState),
    Gauge(GaugeState),
    Pulse(PulseState),
    Dict(DictState),
    Logger(LoggerState),
    Histogram(HistogramState),
    Table(TableState),
}

impl MetricState {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricState::Counter(_) => MetricKind::Counter,
            MetricState::Gauge(_) => MetricKind::Gauge,
            MetricState::Pulse(_) => MetricKind::Pulse,
            MetricState::Dict(_) => MetricKind::Dict,
            MetricState::Logger(_) => MetricKind::Logger,
            MetricState::Histogram(_) => MetricKind::Histogram,
            MetricState::Table(_) => MetricKind::Table,
        }
    }

    /// Apply a mutation stamped with `version`.
    ///
    /// Returns `false` when the mutation left the state untouched.
    pub(crate) fn apply(&mut self, id: &MetricId, mutation: Mutation, version: u64) -> Result<bool> {
        match (self, mutation) {
            (MetricState::Counter(s), Mutation::CounterInc(delta)) => s.total += delta,
            (MetricState::Gauge(s), Mutation::GaugeSet(value)) => s.value = value,
            (MetricState::Pulse(s), Mutation::PulseSet(value)) => s.value = value,
            (MetricState::Pulse(s), Mutation::PulseInc(delta)) => s.value += delta,
            (MetricState::Dict(s), Mutation::DictSet(key, value)) => {
                s.entries.insert(key, value);
            },
            (MetricState::Logger(s), Mutation::Log(message)) => s.push(version, message),
            (MetricState::Histogram(s), Mutation::HistogramAdd(value)) => s.add(value)?,
            (MetricState::Table(s), Mutation::AddRow(row)) => return Ok(s.add_row(version, row)),
            (MetricState::Table(s), Mutation::SetCell { row, column, value }) => {
                s.set_cell(id.name(), version, row, column, value)?
            },
            (state, mutation) => {
                return Err(DashtapError::invalid_value(format!(
                    "{:?} does not apply to {} '{}'",
                    mutation,
                    state.kind(),
                    id.name()
                )))
            },
        }
        Ok(true)
    }

    /// Capture what the next flush must report.
    ///
    /// `first_appearance` adds the metadata a consumer needs before it can
    /// interpret values: gauge range, histogram bounds, full table schema.
    pub(crate) fn snapshot(&self, first_appearance: bool) -> Delta {
        match self {
            MetricState::Counter(s) => Delta::Counter { value: s.total },
            MetricState::Gauge(s) => Delta::Gauge {
                value: s.value,
                range: first_appearance.then_some(s.range),
            },
            MetricState::Pulse(s) => Delta::Pulse { value: s.value },
            MetricState::Dict(s) => Delta::Dict {
                entries: s.entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            },
            MetricState::Logger(s) => Delta::Logger {
                messages: s.pending.iter().map(|(_, message)| message.clone()).collect(),
                dropped: s.dropped,
            },
            MetricState::Histogram(s) => Delta::Histogram {
                bounds: first_appearance.then(|| s.bounds.clone()),
                counts: s.counts.clone(),
            },
            MetricState::Table(s) if first_appearance => Delta::Table {
                columns: Some(s.columns.clone()),
                rows: s.rows.iter().copied().collect(),
                cells: s.cell_list(s.cells.keys()),
            },
            MetricState::Table(s) => Delta::Table {
                columns: None,
                rows: s.pending_rows.keys().copied().collect(),
                cells: s.cell_list(s.pending_cells.keys()),
            },
        }
    }

    /// Forget pending data delivered by a snapshot taken at `version`
    pub(crate) fn commit(&mut self, version: u64, delivered: &Delta) {
        match (self, delivered) {
            (MetricState::Logger(s), Delta::Logger { messages, dropped }) => {
                let mut removed = 0;
                while s.pending.front().is_some_and(|(stamp, _)| *stamp <= version) {
                    s.pending.pop_front();
                    removed += 1;
                }
                // Delivered messages evicted after the snapshot were counted as drops
                let evicted_after_snapshot = messages.len().saturating_sub(removed) as u64;
                s.dropped = s.dropped.saturating_sub(*dropped + evicted_after_snapshot);
            },
            (MetricState::Table(s), Delta::Table { .. }) => {
                s.pending_rows.retain(|_, stamp| *stamp > version);
                s.pending_cells.retain(|_, stamp| *stamp > version);
            },
            _ => {},
        }
    }
}
