//! The set of metric changes captured by one flush cycle.

use crate::metrics::id::MetricId;
use crate::metrics::registry::Metric;
use crate::metrics::state::Delta;
use std::sync::Arc;

/// One metric's captured state
#[derive(Debug)]
pub struct Change {
    metric: Arc<Metric>,
    version: u64,
    first_appearance: bool,
    delta: Delta,
}

impl Change {
    pub(crate) fn new(metric: Arc<Metric>, version: u64, first_appearance: bool, delta: Delta) -> Self {
        Self {
            metric,
            version,
            first_appearance,
            delta,
        }
    }

    pub fn id(&self) -> &MetricId {
        self.metric.id()
    }

    pub fn delta(&self) -> &Delta {
        &self.delta
    }

    /// Metric version the snapshot was taken at
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Carries the metadata a consumer needs before reading values
    pub fn is_first_appearance(&self) -> bool {
        self.first_appearance
    }

    fn commit(&self) {
        let mut tracked = self.metric.lock();
        tracked.state.commit(self.version, &self.delta);
        if self.first_appearance {
            tracked.announced = true;
        }
    }

    fn rollback(&self) {
        let mut tracked = self.metric.lock();
        self.metric.mark_dirty(&mut tracked);
    }

    /// Forget the captured data without announcing the metric
    fn discard(&self) {
        self.metric.lock().state.commit(self.version, &self.delta);
    }
}

/// Snapshot of every dirty metric at one flush point.
///
/// A change set must be resolved with [`ChangeSet::commit`] once delivered.
/// Dropping it unresolved, or calling [`ChangeSet::rollback`], returns every
/// metric to the dirty queue so the next cycle reports it again.
#[derive(Debug, Default)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    pub(crate) fn new(changes: Vec<Change>) -> Self {
        Self { changes }
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Change> {
        self.changes.iter()
    }

    /// Find the change for a metric name
    pub fn get(&self, name: &str) -> Option<&Change> {
        self.changes.iter().find(|change| change.id().name() == name)
    }

    /// Mark the captured state as delivered
    pub fn commit(mut self) {
        for change in std::mem::take(&mut self.changes) {
            change.commit();
        }
    }

    /// Return every captured metric to the dirty queue
    pub fn rollback(mut self) {
        self.rollback_pending();
    }

    /// Drop the captured data undelivered.
    ///
    /// Metrics stay clean until their next mutation, which is reported with
    /// full first-appearance metadata.
    pub fn discard(mut self) {
        for change in std::mem::take(&mut self.changes) {
            change.discard();
        }
    }

    /// Distribute the changes over `parts` sets, the i-th change going to
    /// `part_of(i)`. Out of range parts land in the last set.
    pub(crate) fn split(mut self, parts: usize, part_of: impl Fn(usize) -> usize) -> Vec<ChangeSet> {
        let last = parts.max(1) - 1;
        let mut sets: Vec<ChangeSet> = (0..=last).map(|_| ChangeSet::default()).collect();
        for (index, change) in std::mem::take(&mut self.changes).into_iter().enumerate() {
            sets[part_of(index).min(last)].changes.push(change);
        }
        sets
    }

    fn rollback_pending(&mut self) {
        for change in std::mem::take(&mut self.changes) {
            change.rollback();
        }
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a Change;
    type IntoIter = std::slice::Iter<'a, Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

impl Drop for ChangeSet {
    fn drop(&mut self) {
        self.rollback_pending();
    }
}

#[cfg(test)]
mod tests {
    use crate::metrics::registry::Registry;
    use crate::metrics::state::{Delta, MetricSpec, Mutation};

    #[test]
    fn test_rollback_keeps_metrics_dirty() {
        let registry = Registry::new();
        let counter = registry.get_or_create("c", MetricSpec::Counter).unwrap();
        counter.apply(Mutation::CounterInc(1.0)).unwrap();

        registry.snapshot_dirty().rollback();
        assert!(counter.is_dirty());

        counter.apply(Mutation::CounterInc(2.0)).unwrap();
        let changes = registry.snapshot_dirty();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes.get("c").unwrap().delta(), &Delta::Counter { value: 3.0 });
        changes.commit();
        assert!(!counter.is_dirty());
    }

    #[test]
    fn test_drop_rolls_back() {
        let registry = Registry::new();
        let counter = registry.get_or_create("c", MetricSpec::Counter).unwrap();
        drop(registry.snapshot_dirty());
        assert!(counter.is_dirty());
        assert_eq!(registry.snapshot_dirty().len(), 1);
    }

    #[test]
    fn test_failed_first_appearance_is_resent() {
        let registry = Registry::new();
        registry.get_or_create("g", MetricSpec::Gauge { min: 0.0, max: 100.0 }).unwrap();

        let first = registry.snapshot_dirty();
        assert!(first.get("g").unwrap().is_first_appearance());
        first.rollback();

        let retry = registry.snapshot_dirty();
        assert!(retry.get("g").unwrap().is_first_appearance());
        retry.commit();
    }

    #[test]
    fn test_split_resolves_parts_independently() {
        let registry = Registry::new();
        let a = registry.get_or_create("a", MetricSpec::Counter).unwrap();
        let b = registry.get_or_create("b", MetricSpec::Counter).unwrap();
        let c = registry.get_or_create("c", MetricSpec::Counter).unwrap();

        let changes = registry.snapshot_dirty();
        let order: Vec<String> = changes.iter().map(|change| change.id().name().to_string()).collect();
        let mut parts = changes.split(2, |index| usize::from(order[index] != "a")).into_iter();

        parts.next().unwrap().commit();
        drop(parts);
        assert!(!a.is_dirty());
        assert!(b.is_dirty());
        assert!(c.is_dirty());
    }

    #[test]
    fn test_discard_forgets_data_and_keeps_metric_unannounced() {
        let registry = Registry::new();
        let logger = registry.get_or_create("log", MetricSpec::Logger).unwrap();
        logger.apply(Mutation::Log("huge".into())).unwrap();

        registry.snapshot_dirty().discard();
        assert!(!logger.is_dirty());

        logger.apply(Mutation::Log("next".into())).unwrap();
        let changes = registry.snapshot_dirty();
        let change = changes.get("log").unwrap();
        assert!(change.is_first_appearance());
        assert_eq!(change.delta(), &Delta::Logger { messages: vec!["next".to_string()], dropped: 0 });
        changes.commit();
    }

    #[test]
    fn test_mutation_after_snapshot_survives_commit() {
        let registry = Registry::new();
        let logger = registry.get_or_create("log", MetricSpec::Logger).unwrap();
        logger.apply(Mutation::Log("one".into())).unwrap();

        let changes = registry.snapshot_dirty();
        logger.apply(Mutation::Log("two".into())).unwrap();
        changes.commit();

        assert!(logger.is_dirty());
        let next = registry.snapshot_dirty();
        assert_eq!(
            next.get("log").unwrap().delta(),
            &Delta::Logger { messages: vec!["two".to_string()], dropped: 0 }
        );
    }
}
