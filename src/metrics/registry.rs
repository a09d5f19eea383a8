//! Process-wide metric registry with change tracking.
//!
//! Each metric lives behind its own lock. A lock-free queue holds the metrics
//! that changed since they were last reported, so a flush only touches dirty
//! metrics and never holds the map while snapshotting.

use crate::core::{DashtapError, Result};
use crate::metrics::changeset::{Change, ChangeSet};
use crate::metrics::id::{MetricId, MetricKind};
use crate::metrics::state::{MetricSpec, MetricState, Mutation};
use crossbeam::queue::SegQueue;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Default bound on unreported logger messages
pub const DEFAULT_MAX_PENDING_LOG_MESSAGES: usize = 1000;

static GLOBAL_REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

type DirtyQueue = SegQueue<Arc<Metric>>;

/// Tracked state guarded by the metric lock
#[derive(Debug)]
pub(crate) struct Tracked {
    pub(crate) state: MetricState,
    /// Bumped by every effective mutation
    pub(crate) version: u64,
    /// Present in the dirty queue
    pub(crate) queued: bool,
    /// First-appearance metadata reached the current consumer
    pub(crate) announced: bool,
}

/// A registered metric: identity plus locked state
#[derive(Debug)]
pub struct Metric {
    id: MetricId,
    tracked: Mutex<Tracked>,
    dirty: Weak<DirtyQueue>,
}

impl Metric {
    #[inline]
    pub fn id(&self) -> &MetricId {
        &self.id
    }

    /// Apply a mutation and mark the metric dirty
    pub(crate) fn apply(self: &Arc<Self>, mutation: Mutation) -> Result<()> {
        let mut tracked = self.tracked.lock();
        let version = tracked.version + 1;
        if tracked.state.apply(&self.id, mutation, version)? {
            tracked.version = version;
            self.mark_dirty(&mut tracked);
        }
        Ok(())
    }

    /// Read the current state under the metric lock
    pub fn inspect<R>(&self, f: impl FnOnce(&MetricState) -> R) -> R {
        f(&self.tracked.lock().state)
    }

    /// Whether the metric has changes no flush has delivered yet
    pub fn is_dirty(&self) -> bool {
        self.tracked.lock().queued
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Tracked> {
        self.tracked.lock()
    }

    /// Queue the metric for the next flush unless it is already queued
    pub(crate) fn mark_dirty(self: &Arc<Self>, tracked: &mut Tracked) {
        if tracked.queued {
            return;
        }
        if let Some(queue) = self.dirty.upgrade() {
            tracked.queued = true;
            queue.push(Arc::clone(self));
        }
    }

    /// Read value and dirty mark together, leaving the metric clean
    fn take_snapshot(self: &Arc<Self>) -> Change {
        let mut tracked = self.tracked.lock();
        tracked.queued = false;
        let first_appearance = !tracked.announced;
        let delta = tracked.state.snapshot(first_appearance);
        Change::new(Arc::clone(self), tracked.version, first_appearance, delta)
    }
}

#[derive(Debug)]
struct RegistryInner {
    metrics: DashMap<String, Arc<Metric>>,
    dirty: Arc<DirtyQueue>,
    active: AtomicBool,
    /// Shared with every logger, which reads it on each push
    max_pending_log_messages: Arc<AtomicUsize>,
}

/// Name-keyed registry of metrics.
///
/// Cloning is cheap and every clone refers to the same metrics.
#[derive(Debug, Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                metrics: DashMap::new(),
                dirty: Arc::new(SegQueue::new()),
                active: AtomicBool::new(false),
                max_pending_log_messages: Arc::new(AtomicUsize::new(DEFAULT_MAX_PENDING_LOG_MESSAGES)),
            }),
        }
    }

    /// The process default registry used by `create` constructors and `install`
    pub fn global() -> &'static Registry {
        &GLOBAL_REGISTRY
    }

    /// Return the metric registered as `name`, creating it from `spec` if absent.
    ///
    /// An existing metric of the same kind is returned as is, whatever `spec`
    /// says about ranges, bounds or columns. A different kind is an error.
    pub fn get_or_create(&self, name: &str, spec: MetricSpec) -> Result<Arc<Metric>> {
        let kind = spec.kind();
        if let Some(existing) = self.inner.metrics.get(name) {
            return check_kind(existing.value(), kind);
        }

        let id = MetricId::new(name, kind)?;
        match self.inner.metrics.entry(name.to_string()) {
            Entry::Occupied(entry) => check_kind(entry.get(), kind),
            Entry::Vacant(entry) => {
                let state = spec.build(&self.inner.max_pending_log_messages)?;
                let metric = Arc::new(Metric {
                    id,
                    tracked: Mutex::new(Tracked {
                        state,
                        version: 0,
                        queued: false,
                        announced: false,
                    }),
                    dirty: Arc::downgrade(&self.inner.dirty),
                });
                entry.insert(Arc::clone(&metric));
                metric.mark_dirty(&mut metric.lock());
                tracing::debug!(metric = %metric.id(), "registered metric");
                Ok(metric)
            },
        }
    }

    /// Look up a metric by name
    pub fn get(&self, name: &str) -> Option<Arc<Metric>> {
        self.inner.metrics.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.inner.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.metrics.is_empty()
    }

    /// Number of metrics waiting for the next flush
    pub fn dirty_count(&self) -> usize {
        self.inner.dirty.len()
    }

    /// Drain the dirty queue into a change set.
    ///
    /// Metrics are snapshotted one at a time under their own lock. A metric
    /// that is mutated and requeued while the drain runs stays queued for the
    /// next cycle instead of appearing twice.
    pub fn snapshot_dirty(&self) -> ChangeSet {
        let queue = &self.inner.dirty;
        let mut seen = HashSet::new();
        let mut requeue = Vec::new();
        let mut changes = Vec::with_capacity(queue.len());

        for _ in 0..queue.len() {
            let Some(metric) = queue.pop() else { break };
            if seen.insert(Arc::as_ptr(&metric)) {
                changes.push(metric.take_snapshot());
            } else {
                requeue.push(metric);
            }
        }

        for metric in requeue {
            queue.push(metric);
        }

        ChangeSet::new(changes)
    }

    /// Mark every metric dirty and unannounced so a new consumer receives full state
    pub fn resync(&self) {
        let metrics: Vec<Arc<Metric>> =
            self.inner.metrics.iter().map(|entry| Arc::clone(entry.value())).collect();

        for metric in &metrics {
            let mut tracked = metric.lock();
            tracked.announced = false;
            metric.mark_dirty(&mut tracked);
        }

        tracing::debug!(metrics = metrics.len(), "registry resynced");
    }

    /// Whether a running reporter is attached
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.inner.active.store(active, Ordering::Release);
    }

    /// Bound on undelivered messages for every logger in this registry,
    /// including loggers created before the call
    pub fn set_max_pending_log_messages(&self, max: usize) {
        self.inner.max_pending_log_messages.store(max.max(1), Ordering::Relaxed);
    }
}

fn check_kind(metric: &Arc<Metric>, requested: MetricKind) -> Result<Arc<Metric>> {
    let existing = metric.id().kind();
    if existing != requested {
        return Err(DashtapError::KindMismatch {
            name: metric.id().name().to_string(),
            existing,
            requested,
        });
    }
    Ok(Arc::clone(metric))
}
