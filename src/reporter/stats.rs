//! Flush loop counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Counters updated by the flush loop and read from any thread
#[derive(Debug, Default)]
pub struct ReporterStats {
    cycles: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    empty: AtomicU64,
    skipped: AtomicU64,
    packets: AtomicU64,
    frames: AtomicU64,
    oversized: AtomicU64,
    bytes: AtomicU64,
    sessions: AtomicU64,
    /// Milliseconds since the epoch, 0 when nothing was delivered yet
    last_delivery_ms: AtomicU64,
}

/// Point-in-time copy of [`ReporterStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    /// Flush cycles that ran, whatever their outcome
    pub cycles: u64,
    /// Cycles whose packets all reached the consumer
    pub delivered: u64,
    /// Cycles that could not deliver and rolled back
    pub failed: u64,
    /// Cycles with nothing dirty
    pub empty: u64,
    /// Ticks dropped because a previous cycle was still running
    pub skipped: u64,
    /// Packets delivered in total
    pub packets: u64,
    /// Frames delivered in total
    pub frames: u64,
    /// Frames dropped because alone they exceed the packet limit
    pub oversized: u64,
    /// Bytes delivered in total
    pub bytes: u64,
    /// Consumer sessions started
    pub sessions: u64,
    pub last_delivery: Option<SystemTime>,
}

impl ReporterStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_delivery(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// One packet reached the consumer
    pub(crate) fn record_packet(&self, frames: usize, bytes: usize) {
        self.packets.fetch_add(1, Ordering::Relaxed);
        self.frames.fetch_add(frames as u64, Ordering::Relaxed);
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);

        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        self.last_delivery_ms.store(now_ms.max(1), Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_empty(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.empty.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the running total
    pub(crate) fn record_skipped(&self, ticks: u64) -> u64 {
        self.skipped.fetch_add(ticks, Ordering::Relaxed) + ticks
    }

    pub(crate) fn record_oversized(&self, frames: usize) {
        self.oversized.fetch_add(frames as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_session(&self) {
        self.sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let last_ms = self.last_delivery_ms.load(Ordering::Relaxed);
        StatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            empty: self.empty.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            packets: self.packets.load(Ordering::Relaxed),
            frames: self.frames.load(Ordering::Relaxed),
            oversized: self.oversized.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            sessions: self.sessions.load(Ordering::Relaxed),
            last_delivery: (last_ms > 0).then(|| UNIX_EPOCH + Duration::from_millis(last_ms)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_outcome_counts_as_cycle() {
        let stats = ReporterStats::new();
        stats.record_packet(3, 120);
        stats.record_packet(1, 30);
        stats.record_delivery();
        stats.record_failure();
        stats.record_empty();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.cycles, 3);
        assert_eq!(snapshot.delivered, 1);
        assert_eq!(snapshot.packets, 2);
        assert_eq!(snapshot.frames, 4);
        assert_eq!(snapshot.bytes, 150);
        assert!(snapshot.last_delivery.is_some());
    }

    #[test]
    fn test_skipped_total() {
        let stats = ReporterStats::new();
        assert_eq!(stats.record_skipped(2), 2);
        assert_eq!(stats.record_skipped(3), 5);
        assert_eq!(stats.snapshot().cycles, 0);
        assert_eq!(stats.snapshot().last_delivery, None);
    }
}
