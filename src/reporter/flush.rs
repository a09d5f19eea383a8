//! The flush loop: one task that snapshots, encodes and delivers.
//!
//! Cycles run strictly one after another. A tick that comes due while a
//! cycle is still sending is never stacked behind it; it is either dropped
//! and counted, or replayed within the configured queue depth.

use crate::core::{BackpressurePolicy, Config, DashtapError, Result};
use crate::metrics::Registry;
use crate::reporter::stats::ReporterStats;
use crate::transport::Transport;
use crate::wire::{Batch, Serializer};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout, Instant, MissedTickBehavior};

/// Result of one flush cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every packet reached the consumer and its metrics were committed
    Delivered { packets: usize, frames: usize, bytes: usize },
    /// Nothing deliverable was dirty
    Empty,
    /// Delivery failed; every undelivered metric stays dirty
    Failed { reason: String },
    /// The cycle did not run
    Skipped,
}

impl CycleOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, CycleOutcome::Delivered { .. })
    }
}

/// Requests from the reporter handle
#[derive(Debug)]
pub(crate) enum Command {
    Flush(oneshot::Sender<CycleOutcome>),
    Shutdown,
}

pub(crate) struct FlushLoop {
    config: Config,
    registry: Registry,
    transport: Box<dyn Transport>,
    serializer: Serializer,
    stats: Arc<ReporterStats>,
    consecutive_failures: u64,
}

impl FlushLoop {
    pub(crate) fn new(
        config: Config,
        registry: Registry,
        transport: Box<dyn Transport>,
        stats: Arc<ReporterStats>,
    ) -> Self {
        let serializer =
            Serializer::new(config.app_name.clone()).with_packet_limit(config.limits.max_packet_bytes);
        Self {
            config,
            registry,
            transport,
            serializer,
            stats,
            consecutive_failures: 0,
        }
    }

    /// Run until a shutdown command arrives or every reporter handle is gone
    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let period = self.config.reporter.flush_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Instant::now();
                    let missed = missed_ticks(now.duration_since(last_tick), period);
                    last_tick = now;
                    self.on_tick(missed).await;
                }
                command = commands.recv() => match command {
                    Some(Command::Flush(reply)) => {
                        let outcome = self.run_cycle().await;
                        let _ = reply.send(outcome);
                    },
                    Some(Command::Shutdown) | None => break,
                },
            }
        }

        // Flush requests queued behind the shutdown get a final answer
        commands.close();
        while let Ok(command) = commands.try_recv() {
            if let Command::Flush(reply) = command {
                let _ = reply.send(CycleOutcome::Skipped);
            }
        }

        self.finish().await;
    }

    async fn on_tick(&mut self, missed: u64) {
        let replay = match self.config.reporter.backpressure {
            BackpressurePolicy::Skip => 0,
            BackpressurePolicy::Queue { depth } => missed.min(depth as u64),
        };

        let dropped = missed - replay;
        if dropped > 0 {
            let total = self.stats.record_skipped(dropped);
            tracing::trace!(dropped, "{}", DashtapError::SchedulerStalled { skipped: total });
        }

        for _ in 0..replay {
            self.run_cycle().await;
        }
        self.run_cycle().await;
    }

    /// Connect, snapshot, encode, send, then commit or roll back.
    ///
    /// A change set larger than one packet goes out as several. Each packet
    /// is committed once sent, so a failure part way through only rolls back
    /// the packets that did not reach the consumer.
    pub(crate) async fn run_cycle(&mut self) -> CycleOutcome {
        if let Err(e) = self.ensure_session().await {
            return self.failed(e);
        }

        let changes = self.registry.snapshot_dirty();
        if changes.is_empty() {
            self.stats.record_empty();
            return CycleOutcome::Empty;
        }

        let Batch { packets, oversized } = match self.serializer.encode_batch(changes) {
            Ok(batch) => batch,
            Err(e) => return self.failed(e),
        };

        if !oversized.is_empty() {
            let names: Vec<&str> = oversized.iter().map(|change| change.id().name()).collect();
            tracing::warn!(
                limit = self.config.limits.max_packet_bytes,
                "dropping undeliverable metrics larger than one packet: {}",
                names.join(", ")
            );
            self.stats.record_oversized(oversized.len());
            oversized.discard();
        }

        if packets.is_empty() {
            self.stats.record_empty();
            return CycleOutcome::Empty;
        }

        let packet_count = packets.len();
        let mut frames = 0;
        let mut bytes = 0;
        for (encoded, changes) in packets {
            if let Err(e) = self.send(encoded.bytes.clone()).await {
                self.transport.reset();
                changes.rollback();
                return self.failed(e);
            }

            changes.commit();
            self.serializer.acknowledge(&encoded);
            self.stats.record_packet(encoded.frames, encoded.bytes.len());
            frames += encoded.frames;
            bytes += encoded.bytes.len();
            tracing::debug!(
                frames = encoded.frames,
                bytes = encoded.bytes.len(),
                sequence = encoded.sequence,
                "flushed"
            );
        }

        self.stats.record_delivery();
        if self.consecutive_failures > 0 {
            tracing::info!(
                failures = self.consecutive_failures,
                "delivery to {} recovered",
                self.transport.describe()
            );
            self.consecutive_failures = 0;
        }
        CycleOutcome::Delivered {
            packets: packet_count,
            frames,
            bytes,
        }
    }

    async fn send(&mut self, packet: Bytes) -> Result<()> {
        let send_timeout = self.config.transport.send_timeout;
        match timeout(send_timeout, self.transport.send(packet)).await {
            Ok(result) => result,
            Err(_) => Err(timeout_error(send_timeout)),
        }
    }

    /// Connect if needed; a new consumer session resends everything
    async fn ensure_session(&mut self) -> Result<()> {
        let connect_timeout = self.config.transport.connect_timeout;
        let connected = match timeout(connect_timeout, self.transport.connect()).await {
            Ok(result) => result,
            Err(_) => Err(timeout_error(connect_timeout)),
        };
        let new_session = match connected {
            Ok(new_session) => new_session,
            Err(e) => {
                self.transport.reset();
                return Err(e);
            },
        };

        if new_session {
            self.stats.record_session();
            self.serializer.reset_sequence();
            self.registry.resync();
            tracing::info!("consumer session started on {}", self.transport.describe());
        }
        Ok(())
    }

    fn failed(&mut self, error: DashtapError) -> CycleOutcome {
        self.stats.record_failure();
        self.consecutive_failures += 1;
        if self.consecutive_failures == 1 {
            tracing::warn!(
                category = error.category(),
                "flush to {} failed, metrics kept for the next cycle: {}",
                self.transport.describe(),
                error
            );
        } else {
            tracing::debug!(failures = self.consecutive_failures, "flush failed: {}", error);
        }
        CycleOutcome::Failed {
            reason: error.to_string(),
        }
    }

    /// Best-effort final delivery, then close the transport
    async fn finish(&mut self) {
        let grace = self.config.reporter.shutdown_timeout;
        match timeout(grace, self.run_cycle()).await {
            Ok(outcome) => tracing::debug!(?outcome, "final flush"),
            Err(_) => tracing::warn!("final flush abandoned after {:?}", grace),
        }

        if let Err(e) = self.transport.close().await {
            tracing::debug!("closing {} failed: {}", self.transport.describe(), e);
        }
    }
}

/// Whole periods that elapsed beyond the one a tick accounts for
fn missed_ticks(elapsed: Duration, period: Duration) -> u64 {
    let periods = elapsed.as_nanos() / period.as_nanos().max(1);
    u64::try_from(periods).unwrap_or(u64::MAX).saturating_sub(1)
}

fn timeout_error(limit: Duration) -> DashtapError {
    DashtapError::Timeout {
        timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ConfigBuilder;
    use crate::metrics::{Counter, Logger};
    use crate::transport::ChannelTransport;
    use crate::wire::{Payload, PacketDecoder};

    fn flush_loop(registry: &Registry) -> (FlushLoop, crossbeam_channel::Receiver<bytes::Bytes>) {
        flush_loop_with(ConfigBuilder::new().app_name("unit"), registry)
    }

    fn flush_loop_with(
        builder: ConfigBuilder,
        registry: &Registry,
    ) -> (FlushLoop, crossbeam_channel::Receiver<bytes::Bytes>) {
        let config = builder.build().unwrap();
        let (transport, receiver) = ChannelTransport::unbounded();
        let stats = Arc::new(ReporterStats::new());
        (FlushLoop::new(config, registry.clone(), Box::new(transport), stats), receiver)
    }

    #[test]
    fn test_missed_ticks() {
        let period = Duration::from_millis(100);
        assert_eq!(missed_ticks(Duration::from_millis(100), period), 0);
        assert_eq!(missed_ticks(Duration::from_millis(150), period), 0);
        assert_eq!(missed_ticks(Duration::from_millis(350), period), 2);
        assert_eq!(missed_ticks(Duration::ZERO, period), 0);
    }

    #[tokio::test]
    async fn test_cycle_delivers_then_empty() {
        let registry = Registry::new();
        let counter = Counter::new(&registry, "c").unwrap();
        counter.inc(2.0);

        let (mut flush, receiver) = flush_loop(&registry);
        match flush.run_cycle().await {
            CycleOutcome::Delivered { packets, frames, bytes } => {
                assert_eq!(packets, 1);
                assert_eq!(frames, 1);
                assert_eq!(bytes, receiver.try_recv().unwrap().len());
            },
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(flush.run_cycle().await, CycleOutcome::Empty);
        assert!(receiver.try_recv().is_err());
        assert_eq!(flush.stats.snapshot().sessions, 1);
    }

    #[tokio::test]
    async fn test_failed_send_rolls_back() {
        let registry = Registry::new();
        let counter = Counter::new(&registry, "c").unwrap();
        counter.inc(1.0);

        let (mut flush, receiver) = flush_loop(&registry);
        drop(receiver);
        assert!(matches!(flush.run_cycle().await, CycleOutcome::Failed { .. }));
        assert!(counter.metric().is_dirty());
        assert_eq!(flush.stats.snapshot().failed, 1);
    }

    #[tokio::test]
    async fn test_queue_policy_replays_up_to_depth() {
        let registry = Registry::new();
        let builder = ConfigBuilder::new()
            .app_name("unit")
            .backpressure(BackpressurePolicy::Queue { depth: 2 });
        let (mut flush, _receiver) = flush_loop_with(builder, &registry);

        flush.on_tick(5).await;
        let stats = flush.stats.snapshot();
        assert_eq!(stats.cycles, 3);
        assert_eq!(stats.skipped, 3);

        flush.on_tick(1).await;
        let stats = flush.stats.snapshot();
        assert_eq!(stats.cycles, 5);
        assert_eq!(stats.skipped, 3);
    }

    #[tokio::test]
    async fn test_skip_policy_counts_every_missed_tick() {
        let registry = Registry::new();
        let builder = ConfigBuilder::new().app_name("unit").backpressure(BackpressurePolicy::Skip);
        let (mut flush, _receiver) = flush_loop_with(builder, &registry);

        flush.on_tick(4).await;
        let stats = flush.stats.snapshot();
        assert_eq!(stats.cycles, 1);
        assert_eq!(stats.skipped, 4);
    }

    #[tokio::test]
    async fn test_large_change_set_is_split() {
        let registry = Registry::new();
        for name in ["a", "b", "c"] {
            Logger::new(&registry, name).unwrap().log("x".repeat(3000));
        }
        let builder = ConfigBuilder::new().app_name("unit").max_packet_bytes(8 * 1024);
        let (mut flush, receiver) = flush_loop_with(builder, &registry);

        match flush.run_cycle().await {
            CycleOutcome::Delivered { packets, frames, .. } => {
                assert_eq!(packets, 2);
                assert_eq!(frames, 3);
            },
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(receiver.try_iter().count(), 2);
        assert_eq!(flush.stats.snapshot().packets, 2);
        assert_eq!(registry.dirty_count(), 0);
    }

    #[tokio::test]
    async fn test_packet_carries_source() {
        let registry = Registry::new();
        Counter::new(&registry, "c").unwrap().inc(1.0);

        let (mut flush, receiver) = flush_loop(&registry);
        assert!(flush.run_cycle().await.is_delivered());

        let mut decoder = PacketDecoder::new();
        decoder.extend(&receiver.try_recv().unwrap());
        let packet = decoder.next_packet().unwrap().unwrap();
        assert_eq!(packet.source, "unit");
        assert_eq!(packet.frame("c").unwrap().payload, Payload::Counter { value: 1.0 });
    }
}
