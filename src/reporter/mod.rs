//! Reporting lifecycle: a registry, a transport and the flush loop that
//! connects them, running on a dedicated thread.
//!
//! [`Reporter`] is the explicit, testable owner of one pipeline. [`install`]
//! wraps it in a process-wide instance bound to [`Registry::global`] so that
//! `create` constructors report without passing handles around.

pub mod flush;
pub mod stats;

pub use flush::CycleOutcome;
pub use stats::{ReporterStats, StatsSnapshot};

use crate::core::{Config, DashtapError, Result};
use crate::metrics::Registry;
use crate::transport::{transport_for, Transport};
use flush::{Command, FlushLoop};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};

static INSTALLED: OnceCell<Reporter> = OnceCell::new();

/// Handle to a running flush loop.
///
/// Dropping the reporter shuts it down, including a final best-effort flush.
#[derive(Debug)]
pub struct Reporter {
    registry: Registry,
    stats: Arc<ReporterStats>,
    commands: mpsc::UnboundedSender<Command>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Reporter {
    /// Start reporting a fresh registry to the configured transport
    pub fn start(config: Config) -> Result<Self> {
        let transport = transport_for(&config.transport);
        Self::start_with(config, Registry::new(), transport)
    }

    /// Start reporting `registry` through `transport`
    pub fn start_with(config: Config, registry: Registry, transport: Box<dyn Transport>) -> Result<Self> {
        config.validate()?;
        registry.set_max_pending_log_messages(config.limits.max_pending_log_messages);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        tracing::info!(
            app = %config.app_name,
            transport = %transport.describe(),
            interval = ?config.reporter.flush_interval,
            "starting reporter"
        );

        let stats = Arc::new(ReporterStats::new());
        let (commands, receiver) = mpsc::unbounded_channel();
        let flush_loop = FlushLoop::new(config, registry.clone(), transport, Arc::clone(&stats));

        let worker = std::thread::Builder::new()
            .name("dashtap-flush".to_string())
            .spawn(move || runtime.block_on(flush_loop.run(receiver)))?;

        registry.set_active(true);
        Ok(Self {
            registry,
            stats,
            commands,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Registry this reporter delivers
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    /// Run one flush cycle now and wait for its outcome.
    ///
    /// Blocks the calling thread; use [`Reporter::flush_async`] from inside
    /// an async runtime.
    pub fn flush(&self) -> Result<CycleOutcome> {
        let reply = self.request_flush()?;
        reply.blocking_recv().map_err(|_| DashtapError::ReporterStopped)
    }

    pub async fn flush_async(&self) -> Result<CycleOutcome> {
        let reply = self.request_flush()?;
        reply.await.map_err(|_| DashtapError::ReporterStopped)
    }

    fn request_flush(&self) -> Result<oneshot::Receiver<CycleOutcome>> {
        let (reply, receiver) = oneshot::channel();
        self.commands
            .send(Command::Flush(reply))
            .map_err(|_| DashtapError::ReporterStopped)?;
        Ok(receiver)
    }

    /// Stop the flush loop after a final flush and wait for its thread.
    ///
    /// Later calls do nothing.
    pub fn shutdown(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };

        let _ = self.commands.send(Command::Shutdown);
        if worker.join().is_err() {
            tracing::error!("flush thread panicked");
        }

        self.registry.set_active(false);
        let stats = self.stats.snapshot();
        tracing::info!(
            delivered = stats.delivered,
            failed = stats.failed,
            skipped = stats.skipped,
            "reporter stopped"
        );
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Start the process-wide reporter for [`Registry::global`].
///
/// Only the first call starts anything; later calls return the same
/// reporter and ignore their configuration. The configured logger bound
/// also applies to loggers created before the call.
pub fn install(config: Config) -> Result<&'static Reporter> {
    INSTALLED.get_or_try_init(|| {
        let transport = transport_for(&config.transport);
        Reporter::start_with(config, Registry::global().clone(), transport)
    })
}

/// [`install`] with configuration read by [`Config::from_env`]
pub fn install_from_env(app_name: &str) -> Result<&'static Reporter> {
    if let Some(reporter) = INSTALLED.get() {
        return Ok(reporter);
    }
    install(Config::from_env(app_name)?)
}

/// The process-wide reporter, if installed
pub fn installed() -> Option<&'static Reporter> {
    INSTALLED.get()
}

/// Stop the process-wide reporter. It stays installed but no longer runs.
pub fn shutdown() {
    if let Some(reporter) = INSTALLED.get() {
        reporter.shutdown();
    }
}
