//! dashtap - live metric reporting for running processes.
//!
//! Application code creates named metric handles and mutates them from any
//! thread. A background flush loop periodically collects only the metrics
//! that changed, encodes them into one packet, and delivers it to an
//! external consumer such as a dashboard.
//!
//! # Features
//!
//! - **Seven metric kinds**: counter, gauge, pulse, dict, logger, histogram, table
//! - **Change tracking**: unchanged metrics cost nothing per flush
//! - **Fail-silent delivery**: an absent or slow consumer never blocks or
//!   errors application threads; undelivered changes are retried next cycle
//! - **Self-describing wire format**: versioned, length-prefixed packets
//!
//! # Architecture
//!
//! - `core`: configuration and errors
//! - `metrics`: registry, change tracking and typed handles
//! - `wire`: packet format and codec
//! - `transport`: delivery media (TCP, in-process channel, discard)
//! - `reporter`: flush loop and process lifecycle
//! - `cli`: the `dashtap` debug consumer
//!
//! # Example
//!
//! ```no_run
//! use dashtap::{Config, Counter, Table};
//!
//! fn main() -> dashtap::Result<()> {
//!     dashtap::install(Config::from_env("worker")?)?;
//!
//!     let jobs = Counter::create("jobs")?;
//!     let queues = Table::create("queues", [(0, "depth"), (1, "owner")])?;
//!
//!     jobs.inc(1.0);
//!     queues.add_row(7)?;
//!     queues.set_cell(7, 0, "12")?;
//!
//!     dashtap::shutdown();
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod cli;
pub mod core;
pub mod metrics;
pub mod reporter;
pub mod transport;
pub mod wire;

// Re-export the application-facing API
pub use crate::core::{Config, ConfigBuilder, DashtapError, Result};
pub use crate::metrics::{Counter, Dict, Gauge, Histogram, Logger, Pulse, Registry, Table};
pub use crate::reporter::{install, install_from_env, installed, shutdown, CycleOutcome, Reporter};
