//! Core configuration and error types shared by every dashtap subsystem.

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{
    BackoffConfig, BackpressurePolicy, Config, ConfigBuilder, LimitsConfig, LogLevel,
    LoggingConfig, ReporterConfig, TransportConfig, DEFAULT_ENDPOINT, MAX_RECONNECT_DELAY,
    MAX_RECONNECT_MULTIPLIER, MIN_PACKET_BYTES,
};
pub use error::{DashtapError, Result};
