use crate::metrics::MetricKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashtapError {
    #[error("Metric '{name}' is already registered as {existing}, requested {requested}")]
    KindMismatch {
        name: String,
        existing: MetricKind,
        requested: MetricKind,
    },

    #[error("Table '{table}' has no row {row} or column {column}")]
    UnknownRowOrColumn { table: String, row: u64, column: u64 },

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Metric name must not be empty")]
    InvalidName,

    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("Scheduler stalled: {skipped} flush cycles skipped")]
    SchedulerStalled { skipped: u64 },

    #[error("Timeout error: operation took longer than {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Unsupported protocol version {0}")]
    UnsupportedVersion(u16),

    #[error("Channel send error")]
    ChannelSend,

    #[error("Reporter is not running")]
    ReporterStopped,
}

/// Result type alias for dashtap operations
pub type Result<T> = std::result::Result<T, DashtapError>;

impl From<bincode::Error> for DashtapError {
    fn from(err: bincode::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

impl DashtapError {
    /// Creates a new invalid value error
    pub fn invalid_value<S: Into<String>>(msg: S) -> Self {
        Self::InvalidValue(msg.into())
    }

    /// Creates a new transport error
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::TransportUnavailable(msg.into())
    }

    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new codec error
    pub fn codec<S: Into<String>>(msg: S) -> Self {
        Self::Codec(msg.into())
    }

    /// Returns true if the reporting pipeline can recover from this error on a later cycle
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::TransportUnavailable(_) | Self::Timeout { .. } | Self::Io(_) | Self::ChannelSend
        )
    }

    /// Returns the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::KindMismatch { .. } | Self::InvalidName => "registry",
            Self::UnknownRowOrColumn { .. } | Self::InvalidValue(_) => "validation",
            Self::TransportUnavailable(_) | Self::Io(_) => "transport",
            Self::SchedulerStalled { .. } | Self::ReporterStopped => "scheduler",
            Self::Timeout { .. } => "timeout",
            Self::Config(_) => "config",
            Self::Codec(_) | Self::UnsupportedVersion(_) => "codec",
            Self::ChannelSend => "channel",
        }
    }
}
