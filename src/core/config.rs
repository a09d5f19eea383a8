//! Configuration management for dashtap.
//!
//! This module provides configuration handling with:
//! - YAML file support
//! - Environment variable overrides
//! - Validation and defaults

use crate::core::{DashtapError, Result};
use crate::wire::MAX_PACKET_BYTES;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default consumer address
pub const DEFAULT_ENDPOINT: &str = "127.0.0.1:1636";

/// Largest accepted reconnect growth factor
pub const MAX_RECONNECT_MULTIPLIER: f64 = 100.0;

/// Largest accepted reconnect delay
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Smallest accepted packet limit
pub const MIN_PACKET_BYTES: usize = 4096;

/// Complete configuration for an instrumented process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name of the instrumented application, sent as the packet source
    pub app_name: String,
    /// Flush loop configuration
    pub reporter: ReporterConfig,
    /// Consumer connection configuration
    pub transport: TransportConfig,
    /// Memory bounds
    pub limits: LimitsConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Flush loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    /// Period between flush cycles
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,
    /// What to do with ticks that fire while a cycle is still sending
    pub backpressure: BackpressurePolicy,
    /// Upper bound for the final flush on shutdown
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

/// Ticks that arrive while a flush is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackpressurePolicy {
    /// Drop the tick and count it as skipped
    Skip,
    /// Run up to `depth` missed ticks back to back, skip the rest
    Queue { depth: usize },
}

/// Consumer connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// `host:port` of the consumer; `None` discards every packet
    pub endpoint: Option<String>,
    /// Connection establishment timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Timeout for writing one packet
    #[serde(with = "humantime_serde")]
    pub send_timeout: Duration,
    /// Delay between reconnection attempts
    pub reconnect: BackoffConfig,
}

/// Reconnection backoff
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay after the first failure
    #[serde(with = "humantime_serde")]
    pub initial: Duration,
    /// Maximum delay
    #[serde(with = "humantime_serde")]
    pub max: Duration,
    /// Growth factor per consecutive failure
    pub multiplier: f64,
    /// Add up to 10% random jitter
    pub jitter: bool,
}

/// Memory bounds for pending data
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Unflushed messages kept per logger before the oldest are dropped
    pub max_pending_log_messages: usize,
    /// Encoded size limit of one packet; larger change sets are split
    pub max_packet_bytes: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            app_name: "dashtap".to_string(),
            reporter: ReporterConfig::default(),
            transport: TransportConfig::default(),
            limits: LimitsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ReporterConfig {
    fn default() -> Self {
        ReporterConfig {
            flush_interval: Duration::from_secs(1),
            backpressure: BackpressurePolicy::Skip,
            shutdown_timeout: Duration::from_secs(2),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            endpoint: Some(DEFAULT_ENDPOINT.to_string()),
            connect_timeout: Duration::from_secs(1),
            send_timeout: Duration::from_secs(1),
            reconnect: BackoffConfig::default(),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        LimitsConfig {
            max_pending_log_messages: 1000,
            max_packet_bytes: MAX_PACKET_BYTES,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
        }
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Result<Self> {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration for `app_name` from the environment.
    ///
    /// `DASHTAP_CONFIG` names a YAML file used as the base, then
    /// `DASHTAP_ENDPOINT`, `DASHTAP_FLUSH_INTERVAL` and `DASHTAP_LOG` override
    /// individual fields. An endpoint of `none` or `off` disables delivery.
    pub fn from_env(app_name: &str) -> Result<Self> {
        let mut builder = ConfigBuilder::new();

        if let Ok(path) = std::env::var("DASHTAP_CONFIG") {
            builder = builder.from_file(path)?;
        }

        builder = builder.app_name(app_name);

        if let Ok(endpoint) = std::env::var("DASHTAP_ENDPOINT") {
            builder = match endpoint.trim() {
                "" | "none" | "off" => builder.endpoint(None),
                addr => builder.endpoint(Some(addr.to_string())),
            };
        }

        if let Ok(interval) = std::env::var("DASHTAP_FLUSH_INTERVAL") {
            builder = builder.flush_interval(parse_duration(&interval)?);
        }

        if let Ok(level) = std::env::var("DASHTAP_LOG") {
            builder = builder.log_level(LogLevel::parse(&level)?);
        }

        builder.build()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.app_name.trim().is_empty() {
            return Err(DashtapError::config("app_name must not be empty"));
        }

        if self.reporter.flush_interval.is_zero() {
            return Err(DashtapError::config("flush_interval must be greater than 0"));
        }

        if let BackpressurePolicy::Queue { depth } = self.reporter.backpressure {
            if depth == 0 {
                return Err(DashtapError::config("backpressure queue depth must be at least 1"));
            }
        }

        if self.transport.connect_timeout.is_zero() || self.transport.send_timeout.is_zero() {
            return Err(DashtapError::config("transport timeouts must be greater than 0"));
        }

        if let Some(endpoint) = &self.transport.endpoint {
            validate_endpoint(endpoint)?;
        }

        let backoff = &self.transport.reconnect;
        if !(1.0..=MAX_RECONNECT_MULTIPLIER).contains(&backoff.multiplier) {
            return Err(DashtapError::config(format!(
                "reconnect multiplier must be between 1.0 and {}, got {}",
                MAX_RECONNECT_MULTIPLIER, backoff.multiplier
            )));
        }
        if backoff.max > MAX_RECONNECT_DELAY {
            return Err(DashtapError::config(format!(
                "reconnect max delay {:?} exceeds {:?}",
                backoff.max, MAX_RECONNECT_DELAY
            )));
        }
        if backoff.initial > backoff.max {
            return Err(DashtapError::config(format!(
                "reconnect initial delay {:?} exceeds max {:?}",
                backoff.initial, backoff.max
            )));
        }

        if self.limits.max_pending_log_messages == 0 {
            return Err(DashtapError::config("max_pending_log_messages must be greater than 0"));
        }

        if !(MIN_PACKET_BYTES..=MAX_PACKET_BYTES).contains(&self.limits.max_packet_bytes) {
            return Err(DashtapError::config(format!(
                "max_packet_bytes must be between {} and {}, got {}",
                MIN_PACKET_BYTES, MAX_PACKET_BYTES, self.limits.max_packet_bytes
            )));
        }

        Ok(())
    }
}

/// Parse a humantime duration such as `250ms` or `2s`
fn parse_duration(value: &str) -> Result<Duration> {
    humantime_serde::re::humantime::parse_duration(value.trim())
        .map_err(|e| DashtapError::config(format!("Invalid duration '{}': {}", value, e)))
}

fn validate_endpoint(endpoint: &str) -> Result<()> {
    let Some((host, port)) = endpoint.rsplit_once(':') else {
        return Err(DashtapError::config(format!(
            "endpoint '{}' must have the form host:port",
            endpoint
        )));
    };
    if host.is_empty() {
        return Err(DashtapError::config(format!("endpoint '{}' has no host", endpoint)));
    }
    port.parse::<u16>()
        .map_err(|_| DashtapError::config(format!("endpoint '{}' has an invalid port", endpoint)))?;
    Ok(())
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Parse a level name, case-insensitive
    pub fn parse(level: &str) -> Result<Self> {
        match level.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(DashtapError::config(format!("Unknown log level '{}'", other))),
        }
    }
}

/// Configuration builder for programmatic construction
pub struct ConfigBuilder {
    config: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::default(),
        }
    }

    /// Load configuration from YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.config = serde_yaml::from_str(yaml)
            .map_err(|e| DashtapError::config(format!("Failed to parse YAML config: {}", e)))?;
        Ok(self)
    }

    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(self, path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DashtapError::config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        self.from_yaml(&content)
    }

    /// Set application name
    pub fn app_name(mut self, name: &str) -> Self {
        self.config.app_name = name.to_string();
        self
    }

    /// Set flush interval
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.config.reporter.flush_interval = interval;
        self
    }

    /// Set backpressure policy
    pub fn backpressure(mut self, policy: BackpressurePolicy) -> Self {
        self.config.reporter.backpressure = policy;
        self
    }

    /// Set shutdown timeout
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.reporter.shutdown_timeout = timeout;
        self
    }

    /// Set consumer endpoint
    pub fn endpoint(mut self, endpoint: Option<String>) -> Self {
        self.config.transport.endpoint = endpoint;
        self
    }

    /// Set connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.transport.connect_timeout = timeout;
        self
    }

    /// Set send timeout
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.config.transport.send_timeout = timeout;
        self
    }

    /// Set pending logger message bound
    pub fn max_pending_log_messages(mut self, max: usize) -> Self {
        self.config.limits.max_pending_log_messages = max;
        self
    }

    /// Set packet size limit
    pub fn max_packet_bytes(mut self, max: usize) -> Self {
        self.config.limits.max_packet_bytes = max;
        self
    }

    /// Set log level
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.logging.level = level;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
