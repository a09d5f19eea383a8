//! Configuration system tests.

use dashtap::core::{
    BackpressurePolicy, Config, ConfigBuilder, LogLevel, DEFAULT_ENDPOINT, MAX_RECONNECT_DELAY,
    MAX_RECONNECT_MULTIPLIER, MIN_PACKET_BYTES,
};
use dashtap::wire::MAX_PACKET_BYTES;
use std::io::Write;
use std::time::Duration;

#[test]
fn test_default_config() {
    let config = Config::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.reporter.flush_interval, Duration::from_secs(1));
    assert_eq!(config.reporter.backpressure, BackpressurePolicy::Skip);
    assert_eq!(config.transport.endpoint.as_deref(), Some(DEFAULT_ENDPOINT));
    assert_eq!(config.limits.max_pending_log_messages, 1000);
}

#[test]
fn test_config_builder() {
    let config = ConfigBuilder::new()
        .app_name("billing")
        .flush_interval(Duration::from_millis(250))
        .backpressure(BackpressurePolicy::Queue { depth: 4 })
        .endpoint(Some("10.0.0.5:9000".to_string()))
        .send_timeout(Duration::from_millis(300))
        .max_pending_log_messages(50)
        .log_level(LogLevel::Debug)
        .build()
        .unwrap();

    assert_eq!(config.app_name, "billing");
    assert_eq!(config.reporter.flush_interval, Duration::from_millis(250));
    assert_eq!(config.reporter.backpressure, BackpressurePolicy::Queue { depth: 4 });
    assert_eq!(config.transport.endpoint.as_deref(), Some("10.0.0.5:9000"));
    assert_eq!(config.transport.send_timeout, Duration::from_millis(300));
    assert_eq!(config.limits.max_pending_log_messages, 50);
    assert_eq!(config.logging.level, LogLevel::Debug);
}

#[test]
fn test_yaml_config() {
    let yaml = r#"
app_name: checkout
reporter:
  flush_interval: 500ms
  backpressure:
    queue:
      depth: 2
  shutdown_timeout: 3s
transport:
  endpoint: "dashboard.local:1636"
  connect_timeout: 2s
  reconnect:
    initial: 50ms
    max: 1m
    multiplier: 1.5
    jitter: false
limits:
  max_pending_log_messages: 10
logging:
  level: warn
"#;

    let config = ConfigBuilder::new().from_yaml(yaml).unwrap().build().unwrap();

    assert_eq!(config.app_name, "checkout");
    assert_eq!(config.reporter.flush_interval, Duration::from_millis(500));
    assert_eq!(config.reporter.backpressure, BackpressurePolicy::Queue { depth: 2 });
    assert_eq!(config.reporter.shutdown_timeout, Duration::from_secs(3));
    assert_eq!(config.transport.endpoint.as_deref(), Some("dashboard.local:1636"));
    assert_eq!(config.transport.connect_timeout, Duration::from_secs(2));
    assert_eq!(config.transport.send_timeout, Duration::from_secs(1));
    assert_eq!(config.transport.reconnect.max, Duration::from_secs(60));
    assert!(!config.transport.reconnect.jitter);
    assert_eq!(config.limits.max_pending_log_messages, 10);
    assert_eq!(config.logging.level, LogLevel::Warn);
}

#[test]
fn test_disabled_endpoint_yaml() {
    let config = ConfigBuilder::new()
        .from_yaml("transport:\n  endpoint: null\n")
        .unwrap()
        .build()
        .unwrap();
    assert!(config.transport.endpoint.is_none());
}

#[test]
fn test_config_validation() {
    assert!(ConfigBuilder::new().app_name("  ").build().is_err());
    assert!(ConfigBuilder::new().flush_interval(Duration::ZERO).build().is_err());
    assert!(ConfigBuilder::new()
        .backpressure(BackpressurePolicy::Queue { depth: 0 })
        .build()
        .is_err());
    assert!(ConfigBuilder::new().connect_timeout(Duration::ZERO).build().is_err());
    assert!(ConfigBuilder::new().endpoint(Some("no-port".to_string())).build().is_err());
    assert!(ConfigBuilder::new().endpoint(Some("host:notaport".to_string())).build().is_err());
    assert!(ConfigBuilder::new().max_pending_log_messages(0).build().is_err());

    let mut config = Config::default();
    config.transport.reconnect.multiplier = 0.5;
    assert!(config.validate().is_err());
}

#[test]
fn test_reconnect_bounds() {
    let mut config = Config::default();
    config.transport.reconnect.multiplier = 1e30;
    assert!(config.validate().is_err());
    config.transport.reconnect.multiplier = f64::NAN;
    assert!(config.validate().is_err());
    config.transport.reconnect.multiplier = MAX_RECONNECT_MULTIPLIER;
    assert!(config.validate().is_ok());

    config.transport.reconnect.max = MAX_RECONNECT_DELAY + Duration::from_secs(1);
    assert!(config.validate().is_err());
}

#[test]
fn test_packet_limit_bounds() {
    assert_eq!(Config::default().limits.max_packet_bytes, MAX_PACKET_BYTES);
    assert!(ConfigBuilder::new().max_packet_bytes(MIN_PACKET_BYTES).build().is_ok());
    assert!(ConfigBuilder::new().max_packet_bytes(MIN_PACKET_BYTES - 1).build().is_err());
    assert!(ConfigBuilder::new().max_packet_bytes(MAX_PACKET_BYTES + 1).build().is_err());
}

#[test]
fn test_error_handling() {
    let result = ConfigBuilder::new().from_yaml("invalid: yaml: content: [");
    assert!(result.is_err());

    let result = ConfigBuilder::new().from_yaml(
        r#"
reporter:
  flush_interval: "soon"
"#,
    );
    assert!(result.is_err());
}

#[test]
fn test_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "app_name: from-file\nreporter:\n  flush_interval: 2s").unwrap();

    let config = ConfigBuilder::new().from_file(file.path()).unwrap().build().unwrap();
    assert_eq!(config.app_name, "from-file");
    assert_eq!(config.reporter.flush_interval, Duration::from_secs(2));

    assert!(ConfigBuilder::new().from_file("/nonexistent/dashtap.yaml").is_err());
}

#[test]
fn test_from_env_overrides() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "reporter:\n  flush_interval: 5s\nlimits:\n  max_pending_log_messages: 7").unwrap();

    std::env::set_var("DASHTAP_CONFIG", file.path());
    std::env::set_var("DASHTAP_ENDPOINT", "off");
    std::env::set_var("DASHTAP_FLUSH_INTERVAL", "150ms");
    std::env::set_var("DASHTAP_LOG", "TRACE");

    let config = Config::from_env("js").unwrap();

    std::env::remove_var("DASHTAP_CONFIG");
    std::env::remove_var("DASHTAP_ENDPOINT");
    std::env::remove_var("DASHTAP_FLUSH_INTERVAL");
    std::env::remove_var("DASHTAP_LOG");

    assert_eq!(config.app_name, "js");
    assert!(config.transport.endpoint.is_none());
    assert_eq!(config.reporter.flush_interval, Duration::from_millis(150));
    assert_eq!(config.limits.max_pending_log_messages, 7);
    assert_eq!(config.logging.level, LogLevel::Trace);
}
