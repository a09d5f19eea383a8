//! Command-line interface for dashtap.
//!
//! `dashtap listen` is a debug consumer that prints every received packet as
//! one JSON line. `dashtap check-config` validates a configuration file.
//! `dashtap demo` reports a few synthetic metrics to an endpoint.

use crate::core::{Config, ConfigBuilder, DashtapError, LogLevel, Result, DEFAULT_ENDPOINT};
use crate::metrics::{Counter, Gauge, Histogram, Logger, Pulse, Registry, Table};
use crate::reporter::Reporter;
use crate::transport::transport_for;
use crate::wire::PacketDecoder;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};

/// Live metric reporting toolkit
#[derive(Parser, Debug)]
#[command(name = "dashtap")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true, env = "DASHTAP_DEBUG")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept producer connections and print packets as JSON lines
    Listen {
        /// Address to listen on
        #[arg(long, env = "DASHTAP_LISTEN", default_value = DEFAULT_ENDPOINT)]
        addr: SocketAddr,
    },
    /// Validate a configuration file and print the effective configuration
    CheckConfig {
        /// YAML configuration file
        #[arg(short, long, env = "DASHTAP_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Report synthetic metrics to a consumer
    Demo {
        /// Consumer address
        #[arg(long, env = "DASHTAP_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
        endpoint: String,
        /// How long to run
        #[arg(long, default_value = "10s", value_parser = humantime_serde::re::humantime::parse_duration)]
        duration: Duration,
    },
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Initialize logging: `RUST_LOG` wins, then `--debug`, then `DASHTAP_LOG`.
    pub fn init_logging(&self) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let log_level = if self.debug {
            LogLevel::Debug
        } else {
            match std::env::var("DASHTAP_LOG") {
                Ok(level) => LogLevel::parse(&level)?,
                Err(_) => LogLevel::Info,
            }
        };

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(log_level.as_str()));

        // Packets go to stdout, logs to stderr
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .compact();

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| DashtapError::config(format!("Failed to initialize logging: {}", e)))?;

        Ok(())
    }
}

/// Execute a parsed command line.
pub async fn execute(cli: Cli) -> Result<()> {
    cli.init_logging()?;

    match cli.command {
        Command::Listen { addr } => listen(addr).await,
        Command::CheckConfig { config } => check_config(config),
        Command::Demo { endpoint, duration } => demo(endpoint, duration).await,
    }
}

fn check_config(path: Option<PathBuf>) -> Result<()> {
    let mut builder = ConfigBuilder::new();
    if let Some(path) = &path {
        builder = builder.from_file(path)?;
    }
    let config = builder.build()?;

    println!("Configuration is valid!");
    println!("  App name: {}", config.app_name);
    println!(
        "  Endpoint: {}",
        config.transport.endpoint.as_deref().unwrap_or("disabled")
    );
    println!("  Flush interval: {:?}", config.reporter.flush_interval);
    println!("  Backpressure: {:?}", config.reporter.backpressure);
    println!("  Max pending log messages: {}", config.limits.max_pending_log_messages);
    println!("  Max packet bytes: {}", config.limits.max_packet_bytes);
    println!("  Log level: {}", config.logging.level.as_str());
    Ok(())
}

async fn listen(addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("listening for producers on {}", listener.local_addr()?);

    tokio::select! {
        result = accept_producers(listener) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping...");
            Ok(())
        }
    }
}

async fn accept_producers(listener: TcpListener) -> Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        tracing::info!(%peer, "producer connected");
        tokio::spawn(async move {
            match print_packets(stream).await {
                Ok(()) => tracing::info!(%peer, "producer disconnected"),
                Err(e) => tracing::warn!(%peer, "producer stream ended: {}", e),
            }
        });
    }
}

/// Decode one producer connection until it closes
async fn print_packets(mut stream: TcpStream) -> Result<()> {
    let mut decoder = PacketDecoder::new();
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let read = stream.read(&mut buf).await?;
        if read == 0 {
            return Ok(());
        }
        decoder.extend(&buf[..read]);

        while let Some(packet) = decoder.next_packet()? {
            let line = serde_json::to_string(&packet)
                .map_err(|e| DashtapError::codec(format!("JSON encoding failed: {}", e)))?;
            println!("{}", line);
        }
    }
}

async fn demo(endpoint: String, duration: Duration) -> Result<()> {
    let config: Config = ConfigBuilder::new()
        .app_name("dashtap-demo")
        .endpoint(Some(endpoint))
        .flush_interval(Duration::from_millis(500))
        .build()?;

    let registry = Registry::new();
    let transport = transport_for(&config.transport);
    let reporter = Reporter::start_with(config, registry.clone(), transport)?;

    let requests = Counter::new(&registry, "requests")?;
    let load = Gauge::new(&registry, "load", 0.0, 100.0)?;
    let inflight = Pulse::new(&registry, "inflight")?;
    let latency = Histogram::new(&registry, "latency_ms", &[1.0, 5.0, 10.0, 50.0, 100.0])?;
    let events = Logger::new(&registry, "events")?;
    let workers = Table::new(&registry, "workers", [(0, "state"), (1, "jobs")])?;

    let started = tokio::time::Instant::now();
    let mut tick: u64 = 0;
    while started.elapsed() < duration {
        tick += 1;
        let worker = tick % 4;

        requests.inc(1.0);
        load.set(rand::random::<f64>() * 100.0);
        inflight.set((tick % 7) as f64);
        latency.add(rand::random::<f64>() * 120.0)?;
        workers.add_row(worker)?;
        workers.set_cell(worker, 0, if tick % 3 == 0 { "idle" } else { "busy" })?;
        workers.set_cell(worker, 1, tick.to_string())?;
        if tick % 10 == 0 {
            events.log(format!("tick {}", tick));
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let stats = reporter.stats();
    tracing::info!(
        delivered = stats.delivered,
        failed = stats.failed,
        frames = stats.frames,
        "demo finished"
    );
    tokio::task::spawn_blocking(move || reporter.shutdown())
        .await
        .map_err(|e| DashtapError::config(format!("shutdown task failed: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_defaults() {
        let cli = Cli::try_parse_from(["dashtap", "listen"]).unwrap();
        match cli.command {
            Command::Listen { addr } => assert_eq!(addr.to_string(), DEFAULT_ENDPOINT),
            other => panic!("unexpected command {:?}", other),
        }
        assert!(!cli.debug);
    }

    #[test]
    fn test_demo_duration_parsing() {
        let cli = Cli::try_parse_from(["dashtap", "demo", "--duration", "1500ms"]).unwrap();
        match cli.command {
            Command::Demo { duration, .. } => assert_eq!(duration, Duration::from_millis(1500)),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_check_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dashtap.yaml");
        std::fs::write(&path, "app_name: svc\nreporter:\n  flush_interval: 250ms\n").unwrap();
        assert!(check_config(Some(path)).is_ok());
    }
}
