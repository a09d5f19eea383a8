//! TCP delivery to a consumer listening on `host:port`.

use super::backoff::Backoff;
use super::Transport;
use crate::core::{BackoffConfig, DashtapError, Result};
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

/// Dials the consumer lazily and redials after failures with backoff.
///
/// While backing off, `connect` fails immediately without touching the
/// network, so a dead consumer costs one timer check per flush cycle.
#[derive(Debug)]
pub struct TcpTransport {
    endpoint: String,
    stream: Option<TcpStream>,
    backoff: Backoff,
}

impl TcpTransport {
    pub fn new(endpoint: impl Into<String>, reconnect: BackoffConfig) -> Self {
        Self {
            endpoint: endpoint.into(),
            stream: None,
            backoff: Backoff::new(reconnect),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self) -> Result<bool> {
        if self.stream.is_some() {
            return Ok(false);
        }

        if !self.backoff.ready() {
            return Err(DashtapError::transport(format!(
                "{} unreachable, next attempt in {:?}",
                self.endpoint,
                self.backoff.remaining()
            )));
        }

        // Scheduled up front so an attempt abandoned by the caller's timeout
        // still counts as a failure.
        let delay = self.backoff.record_failure();
        let stream = TcpStream::connect(&self.endpoint).await.map_err(|e| {
            tracing::warn!(
                endpoint = %self.endpoint,
                failures = self.backoff.failures(),
                "consumer connect failed: {}, retrying in {:?}",
                e,
                delay
            );
            DashtapError::transport(format!("{}: {}", self.endpoint, e))
        })?;

        stream.set_nodelay(true)?;
        self.backoff.reset();
        self.stream = Some(stream);
        tracing::info!(endpoint = %self.endpoint, "connected to consumer");
        Ok(true)
    }

    async fn send(&mut self, packet: Bytes) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| DashtapError::transport(format!("{} not connected", self.endpoint)))?;
        stream.write_all(&packet).await?;
        stream.flush().await?;
        Ok(())
    }

    fn reset(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!(endpoint = %self.endpoint, "dropped consumer connection");
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await?;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.endpoint)
    }
}
