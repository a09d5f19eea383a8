//! Delivery of encoded packets to the external consumer.
//!
//! Transports are driven only from the flush loop, one call at a time, so
//! implementations take `&mut self` and need no internal locking. The flush
//! loop bounds `connect` and `send` with the configured timeouts.

pub mod backoff;
pub mod channel;
pub mod null;
pub mod tcp;

pub use backoff::Backoff;
pub use channel::ChannelTransport;
pub use null::NullTransport;
pub use tcp::TcpTransport;

use crate::core::{Result, TransportConfig};
use bytes::Bytes;

/// Medium that carries packets to a consumer
#[async_trait::async_trait]
pub trait Transport: Send {
    /// Make sure a consumer is reachable.
    ///
    /// Returns `true` when this call started a new consumer session, which
    /// makes the reporter resend full state.
    async fn connect(&mut self) -> Result<bool>;

    /// Deliver one encoded packet
    async fn send(&mut self, packet: Bytes) -> Result<()>;

    /// Abandon the current session after a failed or timed out operation
    fn reset(&mut self);

    /// Release the consumer connection
    async fn close(&mut self) -> Result<()>;

    /// Human-readable target for logs
    fn describe(&self) -> String;
}

/// Build the transport a configuration asks for.
///
/// A configured endpoint dials it over TCP; no endpoint discards packets.
pub fn transport_for(config: &TransportConfig) -> Box<dyn Transport> {
    match &config.endpoint {
        Some(endpoint) => Box::new(TcpTransport::new(endpoint.clone(), config.reconnect.clone())),
        None => Box::new(NullTransport::new()),
    }
}
