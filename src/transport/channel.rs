//! In-process delivery over a crossbeam channel.

use super::Transport;
use crate::core::{DashtapError, Result};
use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender, TrySendError};

/// Hands encoded packets to an in-process consumer.
///
/// Sending never blocks: a full bounded channel fails the cycle like an
/// unreachable consumer would.
#[derive(Debug)]
pub struct ChannelTransport {
    sender: Sender<Bytes>,
    connected: bool,
}

impl ChannelTransport {
    pub fn new(sender: Sender<Bytes>) -> Self {
        Self {
            sender,
            connected: false,
        }
    }

    /// Transport plus the receiving end, without a capacity limit
    pub fn unbounded() -> (Self, Receiver<Bytes>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Self::new(sender), receiver)
    }

    /// Transport plus the receiving end, holding at most `capacity` packets
    pub fn bounded(capacity: usize) -> (Self, Receiver<Bytes>) {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        (Self::new(sender), receiver)
    }
}

#[async_trait::async_trait]
impl Transport for ChannelTransport {
    async fn connect(&mut self) -> Result<bool> {
        let new_session = !self.connected;
        self.connected = true;
        Ok(new_session)
    }

    async fn send(&mut self, packet: Bytes) -> Result<()> {
        self.sender.try_send(packet).map_err(|e| match e {
            TrySendError::Full(_) => DashtapError::transport("consumer channel full"),
            TrySendError::Disconnected(_) => DashtapError::ChannelSend,
        })
    }

    fn reset(&mut self) {
        self.connected = false;
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    fn describe(&self) -> String {
        "channel".to_string()
    }
}
