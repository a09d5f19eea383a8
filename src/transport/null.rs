use super::Transport;
use crate::core::Result;
use bytes::Bytes;

/// Accepts and discards every packet; used when delivery is disabled
#[derive(Debug, Default)]
pub struct NullTransport {
    discarded: u64,
}

impl NullTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}

#[async_trait::async_trait]
impl Transport for NullTransport {
    async fn connect(&mut self) -> Result<bool> {
        Ok(false)
    }

    async fn send(&mut self, _packet: Bytes) -> Result<()> {
        self.discarded += 1;
        Ok(())
    }

    fn reset(&mut self) {}

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn describe(&self) -> String {
        "discard".to_string()
    }
}
