//! Common test utilities and fixtures.

#![allow(dead_code)]

use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender};
use dashtap::core::{Config, ConfigBuilder, DashtapError, Result};
use dashtap::transport::Transport;
use dashtap::wire::{Packet, PacketDecoder, Payload};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Config whose timer never fires during a test; cycles run via `flush()`
pub fn manual_config(app: &str) -> Config {
    ConfigBuilder::new()
        .app_name(app)
        .flush_interval(Duration::from_secs(3600))
        .build()
        .unwrap()
}

/// Decode every packet the consumer received so far
pub fn drain_packets(receiver: &Receiver<Bytes>) -> Vec<Packet> {
    receiver
        .try_iter()
        .map(|bytes| {
            let mut decoder = PacketDecoder::new();
            decoder.extend(&bytes);
            decoder.next_packet().unwrap().expect("one complete packet per send")
        })
        .collect()
}

/// Counter value carried by `packet`, if it has a frame for `name`
pub fn counter_value(packet: &Packet, name: &str) -> Option<f64> {
    match &packet.frame(name)?.payload {
        Payload::Counter { value } => Some(*value),
        other => panic!("frame '{}' is not a counter: {:?}", name, other),
    }
}

/// Switch shared between a test and its [`FlakyTransport`]
#[derive(Debug, Clone, Default)]
pub struct FaultSwitch(Arc<AtomicBool>);

impl FaultSwitch {
    pub fn fail(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn recover(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    fn failing(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Channel transport that can be made unreachable or slow
pub struct FlakyTransport {
    sender: Sender<Bytes>,
    switch: FaultSwitch,
    send_delay: Duration,
    connected: bool,
}

impl FlakyTransport {
    pub fn new() -> (Self, FaultSwitch, Receiver<Bytes>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let switch = FaultSwitch::default();
        let transport = Self {
            sender,
            switch: switch.clone(),
            send_delay: Duration::ZERO,
            connected: false,
        };
        (transport, switch, receiver)
    }

    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }
}

#[async_trait::async_trait]
impl Transport for FlakyTransport {
    async fn connect(&mut self) -> Result<bool> {
        if self.switch.failing() {
            return Err(DashtapError::transport("consumer down"));
        }
        let new_session = !self.connected;
        self.connected = true;
        Ok(new_session)
    }

    async fn send(&mut self, packet: Bytes) -> Result<()> {
        if !self.send_delay.is_zero() {
            tokio::time::sleep(self.send_delay).await;
        }
        if self.switch.failing() {
            return Err(DashtapError::transport("write failed"));
        }
        self.sender.send(packet).map_err(|_| DashtapError::ChannelSend)
    }

    fn reset(&mut self) {
        self.connected = false;
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn describe(&self) -> String {
        "flaky".to_string()
    }
}
