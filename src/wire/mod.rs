//! Self-describing wire format for delivered changes.
//!
//! A [`Serializer`] turns a [`ChangeSet`] into length-prefixed packets, as
//! many as the packet limit requires. Consumers read the stream back with
//! [`PacketDecoder`].

pub mod codec;
pub mod frame;

pub use codec::{encode_packet, PacketDecoder, MAX_PACKET_BYTES, PROTOCOL_VERSION};
pub use frame::{Frame, Payload, Packet};

use crate::core::Result;
use crate::metrics::ChangeSet;
use bytes::Bytes;
use codec::VERSION_BYTES;

/// One encoded packet ready for a transport
#[derive(Debug, Clone)]
pub struct Encoded {
    pub bytes: Bytes,
    pub frames: usize,
    pub sequence: u64,
}

/// Packets built from one change set, in sequence order
#[derive(Debug)]
pub struct Batch {
    /// Each packet with the changes it carries
    pub packets: Vec<(Encoded, ChangeSet)>,
    /// Changes whose frame alone does not fit in a packet
    pub oversized: ChangeSet,
}

/// Packet builder bound to one producer
#[derive(Debug)]
pub struct Serializer {
    source: String,
    next_sequence: u64,
    packet_limit: usize,
}

impl Serializer {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            next_sequence: 0,
            packet_limit: MAX_PACKET_BYTES,
        }
    }

    /// Cap encoded packets at `limit` bytes, never above [`MAX_PACKET_BYTES`]
    pub fn with_packet_limit(mut self, limit: usize) -> Self {
        self.packet_limit = limit.min(MAX_PACKET_BYTES);
        self
    }

    /// Build the packet for `changes` without resolving them.
    ///
    /// The sequence number only advances through [`Serializer::acknowledge`],
    /// so a packet that never reached the consumer is not counted.
    pub fn encode(&self, changes: &ChangeSet) -> Result<Encoded> {
        let packet = Packet {
            source: self.source.clone(),
            sequence: self.next_sequence,
            frames: changes.iter().map(Frame::from).collect(),
        };
        let bytes = encode_packet(&packet)?;
        Ok(Encoded {
            bytes,
            frames: packet.frames.len(),
            sequence: packet.sequence,
        })
    }

    /// Pack `changes` into as few packets as the limit allows.
    ///
    /// Frames keep their snapshot order and packets take consecutive
    /// sequence numbers starting at the next unacknowledged one. On error
    /// every change is returned to the dirty queue.
    pub fn encode_batch(&self, changes: ChangeSet) -> Result<Batch> {
        let frames: Vec<Frame> = changes.iter().map(Frame::from).collect();
        let header = Packet {
            source: self.source.clone(),
            sequence: self.next_sequence,
            frames: Vec::new(),
        };
        let overhead = VERSION_BYTES + bincode::serialized_size(&header)? as usize;
        let budget = self.packet_limit.saturating_sub(overhead);

        // Packet index per frame, None when the frame can never fit
        let mut placement = Vec::with_capacity(frames.len());
        let mut packet_count = 0;
        let mut used = 0;
        for frame in &frames {
            let size = bincode::serialized_size(frame)? as usize;
            if size > budget {
                placement.push(None);
                continue;
            }
            if packet_count == 0 || used + size > budget {
                packet_count += 1;
                used = 0;
            }
            used += size;
            placement.push(Some(packet_count - 1));
        }

        let mut parts = changes.split(packet_count + 1, |index| {
            placement[index].unwrap_or(packet_count)
        });
        let oversized = parts.pop().unwrap_or_default();

        let mut bodies: Vec<Vec<Frame>> = (0..packet_count).map(|_| Vec::new()).collect();
        for (frame, slot) in frames.into_iter().zip(&placement) {
            if let Some(index) = slot {
                bodies[*index].push(frame);
            }
        }

        let mut packets = Vec::with_capacity(packet_count);
        for ((offset, frames), changes) in (0u64..).zip(bodies).zip(parts) {
            let packet = Packet {
                source: header.source.clone(),
                sequence: self.next_sequence + offset,
                frames,
            };
            let encoded = Encoded {
                bytes: encode_packet(&packet)?,
                frames: packet.frames.len(),
                sequence: packet.sequence,
            };
            packets.push((encoded, changes));
        }

        Ok(Batch { packets, oversized })
    }

    /// Record a delivered packet
    pub fn acknowledge(&mut self, encoded: &Encoded) {
        self.next_sequence = encoded.sequence + 1;
    }

    /// Restart numbering for a new consumer session
    pub fn reset_sequence(&mut self) {
        self.next_sequence = 0;
    }
}
