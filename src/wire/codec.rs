//! Length-prefixed packet codec.
//!
//! Layout of one packet on the stream:
//!
//! ```text
//! +-----------------+------------------+----------------------------+
//! | length: u32 BE  | version: u16 BE  | bincode(PacketBody)        |
//! +-----------------+------------------+----------------------------+
//! ```
//!
//! `length` counts the version and body bytes. Consumers read the version
//! before touching the body, so an unknown version is reported instead of
//! misdecoded.

use crate::core::{DashtapError, Result};
use crate::wire::frame::Packet;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Current protocol version
pub const PROTOCOL_VERSION: u16 = 1;

/// Upper bound for one encoded packet
pub const MAX_PACKET_BYTES: usize = 16 * 1024 * 1024;

const LENGTH_BYTES: usize = 4;
pub(crate) const VERSION_BYTES: usize = 2;

/// Encode a packet with its length prefix and version marker
pub fn encode_packet(packet: &Packet) -> Result<Bytes> {
    let body = bincode::serialize(packet)?;
    let length = VERSION_BYTES + body.len();
    if length > MAX_PACKET_BYTES {
        return Err(DashtapError::codec(format!(
            "packet of {} bytes exceeds limit of {}",
            length, MAX_PACKET_BYTES
        )));
    }

    let mut buf = BytesMut::with_capacity(LENGTH_BYTES + length);
    buf.put_u32(length as u32);
    buf.put_u16(PROTOCOL_VERSION);
    buf.put_slice(&body);
    Ok(buf.freeze())
}

/// Incremental decoder for a packet stream
#[derive(Debug, Default)]
pub struct PacketDecoder {
    buf: BytesMut,
}

impl PacketDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the stream
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes buffered but not yet decoded
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Decode the next complete packet, or `None` if more bytes are needed
    pub fn next_packet(&mut self) -> Result<Option<Packet>> {
        if self.buf.len() < LENGTH_BYTES {
            return Ok(None);
        }

        let length = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
        if length < VERSION_BYTES || length > MAX_PACKET_BYTES {
            return Err(DashtapError::codec(format!("invalid packet length {}", length)));
        }
        if self.buf.len() < LENGTH_BYTES + length {
            return Ok(None);
        }

        self.buf.advance(LENGTH_BYTES);
        let mut frame = self.buf.split_to(length);
        let version = frame.get_u16();
        if version != PROTOCOL_VERSION {
            return Err(DashtapError::UnsupportedVersion(version));
        }

        let packet: Packet = bincode::deserialize(&frame)?;
        if let Some(bad) = packet.frames.iter().find(|f| f.kind != f.payload.kind()) {
            return Err(DashtapError::codec(format!(
                "frame '{}' tagged {} carries a {} payload",
                bad.name,
                bad.kind,
                bad.payload.kind()
            )));
        }
        Ok(Some(packet))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{Cell, Column, MetricKind};
    use crate::wire::frame::{Frame, Payload};
    use pretty_assertions::assert_eq;

    fn sample_packet() -> Packet {
        Packet {
            source: "test".to_string(),
            sequence: 7,
            frames: vec![
                Frame {
                    name: "c".to_string(),
                    kind: MetricKind::Counter,
                    payload: Payload::Counter { value: 1.5 },
                },
                Frame {
                    name: "t".to_string(),
                    kind: MetricKind::Table,
                    payload: Payload::Table {
                        columns: Some(vec![Column::new(0, "A"), Column::new(1, "B")]),
                        rows: vec![0],
                        cells: vec![Cell { row: 0, column: 0, value: "x".into() }],
                    },
                },
            ],
        }
    }

    #[test]
    fn test_decode_split_stream() {
        let packet = sample_packet();
        let bytes = encode_packet(&packet).unwrap();

        let mut decoder = PacketDecoder::new();
        let (head, tail) = bytes.split_at(5);
        decoder.extend(head);
        assert!(decoder.next_packet().unwrap().is_none());

        decoder.extend(tail);
        assert_eq!(decoder.next_packet().unwrap(), Some(packet));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_two_packets_back_to_back() {
        let first = sample_packet();
        let mut second = sample_packet();
        second.sequence = 8;

        let mut decoder = PacketDecoder::new();
        decoder.extend(&encode_packet(&first).unwrap());
        decoder.extend(&encode_packet(&second).unwrap());

        assert_eq!(decoder.next_packet().unwrap().unwrap().sequence, 7);
        assert_eq!(decoder.next_packet().unwrap().unwrap().sequence, 8);
        assert!(decoder.next_packet().unwrap().is_none());
    }

    #[test]
    fn test_unknown_version_rejected() {
        let bytes = encode_packet(&sample_packet()).unwrap();
        let mut tampered = bytes.to_vec();
        tampered[4] = 0xff;

        let mut decoder = PacketDecoder::new();
        decoder.extend(&tampered);
        assert!(matches!(decoder.next_packet(), Err(DashtapError::UnsupportedVersion(_))));
    }

    #[test]
    fn test_kind_tag_must_match_payload() {
        let mut packet = sample_packet();
        packet.frames[0].kind = MetricKind::Gauge;

        let mut decoder = PacketDecoder::new();
        decoder.extend(&encode_packet(&packet).unwrap());
        assert!(matches!(decoder.next_packet(), Err(DashtapError::Codec(_))));
    }

    #[test]
    fn test_bogus_length_rejected() {
        let mut decoder = PacketDecoder::new();
        decoder.extend(&[0, 0, 0, 1, 0]);
        assert!(decoder.next_packet().is_err());
    }
}
