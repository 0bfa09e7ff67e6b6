use bytes::{BufMut, Bytes, BytesMut};

use crate::checksum::checksum;
use crate::error::{FrameError, Result};
use crate::frame_type::FrameType;

/// Frame start delimiter.
pub const DELIMITER: u8 = 0x7E;

/// Escape marker; the following byte is XORed with [`ESCAPE_XOR`].
pub const ESCAPE: u8 = 0x7D;

/// Value XORed into an escaped byte.
pub const ESCAPE_XOR: u8 = 0x20;

/// Unescaped header: length (2) + type (1) + sequence (1) = 4 bytes.
pub const HEADER_SIZE: usize = 4;

/// Trailing CRC-16.
pub const CHECKSUM_SIZE: usize = 2;

/// Default maximum payload size: 1 KiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 1024;

/// Largest payload the 16-bit length field can describe.
pub const MAX_WIRE_PAYLOAD: usize = u16::MAX as usize;

/// A decoded link frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame type.
    pub kind: FrameType,
    /// Sequence number (per direction, wrapping). For ACKs, the acknowledged sequence.
    pub seq: u8,
    /// Opaque payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(kind: FrameType, seq: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            seq,
            payload: payload.into(),
        }
    }

    /// An acknowledgement for `seq`.
    pub fn ack(seq: u8) -> Self {
        Self::new(FrameType::Ack, seq, Bytes::new())
    }

    /// A heartbeat stamped with the sender's next sequence number.
    pub fn heartbeat(seq: u8) -> Self {
        Self::new(FrameType::Heartbeat, seq, Bytes::new())
    }

    /// Encode this frame into a standalone buffer.
    ///
    /// Checks only the wire limit, like [`encode_frame`].
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut dst = BytesMut::with_capacity(encoded_len_hint(self.payload.len()));
        encode_frame(self.kind, self.seq, &self.payload, &mut dst)?;
        Ok(dst.freeze())
    }
}

/// Encode a frame into the wire format.
///
/// Wire format (everything after the delimiter is byte-escaped):
/// ```text
/// ┌───────┬──────────┬──────┬─────┬───────────────┬──────────────┐
/// │ DELIM │ LEN      │ TYPE │ SEQ │ PAYLOAD       │ CRC-16       │
/// │ 0x7E  │ (2B LE)  │ (1B) │(1B) │ (LEN bytes)   │ (2B LE)      │
/// └───────┴──────────┴──────┴─────┴───────────────┴──────────────┘
/// ```
/// The CRC covers the unescaped LEN, TYPE, SEQ and PAYLOAD.
///
/// Only the wire limit ([`MAX_WIRE_PAYLOAD`]) is checked here. The configured
/// `max_payload_size` is enforced by the senders that carry a configuration:
/// `FrameWriter::send`, the `LinkCodec` encoder and the link session.
pub fn encode_frame(kind: FrameType, seq: u8, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_WIRE_PAYLOAD {
        return Err(FrameError::Oversized {
            size: payload.len(),
            max: MAX_WIRE_PAYLOAD,
        });
    }

    let len = (payload.len() as u16).to_le_bytes();
    let header = [len[0], len[1], kind.as_u8(), seq];
    let crc = checksum(&[&header, payload]).to_le_bytes();

    dst.reserve(encoded_len_hint(payload.len()));
    dst.put_u8(DELIMITER);
    put_escaped(dst, &header);
    put_escaped(dst, payload);
    put_escaped(dst, &crc);
    Ok(())
}

fn put_escaped(dst: &mut BytesMut, bytes: &[u8]) {
    for &byte in bytes {
        if byte == DELIMITER || byte == ESCAPE {
            dst.put_u8(ESCAPE);
            dst.put_u8(byte ^ ESCAPE_XOR);
        } else {
            dst.put_u8(byte);
        }
    }
}

// Unescaped size plus a little slack for escapes.
fn encoded_len_hint(payload_len: usize) -> usize {
    let raw = 1 + HEADER_SIZE + payload_len + CHECKSUM_SIZE;
    raw + raw / 16
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 1 KiB.
    pub max_payload_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_frame_layout() {
        let mut buf = BytesMut::new();
        encode_frame(FrameType::Command, 1, b"hi", &mut buf).unwrap();

        let crc = checksum(&[&[0x02, 0x00, 0x01, 0x01], b"hi"]).to_le_bytes();
        let mut expected = vec![DELIMITER, 0x02, 0x00, 0x01, 0x01, b'h', b'i'];
        for byte in crc {
            if byte == DELIMITER || byte == ESCAPE {
                expected.extend_from_slice(&[ESCAPE, byte ^ ESCAPE_XOR]);
            } else {
                expected.push(byte);
            }
        }
        assert_eq!(buf.as_ref(), expected.as_slice());
    }

    #[test]
    fn delimiter_never_appears_after_start() {
        let payload = [DELIMITER, ESCAPE, DELIMITER, 0x00, ESCAPE];
        let mut buf = BytesMut::new();
        encode_frame(FrameType::Telemetry, DELIMITER, &payload, &mut buf).unwrap();

        assert_eq!(buf[0], DELIMITER);
        assert!(!buf[1..].contains(&DELIMITER));
    }

    #[test]
    fn escapes_special_bytes_in_payload() {
        let mut buf = BytesMut::new();
        encode_frame(FrameType::Command, 0, &[DELIMITER, ESCAPE], &mut buf).unwrap();
        assert_eq!(&buf[5..9], &[ESCAPE, 0x5E, ESCAPE, 0x5D]);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let payload = vec![0u8; MAX_WIRE_PAYLOAD + 1];
        let mut buf = BytesMut::new();
        let err = encode_frame(FrameType::Telemetry, 0, &payload, &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::Oversized { .. }));
        assert!(buf.is_empty());
    }

    #[test]
    fn configured_limit_is_left_to_senders() {
        let payload = vec![0x11u8; DEFAULT_MAX_PAYLOAD + 1];
        let mut buf = BytesMut::new();
        encode_frame(FrameType::Telemetry, 0, &payload, &mut buf).unwrap();
        assert!(buf.len() > DEFAULT_MAX_PAYLOAD);
    }

    #[test]
    fn ack_and_heartbeat_have_empty_payloads() {
        let ack = Frame::ack(9);
        assert_eq!((ack.kind, ack.seq), (FrameType::Ack, 9));
        assert!(ack.payload.is_empty());

        let hb = Frame::heartbeat(3);
        assert_eq!(hb.kind, FrameType::Heartbeat);
        assert!(hb.to_bytes().unwrap().len() >= 1 + HEADER_SIZE + CHECKSUM_SIZE);
    }
}
