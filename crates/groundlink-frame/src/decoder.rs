//! Restartable deframer.
//!
//! The transport delivers arbitrary chunk boundaries, so decoding is a byte
//! state machine that keeps its partial frame across calls. Corruption never
//! ends the stream: the decoder reports the error and hunts for the next
//! start delimiter.

use bytes::{Buf, BufMut, BytesMut};
use tracing::trace;

use crate::checksum::checksum;
use crate::codec::{
    Frame, CHECKSUM_SIZE, DEFAULT_MAX_PAYLOAD, DELIMITER, ESCAPE, ESCAPE_XOR, HEADER_SIZE,
};
use crate::error::{FrameError, Result};
use crate::frame_type::FrameType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Discarding bytes until a start delimiter.
    Hunting,
    /// Collecting the unescaped body of a frame.
    InFrame,
}

/// Incremental frame decoder.
#[derive(Debug)]
pub struct FrameDecoder {
    max_payload: usize,
    phase: Phase,
    escaped: bool,
    body: BytesMut,
    expected: Option<usize>,
    discarded: usize,
}

impl FrameDecoder {
    /// Create a decoder rejecting payloads larger than `max_payload`.
    pub fn new(max_payload: usize) -> Self {
        Self {
            max_payload,
            phase: Phase::Hunting,
            escaped: false,
            body: BytesMut::with_capacity(HEADER_SIZE + CHECKSUM_SIZE + 64),
            expected: None,
            discarded: 0,
        }
    }

    /// Maximum accepted payload size.
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Whether the decoder is in the middle of a frame.
    pub fn in_frame(&self) -> bool {
        self.phase == Phase::InFrame && (!self.body.is_empty() || self.escaped)
    }

    /// Consume bytes from `src` until a frame or an error is produced.
    ///
    /// Returns `None` once `src` is exhausted without a complete result; the
    /// partial state is kept for the next call.
    pub fn decode_next(&mut self, src: &mut BytesMut) -> Option<Result<Frame>> {
        let mut consumed = 0usize;
        let mut out = None;
        for &byte in src.iter() {
            consumed += 1;
            if let Some(result) = self.push(byte) {
                out = Some(result);
                break;
            }
        }
        src.advance(consumed);
        out
    }

    fn push(&mut self, byte: u8) -> Option<Result<Frame>> {
        match self.phase {
            Phase::Hunting => {
                if byte == DELIMITER {
                    if self.discarded > 0 {
                        trace!(discarded = self.discarded, "resynchronized on delimiter");
                        self.discarded = 0;
                    }
                    self.begin();
                } else {
                    self.discarded += 1;
                }
                None
            }
            Phase::InFrame => self.push_body(byte),
        }
    }

    fn push_body(&mut self, byte: u8) -> Option<Result<Frame>> {
        if byte == DELIMITER {
            if self.body.is_empty() && !self.escaped {
                // Back-to-back delimiters are idle fill.
                return None;
            }
            self.begin();
            return Some(Err(FrameError::Malformed("frame truncated by delimiter")));
        }

        if self.escaped {
            self.escaped = false;
            let raw = byte ^ ESCAPE_XOR;
            if raw != DELIMITER && raw != ESCAPE {
                self.hunt();
                return Some(Err(FrameError::Malformed("invalid escape sequence")));
            }
            self.body.put_u8(raw);
        } else if byte == ESCAPE {
            self.escaped = true;
            return None;
        } else {
            self.body.put_u8(byte);
        }

        if self.expected.is_none() && self.body.len() == 2 {
            let len = u16::from_le_bytes([self.body[0], self.body[1]]) as usize;
            if len > self.max_payload {
                self.hunt();
                return Some(Err(FrameError::Oversized {
                    size: len,
                    max: self.max_payload,
                }));
            }
            self.expected = Some(HEADER_SIZE + len + CHECKSUM_SIZE);
        }

        if self.expected == Some(self.body.len()) {
            return Some(self.finish());
        }
        None
    }

    fn finish(&mut self) -> Result<Frame> {
        let body = self.body.split().freeze();
        self.hunt();

        let crc_at = body.len() - CHECKSUM_SIZE;
        let received = u16::from_le_bytes([body[crc_at], body[crc_at + 1]]);
        let computed = checksum(&[&body[..crc_at]]);
        if computed != received {
            return Err(FrameError::ChecksumMismatch { computed, received });
        }

        let kind = FrameType::from_u8(body[2]).ok_or(FrameError::Malformed("unknown frame type"))?;
        Ok(Frame {
            kind,
            seq: body[3],
            payload: body.slice(HEADER_SIZE..crc_at),
        })
    }

    fn begin(&mut self) {
        self.phase = Phase::InFrame;
        self.escaped = false;
        self.body.clear();
        self.expected = None;
    }

    fn hunt(&mut self) {
        self.phase = Phase::Hunting;
        self.escaped = false;
        self.body.clear();
        self.expected = None;
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD)
    }
}

/// Buffering deframer over an arbitrary byte stream.
#[derive(Debug, Default)]
pub struct Deframer {
    buf: BytesMut,
    decoder: FrameDecoder,
}

impl Deframer {
    /// Create a deframer rejecting payloads larger than `max_payload`.
    pub fn new(max_payload: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            decoder: FrameDecoder::new(max_payload),
        }
    }

    /// Append received bytes and iterate the frames they complete.
    ///
    /// The iterator is lazy: bytes it does not reach stay buffered and are
    /// decoded by the next call.
    pub fn feed(&mut self, bytes: &[u8]) -> Frames<'_> {
        self.buf.extend_from_slice(bytes);
        Frames { deframer: self }
    }

    /// Bytes buffered but not yet examined.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

/// Lazy sequence of decode results produced by [`Deframer::feed`].
pub struct Frames<'a> {
    deframer: &'a mut Deframer,
}

impl Iterator for Frames<'_> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        let Deframer { buf, decoder } = &mut *self.deframer;
        decoder.decode_next(buf)
    }
}
