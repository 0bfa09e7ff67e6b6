//! tokio-util codec for async ports.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{encode_frame, Frame, DEFAULT_MAX_PAYLOAD};
use crate::decoder::FrameDecoder;
use crate::error::FrameError;

/// Link framing codec for `FramedRead`/`FramedWrite`.
///
/// Corrupted frames are yielded as `Err` items so the stream keeps going;
/// only I/O errors terminate it.
#[derive(Debug)]
pub struct LinkCodec {
    decoder: FrameDecoder,
    max_payload: usize,
}

impl LinkCodec {
    pub fn new(max_payload: usize) -> Self {
        Self {
            decoder: FrameDecoder::new(max_payload),
            max_payload,
        }
    }
}

impl Default for LinkCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD)
    }
}

impl Decoder for LinkCodec {
    type Item = Result<Frame, FrameError>;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(self.decoder.decode_next(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let item = self.decode(src)?;
        if item.is_none() && self.decoder.in_frame() {
            tracing::debug!("stream ended inside a frame");
        }
        Ok(item)
    }
}

impl Encoder<Frame> for LinkCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if frame.payload.len() > self.max_payload {
            return Err(FrameError::Oversized {
                size: frame.payload.len(),
                max: self.max_payload,
            });
        }
        encode_frame(frame.kind, frame.seq, &frame.payload, dst)
    }
}
