//! Link framing for the groundlink controller.
//!
//! Every frame on the link is:
//! - a `0x7E` start delimiter,
//! - a byte-escaped body of length, type, sequence number and payload,
//! - a CRC-16/MODBUS checksum over the unescaped body.
//!
//! Corrupted input never ends a stream: the decoder reports the error and
//! resynchronizes on the next delimiter.

pub mod checksum;
pub mod codec;
pub mod decoder;
pub mod error;
pub mod frame_type;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod link_codec;

pub use checksum::checksum;
pub use codec::{
    encode_frame, Frame, FrameConfig, CHECKSUM_SIZE, DEFAULT_MAX_PAYLOAD, DELIMITER, ESCAPE,
    HEADER_SIZE,
};
pub use decoder::{Deframer, FrameDecoder, Frames};
pub use error::{FrameError, Result};
pub use frame_type::FrameType;
pub use reader::FrameReader;
pub use writer::FrameWriter;

#[cfg(feature = "async")]
pub use link_codec::LinkCodec;

pub(crate) fn transport_to_frame_error(err: groundlink_transport::TransportError) -> FrameError {
    use groundlink_transport::TransportError;

    match err {
        TransportError::Io(io) | TransportError::Accept(io) => FrameError::Io(io),
        TransportError::Bind { source, .. } | TransportError::Connect { source, .. } => {
            FrameError::Io(source)
        }
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
