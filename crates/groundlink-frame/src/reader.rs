use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use groundlink_transport::LinkStream;

use crate::codec::{Frame, FrameConfig};
use crate::decoder::FrameDecoder;
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;
const READ_CHUNK_SIZE: usize = 1024;

/// Reads frames from any `Read` stream.
///
/// Handles partial reads internally. Corrupted frames surface as recoverable
/// errors (see [`FrameError::is_recoverable`]); the next call continues with
/// the following frame.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    decoder: FrameDecoder,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            decoder: FrameDecoder::new(config.max_payload_size),
        }
    }

    /// Read the next frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached; a
    /// frame cut off by EOF is discarded.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(result) = self.decoder.decode_next(&mut self.buf) {
                return result;
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Read frames until one decodes cleanly, skipping corrupted ones.
    pub fn read_valid_frame(&mut self) -> Result<Frame> {
        loop {
            match self.read_frame() {
                Err(err) if err.is_recoverable() => {
                    tracing::debug!(error = %err, "discarding corrupted frame");
                }
                other => return other,
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl FrameReader<LinkStream> {
    /// Create a frame reader for a `LinkStream` and apply the read timeout from config.
    pub fn with_config_link(inner: LinkStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(crate::transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;

    use super::*;
    use crate::codec::encode_frame;
    use crate::frame_type::FrameType;

    fn wire(frames: &[(FrameType, u8, &[u8])]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for (kind, seq, payload) in frames {
            encode_frame(*kind, *seq, payload, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    #[test]
    fn read_multiple_frames() {
        let bytes = wire(&[
            (FrameType::Command, 1, b"one"),
            (FrameType::Ack, 7, b""),
            (FrameType::Telemetry, 2, b"three"),
        ]);
        let mut reader = FrameReader::new(Cursor::new(bytes));

        let f1 = reader.read_frame().unwrap();
        let f2 = reader.read_frame().unwrap();
        let f3 = reader.read_frame().unwrap();

        assert_eq!((f1.kind, f1.seq, f1.payload.as_ref()), (FrameType::Command, 1, b"one".as_ref()));
        assert_eq!((f2.kind, f2.seq), (FrameType::Ack, 7));
        assert_eq!((f3.kind, f3.payload.as_ref()), (FrameType::Telemetry, b"three".as_ref()));
    }

    #[test]
    fn partial_read_handling() {
        let bytes = wire(&[(FrameType::Command, 4, b"slow")]);
        let mut reader = FrameReader::new(ByteByByteReader { bytes, pos: 0 });

        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.seq, 4);
        assert_eq!(frame.payload.as_ref(), b"slow");
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn connection_closed_mid_frame() {
        let bytes = wire(&[(FrameType::Command, 1, b"only-part")]);
        let mut reader = FrameReader::new(Cursor::new(bytes[..6].to_vec()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn corrupted_frame_is_recoverable() {
        let mut bytes = wire(&[(FrameType::Command, 1, b"bad")]);
        let last = bytes.len() - 1;
        bytes[last] ^= 0x02;
        bytes.extend(wire(&[(FrameType::Command, 2, b"good")]));

        let mut reader = FrameReader::new(Cursor::new(bytes));
        let err = reader.read_frame().unwrap_err();
        assert!(err.is_recoverable());

        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.payload.as_ref(), b"good");
    }

    #[test]
    fn read_valid_frame_skips_garbage() {
        let mut bytes = vec![0x7E, 0x7D, 0x01];
        bytes.extend(wire(&[(FrameType::Heartbeat, 5, b"")]));

        let mut reader = FrameReader::new(Cursor::new(bytes));
        let frame = reader.read_valid_frame().unwrap();
        assert_eq!((frame.kind, frame.seq), (FrameType::Heartbeat, 5));
    }

    #[test]
    fn oversized_frame_in_stream() {
        let bytes = wire(&[(FrameType::Telemetry, 1, &[0u8; 64])]);
        let cfg = FrameConfig {
            max_payload_size: 16,
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(Cursor::new(bytes), cfg);
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::Oversized { .. }));
    }

    #[test]
    fn interrupted_read_retries() {
        let bytes = wire(&[(FrameType::Command, 8, b"ok")]);
        let mut framed = FrameReader::new(InterruptedThenData {
            interrupted: false,
            inner: Cursor::new(bytes),
        });
        let frame = framed.read_frame().unwrap();

        assert_eq!(frame.seq, 8);
        assert_eq!(frame.payload.as_ref(), b"ok");
    }

    #[test]
    #[cfg(unix)]
    fn roundtrip_over_socket_pair() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = crate::writer::FrameWriter::new(LinkStream::from_unix(left));
        let mut reader = FrameReader::with_config_link(
            LinkStream::from_unix(right),
            FrameConfig {
                read_timeout: Some(std::time::Duration::from_secs(5)),
                ..FrameConfig::default()
            },
        )
        .unwrap();

        writer.send(FrameType::Command, 1, b"ping").unwrap();
        let frame = reader.read_frame().unwrap();

        assert_eq!(frame.kind, FrameType::Command);
        assert_eq!(frame.payload.as_ref(), b"ping");
    }

    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct InterruptedThenData {
        interrupted: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }
}
