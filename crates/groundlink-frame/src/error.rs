/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The received checksum does not match the frame contents.
    #[error("checksum mismatch (computed {computed:#06x}, received {received:#06x})")]
    ChecksumMismatch { computed: u16, received: u16 },

    /// The length field exceeds the configured maximum payload size.
    #[error("frame too large ({size} bytes, max {max})")]
    Oversized { size: usize, max: usize },

    /// Truncated frame, invalid escape sequence, or unknown frame type.
    #[error("malformed frame: {0}")]
    Malformed(&'static str),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The link was closed.
    #[error("connection closed")]
    ConnectionClosed,
}

impl FrameError {
    /// Whether the byte stream can continue after this error.
    ///
    /// Corruption errors are recovered by resynchronizing on the next
    /// delimiter; I/O errors and EOF end the stream.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FrameError::ChecksumMismatch { .. } | FrameError::Oversized { .. } | FrameError::Malformed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
