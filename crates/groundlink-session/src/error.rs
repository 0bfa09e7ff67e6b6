use groundlink_frame::{FrameError, FrameType};

/// Errors raised by the link session.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// No valid frame within the liveness window, or retransmissions exhausted.
    #[error("peer unresponsive")]
    PeerUnresponsive,

    /// The sync handshake did not complete in time.
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// A send was attempted while the link is not up.
    #[error("link is not up")]
    NotConnected,

    /// A data frame is still awaiting its acknowledgement.
    #[error("send window full ({0} outstanding)")]
    WindowFull(usize),

    /// Session configuration rejected by validation.
    #[error("invalid session configuration: {0}")]
    InvalidConfig(String),

    /// ACK and HEARTBEAT frames are generated by the session itself.
    #[error("{0} frames are not sequenced by callers")]
    NotSequenced(FrameType),

    /// Frame-level error while encoding an outbound frame.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
}

pub type Result<T> = std::result::Result<T, LinkError>;
