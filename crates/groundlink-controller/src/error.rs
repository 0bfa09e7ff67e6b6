use std::path::PathBuf;
use std::time::Duration;

use groundlink_dispatch::DispatchError;
use groundlink_frame::FrameError;
use groundlink_session::LinkError;
use groundlink_transport::TransportError;

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("invalid link settings: {0}")]
    Link(#[from] LinkError),

    #[error("invalid drivers or routes: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("invalid transport address: {0}")]
    Transport(#[from] TransportError),
}

/// Errors that end a controller run or an operator exchange.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The port reached EOF or failed; the peer is gone.
    #[error("transport closed")]
    TransportClosed,

    #[error("link error: {0}")]
    Link(#[from] LinkError),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// An operator exchange did not finish in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

pub type Result<T> = std::result::Result<T, ControllerError>;
