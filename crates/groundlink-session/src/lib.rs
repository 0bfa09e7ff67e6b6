//! Link session management for the groundlink controller.
//!
//! A [`Session`] tracks one connection attempt with the remote peer: the
//! DOWN/SYNCING/UP state, per-direction sequence numbers, stop-and-wait
//! retransmission and heartbeat liveness. It is sans-IO so the same state
//! machine drives the async controller, the blocking operator console and
//! the tests.

pub mod config;
pub mod error;
pub mod sequence;
pub mod session;

pub use config::SessionConfig;
pub use error::{LinkError, Result};
pub use sequence::{RxSequence, RxVerdict};
pub use session::{LinkState, Session, SessionEvent, SessionStats, SEND_WINDOW};
