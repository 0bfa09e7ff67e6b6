//! Ground-side communication controller for a vehicle telemetry and command link.
//!
//! groundlink frames bytes on an unreliable serial or radio link, keeps a
//! sequenced, acknowledged session alive over it, and routes operator
//! commands to hardware drivers while streaming telemetry back.
//!
//! # Crate Structure
//!
//! - [`transport`]: Unix socket and TCP ports, blocking and async
//! - [`frame`]: delimited, escaped, CRC-checked framing
//! - [`session`]: the sans-IO link session state machine
//! - [`dispatch`]: command routing, drivers and telemetry payloads
//! - [`controller`]: configuration, runtime and operator console (behind `controller` feature)

/// Re-export transport types.
pub mod transport {
    pub use groundlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use groundlink_frame::*;
}

/// Re-export session types.
pub mod session {
    pub use groundlink_session::*;
}

/// Re-export dispatch types.
pub mod dispatch {
    pub use groundlink_dispatch::*;
}

/// Re-export controller types (requires `controller` feature).
#[cfg(feature = "controller")]
pub mod controller {
    pub use groundlink_controller::*;
}
