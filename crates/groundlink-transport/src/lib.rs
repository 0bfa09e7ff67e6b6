//! Transport ports for the groundlink controller.
//!
//! The controller treats the physical medium as an opaque byte stream. This
//! crate provides the endpoints it can talk to:
//! - Unix domain sockets (serial/radio bridges, local test tunnels)
//! - TCP (network tunnels emulating the radio link)
//!
//! [`LinkStream`] is the blocking flavour used by operator tools; the async
//! [`port`] module (feature `async`) is what the controller runtime uses.

pub mod addr;
pub mod error;
pub mod stream;

#[cfg(feature = "async")]
pub mod port;

#[cfg(all(unix, feature = "async"))]
mod uds;

pub use addr::LinkAddr;
pub use error::{Result, TransportError};
pub use stream::LinkStream;

#[cfg(feature = "async")]
pub use port::{connect, AsyncPort, BoxedPort, PortListener};
