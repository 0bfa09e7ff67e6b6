//! Controller runtime for groundlink.
//!
//! [`Controller`] drives one link session over an async port and routes
//! delivered commands through the dispatcher; [`OperatorConsole`] is the
//! blocking peer used by operator tools. Both are configured from a TOML
//! [`ControllerConfig`].

pub mod config;
pub mod error;
pub mod operator;
pub mod runtime;

pub use config::{
    ControllerConfig, DispatchSection, DriverKind, DriverSpec, LinkSection, RouteSpec, TransportMode,
    TransportSection,
};
pub use error::{ConfigError, ControllerError, Result};
pub use operator::OperatorConsole;
pub use runtime::{Controller, RunReport};

pub use tokio_util::sync::CancellationToken;
