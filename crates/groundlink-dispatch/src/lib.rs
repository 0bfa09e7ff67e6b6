//! Command dispatch for the groundlink controller.
//!
//! Delivered COMMAND frames are decoded, checked against a static routing
//! table and executed on the target driver as bounded tokio tasks. Every
//! command, admitted or not, produces exactly one RESULT telemetry record;
//! driver readings are queued alongside and drained one frame at a time.

pub mod command;
pub mod dispatcher;
pub mod driver;
pub mod error;
pub mod mock;
pub mod routing;
pub mod telemetry;

pub use command::{ActuatorState, Command, DriverId, Operation};
pub use dispatcher::{Completion, DispatchConfig, DispatchStats, Dispatcher};
pub use driver::{Driver, DriverSet};
pub use error::{DispatchError, DriverError, Result};
pub use mock::{SimulatedActuator, SimulatedPressureSensor, SimulatedValve, ValveDefault, ValveState};
pub use routing::{Capability, Route, RoutingTable};
pub use telemetry::{CommandResult, RecordBody, ResultStatus, TelemetryMessage, TelemetryRecord};
