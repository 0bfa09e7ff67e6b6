use std::time::Duration;

use crate::command::DriverId;
use crate::telemetry::ResultStatus;

/// Command admission and routing errors.
///
/// Every admission error is reported back to the operator as a RESULT
/// telemetry record carrying [`DispatchError::status`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// No driver is registered under this id, or it is not bound to the opcode.
    #[error("unknown target driver {0}")]
    UnknownTarget(DriverId),

    /// The driver is still executing an earlier command.
    #[error("driver {0} is busy")]
    DriverBusy(DriverId),

    /// The command payload or its arguments could not be decoded.
    #[error("malformed command: {0}")]
    MalformedCommand(String),

    /// No route exists for the opcode.
    #[error("unsupported operation {opcode:#04x}")]
    UnsupportedOperation { opcode: u8 },

    /// The routing table or driver set is inconsistent.
    #[error("invalid route: {0}")]
    InvalidRoute(String),

    /// A telemetry payload could not be decoded.
    #[error("malformed telemetry: {0}")]
    MalformedTelemetry(&'static str),
}

impl DispatchError {
    /// Status code reported in RESULT telemetry.
    pub fn status(&self) -> ResultStatus {
        match self {
            DispatchError::UnknownTarget(_) => ResultStatus::UnknownTarget,
            DispatchError::DriverBusy(_) => ResultStatus::DriverBusy,
            DispatchError::UnsupportedOperation { .. } => ResultStatus::UnsupportedOperation,
            DispatchError::MalformedCommand(_)
            | DispatchError::InvalidRoute(_)
            | DispatchError::MalformedTelemetry(_) => ResultStatus::MalformedCommand,
        }
    }
}

/// Outcome of a failed driver execution. Affects only that command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    /// The driver did not finish within the dispatch timeout.
    #[error("driver timed out after {0:?}")]
    Timeout(Duration),

    /// The driver reported an error or its task failed.
    #[error("driver fault: {0}")]
    Fault(String),
}

impl DriverError {
    pub fn status(&self) -> ResultStatus {
        match self {
            DriverError::Timeout(_) => ResultStatus::DriverTimeout,
            DriverError::Fault(_) => ResultStatus::DriverFault,
        }
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
