//! COMMAND payloads and the operations they decode to.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, Result};
use crate::routing::Capability;

/// Driver identifier, the TARGET byte of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriverId(pub u8);

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u8> for DriverId {
    fn from(value: u8) -> Self {
        DriverId(value)
    }
}

/// A decoded COMMAND payload: `[TARGET:1][OPCODE:1][ARGS..]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub target: DriverId,
    pub opcode: u8,
    pub args: Bytes,
}

impl Command {
    pub const HEADER_LEN: usize = 2;

    pub fn new(target: DriverId, opcode: u8, args: impl Into<Bytes>) -> Self {
        Self {
            target,
            opcode,
            args: args.into(),
        }
    }

    pub fn decode(payload: &Bytes) -> Result<Self> {
        if payload.len() < Self::HEADER_LEN {
            return Err(DispatchError::MalformedCommand(format!(
                "payload is {} bytes, need at least {}",
                payload.len(),
                Self::HEADER_LEN
            )));
        }
        Ok(Self {
            target: DriverId(payload[0]),
            opcode: payload[1],
            args: payload.slice(Self::HEADER_LEN..),
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::HEADER_LEN + self.args.len());
        buf.put_u8(self.target.0);
        buf.put_u8(self.opcode);
        buf.put_slice(&self.args);
        buf.freeze()
    }
}

/// Position of a quick-disconnect actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorState {
    Locked,
    Released,
}

impl ActuatorState {
    pub fn as_u8(self) -> u8 {
        match self {
            ActuatorState::Locked => 0,
            ActuatorState::Released => 1,
        }
    }
}

/// The closed set of operations a driver can be asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Power (true) or release (false) a passthrough valve override.
    SetOverride(bool),
    SetActuator(ActuatorState),
    ReadPressure,
    QueryState,
}

impl Operation {
    /// Decode command arguments for the capability the opcode is routed to.
    pub fn decode(capability: Capability, args: &[u8]) -> Result<Self> {
        match (capability, args) {
            (Capability::ValveOverride, [0]) => Ok(Operation::SetOverride(false)),
            (Capability::ValveOverride, [1]) => Ok(Operation::SetOverride(true)),
            (Capability::ValveOverride, _) => Err(malformed("valve override expects one byte, 0 or 1")),
            (Capability::ActuatorControl, [0]) => Ok(Operation::SetActuator(ActuatorState::Locked)),
            (Capability::ActuatorControl, [1]) => Ok(Operation::SetActuator(ActuatorState::Released)),
            (Capability::ActuatorControl, _) => {
                Err(malformed("actuator control expects one byte, 0 (lock) or 1 (release)"))
            }
            (Capability::PressureRead, []) => Ok(Operation::ReadPressure),
            (Capability::StateQuery, []) => Ok(Operation::QueryState),
            (Capability::PressureRead | Capability::StateQuery, _) => {
                Err(malformed("operation takes no arguments"))
            }
        }
    }

    /// The capability a driver needs to perform this operation.
    pub fn capability(&self) -> Capability {
        match self {
            Operation::SetOverride(_) => Capability::ValveOverride,
            Operation::SetActuator(_) => Capability::ActuatorControl,
            Operation::ReadPressure => Capability::PressureRead,
            Operation::QueryState => Capability::StateQuery,
        }
    }
}

fn malformed(reason: &str) -> DispatchError {
    DispatchError::MalformedCommand(reason.to_string())
}
