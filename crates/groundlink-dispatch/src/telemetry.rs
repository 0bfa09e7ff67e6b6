//! TELEMETRY payloads.
//!
//! ```text
//! READING: [0x01][SOURCE:1][TIMESTAMP_MS:8 LE][DATA..]
//! RESULT:  [0x02][CMD_SEQ:1][TARGET:1][OPCODE:1][STATUS:1][BODY..]
//! ```

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::command::DriverId;
use crate::error::{DispatchError, Result};

pub const READING_TAG: u8 = 0x01;
pub const RESULT_TAG: u8 = 0x02;

/// RESULT status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ResultStatus {
    Ok = 0,
    UnknownTarget = 1,
    DriverBusy = 2,
    DriverTimeout = 3,
    DriverFault = 4,
    MalformedCommand = 5,
    UnsupportedOperation = 6,
}

impl ResultStatus {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => ResultStatus::Ok,
            1 => ResultStatus::UnknownTarget,
            2 => ResultStatus::DriverBusy,
            3 => ResultStatus::DriverTimeout,
            4 => ResultStatus::DriverFault,
            5 => ResultStatus::MalformedCommand,
            6 => ResultStatus::UnsupportedOperation,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            ResultStatus::Ok => "ok",
            ResultStatus::UnknownTarget => "unknown_target",
            ResultStatus::DriverBusy => "driver_busy",
            ResultStatus::DriverTimeout => "driver_timeout",
            ResultStatus::DriverFault => "driver_fault",
            ResultStatus::MalformedCommand => "malformed_command",
            ResultStatus::UnsupportedOperation => "unsupported_operation",
        }
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one command, admitted or rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Link sequence number of the COMMAND frame.
    pub command_seq: u8,
    pub target: DriverId,
    pub opcode: u8,
    pub status: ResultStatus,
    /// Driver output on success, UTF-8 detail text on error.
    pub body: Bytes,
}

/// What a telemetry record carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordBody {
    Reading(Bytes),
    Result(CommandResult),
}

/// One queued telemetry item, consumed once when encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryRecord {
    pub source: DriverId,
    pub body: RecordBody,
    pub generated_at: SystemTime,
}

impl TelemetryRecord {
    pub fn reading(source: DriverId, data: Bytes) -> Self {
        Self {
            source,
            body: RecordBody::Reading(data),
            generated_at: SystemTime::now(),
        }
    }

    pub fn result(result: CommandResult) -> Self {
        Self {
            source: result.target,
            body: RecordBody::Result(result),
            generated_at: SystemTime::now(),
        }
    }

    /// Encode as a TELEMETRY frame payload.
    pub fn encode(&self) -> Bytes {
        match &self.body {
            RecordBody::Reading(data) => {
                let mut buf = BytesMut::with_capacity(10 + data.len());
                buf.put_u8(READING_TAG);
                buf.put_u8(self.source.0);
                buf.put_u64_le(unix_millis(self.generated_at));
                buf.put_slice(data);
                buf.freeze()
            }
            RecordBody::Result(result) => {
                let mut buf = BytesMut::with_capacity(5 + result.body.len());
                buf.put_u8(RESULT_TAG);
                buf.put_u8(result.command_seq);
                buf.put_u8(result.target.0);
                buf.put_u8(result.opcode);
                buf.put_u8(result.status.as_u8());
                buf.put_slice(&result.body);
                buf.freeze()
            }
        }
    }
}

fn unix_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A decoded TELEMETRY payload, as seen by the operator side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryMessage {
    Reading {
        source: DriverId,
        timestamp_ms: u64,
        data: Bytes,
    },
    Result(CommandResult),
}

impl TelemetryMessage {
    pub fn decode(payload: &Bytes) -> Result<Self> {
        let mut buf = payload.clone();
        if buf.is_empty() {
            return Err(DispatchError::MalformedTelemetry("empty payload"));
        }
        match buf.get_u8() {
            READING_TAG => {
                if buf.len() < 9 {
                    return Err(DispatchError::MalformedTelemetry("reading header truncated"));
                }
                let source = DriverId(buf.get_u8());
                let timestamp_ms = buf.get_u64_le();
                Ok(TelemetryMessage::Reading {
                    source,
                    timestamp_ms,
                    data: buf,
                })
            }
            RESULT_TAG => {
                if buf.len() < 4 {
                    return Err(DispatchError::MalformedTelemetry("result header truncated"));
                }
                let command_seq = buf.get_u8();
                let target = DriverId(buf.get_u8());
                let opcode = buf.get_u8();
                let status = ResultStatus::from_u8(buf.get_u8())
                    .ok_or(DispatchError::MalformedTelemetry("unknown result status"))?;
                Ok(TelemetryMessage::Result(CommandResult {
                    command_seq,
                    target,
                    opcode,
                    status,
                    body: buf,
                }))
            }
            _ => Err(DispatchError::MalformedTelemetry("unknown record tag")),
        }
    }
}
