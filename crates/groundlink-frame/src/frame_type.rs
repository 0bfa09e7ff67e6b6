//! Frame types carried in the TYPE header byte.

use std::fmt;

/// The closed set of frame types on the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// Operator command for a driver.
    Command = 0x01,
    /// Driver telemetry or a command result.
    Telemetry = 0x02,
    /// Acknowledgement; SEQ carries the acknowledged sequence number.
    Ack = 0x03,
    /// Link liveness check, also used for the sync handshake.
    Heartbeat = 0x04,
}

impl FrameType {
    /// Wire value of this type.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parse a TYPE header byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(FrameType::Command),
            0x02 => Some(FrameType::Telemetry),
            0x03 => Some(FrameType::Ack),
            0x04 => Some(FrameType::Heartbeat),
            _ => None,
        }
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            FrameType::Command => "COMMAND",
            FrameType::Telemetry => "TELEMETRY",
            FrameType::Ack => "ACK",
            FrameType::Heartbeat => "HEARTBEAT",
        }
    }

    /// COMMAND and TELEMETRY carry sequenced data and must be acknowledged.
    pub fn requires_ack(self) -> bool {
        matches!(self, FrameType::Command | FrameType::Telemetry)
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values_round_trip() {
        for kind in [
            FrameType::Command,
            FrameType::Telemetry,
            FrameType::Ack,
            FrameType::Heartbeat,
        ] {
            assert_eq!(FrameType::from_u8(kind.as_u8()), Some(kind));
        }
        assert_eq!(FrameType::from_u8(0x00), None);
        assert_eq!(FrameType::from_u8(0x05), None);
    }

    #[test]
    fn only_data_frames_require_ack() {
        assert!(FrameType::Command.requires_ack());
        assert!(FrameType::Telemetry.requires_ack());
        assert!(!FrameType::Ack.requires_ack());
        assert!(!FrameType::Heartbeat.requires_ack());
    }
}
