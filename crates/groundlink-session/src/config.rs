use std::time::Duration;

use groundlink_frame::DEFAULT_MAX_PAYLOAD;

use crate::error::{LinkError, Result};

/// Timing and size policy for a link session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Interval between heartbeats while syncing or idle.
    pub heartbeat_interval: Duration,
    /// Heartbeat periods without a valid frame before the peer is declared lost.
    pub missed_heartbeats: u32,
    /// Time allowed for the sync handshake.
    pub handshake_timeout: Duration,
    /// Time to wait for an ACK before resending.
    pub retry_timeout: Duration,
    /// Resends of an unacknowledged frame before giving up.
    pub max_retries: u32,
    /// Largest payload accepted by `send`.
    pub max_payload_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(1),
            missed_heartbeats: 3,
            handshake_timeout: Duration::from_secs(5),
            retry_timeout: Duration::from_millis(500),
            max_retries: 3,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl SessionConfig {
    /// Silence after which an up link is declared down.
    pub fn liveness_timeout(&self) -> Duration {
        self.heartbeat_interval.saturating_mul(self.missed_heartbeats)
    }

    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval.is_zero() {
            return Err(invalid("heartbeat_interval must be greater than zero"));
        }
        if self.missed_heartbeats == 0 {
            return Err(invalid("missed_heartbeats must be at least 1"));
        }
        if self.handshake_timeout.is_zero() {
            return Err(invalid("handshake_timeout must be greater than zero"));
        }
        if self.retry_timeout.is_zero() {
            return Err(invalid("retry_timeout must be greater than zero"));
        }
        if self.max_payload_size == 0 || self.max_payload_size > u16::MAX as usize {
            return Err(LinkError::InvalidConfig(format!(
                "max_payload_size must be within 1..={}",
                u16::MAX
            )));
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> LinkError {
    LinkError::InvalidConfig(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = SessionConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.liveness_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn rejects_zero_intervals() {
        let cfg = SessionConfig {
            heartbeat_interval: Duration::ZERO,
            ..SessionConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(LinkError::InvalidConfig(_))));

        let cfg = SessionConfig {
            retry_timeout: Duration::ZERO,
            ..SessionConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(LinkError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_payload_beyond_length_field() {
        let cfg = SessionConfig {
            max_payload_size: 70_000,
            ..SessionConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("max_payload_size"));
    }

    #[test]
    fn rejects_zero_missed_heartbeats() {
        let cfg = SessionConfig {
            missed_heartbeats: 0,
            ..SessionConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
