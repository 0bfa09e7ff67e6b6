use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::TransportError;

/// Address of the physical (or emulated) link endpoint.
///
/// Parsed from `unix:/path/to.sock`, `tcp:host:port`, or a bare absolute
/// path which is taken as a Unix socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAddr {
    /// Unix domain socket path, typically a serial bridge or a test tunnel.
    Unix(PathBuf),
    /// TCP `host:port`, used for network tunnels that emulate the radio link.
    Tcp(String),
}

impl FromStr for LinkAddr {
    type Err = TransportError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if let Some(path) = trimmed.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(TransportError::InvalidAddress {
                    input: input.to_string(),
                    reason: "empty socket path",
                });
            }
            return Ok(LinkAddr::Unix(PathBuf::from(path)));
        }

        if let Some(hostport) = trimmed.strip_prefix("tcp:") {
            let valid = hostport
                .rsplit_once(':')
                .map(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
                .unwrap_or(false);
            if !valid {
                return Err(TransportError::InvalidAddress {
                    input: input.to_string(),
                    reason: "expected tcp:host:port",
                });
            }
            return Ok(LinkAddr::Tcp(hostport.to_string()));
        }

        if trimmed.starts_with('/') {
            return Ok(LinkAddr::Unix(PathBuf::from(trimmed)));
        }

        Err(TransportError::InvalidAddress {
            input: input.to_string(),
            reason: "expected unix:PATH or tcp:HOST:PORT",
        })
    }
}

impl fmt::Display for LinkAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkAddr::Unix(path) => write!(f, "unix:{}", path.display()),
            LinkAddr::Tcp(hostport) => write!(f, "tcp:{hostport}"),
        }
    }
}
