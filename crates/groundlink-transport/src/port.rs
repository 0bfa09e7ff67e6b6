//! Async transport ports used by the controller runtime.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::addr::LinkAddr;
use crate::error::{Result, TransportError};

/// Any async byte stream that can carry the link.
pub trait AsyncPort: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> AsyncPort for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// A connected port with its concrete type erased.
pub type BoxedPort = Box<dyn AsyncPort>;

/// Connect to a link endpoint.
pub async fn connect(addr: &LinkAddr) -> Result<BoxedPort> {
    match addr {
        #[cfg(unix)]
        LinkAddr::Unix(path) => {
            let stream = tokio::net::UnixStream::connect(path)
                .await
                .map_err(|e| TransportError::Connect {
                    addr: addr.to_string(),
                    source: e,
                })?;
            debug!(%addr, "connected port");
            Ok(Box::new(stream))
        }
        #[cfg(not(unix))]
        LinkAddr::Unix(_) => Err(TransportError::Connect {
            addr: addr.to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "unix domain sockets are not available on this platform",
            ),
        }),
        LinkAddr::Tcp(hostport) => {
            let stream = TcpStream::connect(hostport.as_str())
                .await
                .map_err(|e| TransportError::Connect {
                    addr: addr.to_string(),
                    source: e,
                })?;
            stream.set_nodelay(true)?;
            debug!(%addr, "connected port");
            Ok(Box::new(stream))
        }
    }
}

/// Listens for the single remote peer on a link address.
///
/// Unix socket files are created with mode 0600 and removed again on drop.
#[derive(Debug)]
pub struct PortListener {
    inner: ListenerInner,
    addr: LinkAddr,
}

#[derive(Debug)]
enum ListenerInner {
    #[cfg(unix)]
    Unix {
        listener: tokio::net::UnixListener,
        // Dropped after the listener, which removes the socket file.
        _guard: crate::uds::SocketPathGuard,
    },
    Tcp(TcpListener),
}

impl PortListener {
    /// Bind to `addr`.
    pub async fn bind(addr: &LinkAddr) -> Result<Self> {
        let inner = match addr {
            #[cfg(unix)]
            LinkAddr::Unix(path) => {
                crate::uds::prepare_socket_path(path)?;
                let listener =
                    tokio::net::UnixListener::bind(path).map_err(|e| TransportError::Bind {
                        addr: addr.to_string(),
                        source: e,
                    })?;
                let guard =
                    crate::uds::SocketPathGuard::adopt(path, crate::uds::DEFAULT_SOCKET_MODE)?;
                ListenerInner::Unix {
                    listener,
                    _guard: guard,
                }
            }
            #[cfg(not(unix))]
            LinkAddr::Unix(_) => {
                return Err(TransportError::Bind {
                    addr: addr.to_string(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::Unsupported,
                        "unix domain sockets are not available on this platform",
                    ),
                });
            }
            LinkAddr::Tcp(hostport) => {
                let listener = TcpListener::bind(hostport.as_str()).await.map_err(|e| {
                    TransportError::Bind {
                        addr: addr.to_string(),
                        source: e,
                    }
                })?;
                ListenerInner::Tcp(listener)
            }
        };

        info!(%addr, "listening for link peer");
        Ok(Self {
            inner,
            addr: addr.clone(),
        })
    }

    /// Wait for the peer to connect.
    pub async fn accept(&self) -> Result<BoxedPort> {
        let port: BoxedPort = match &self.inner {
            #[cfg(unix)]
            ListenerInner::Unix { listener, .. } => {
                let (stream, _) = listener.accept().await.map_err(TransportError::Accept)?;
                Box::new(stream)
            }
            ListenerInner::Tcp(listener) => {
                let (stream, peer) = listener.accept().await.map_err(TransportError::Accept)?;
                stream.set_nodelay(true)?;
                debug!(%peer, "accepted tcp peer");
                Box::new(stream)
            }
        };
        debug!(addr = %self.addr, "accepted link peer");
        Ok(port)
    }

    /// The address this listener was bound to.
    ///
    /// For TCP listeners bound to port 0 this reports the resolved port.
    pub fn local_addr(&self) -> LinkAddr {
        match &self.inner {
            #[cfg(unix)]
            ListenerInner::Unix { .. } => self.addr.clone(),
            ListenerInner::Tcp(listener) => listener
                .local_addr()
                .map(|a| LinkAddr::Tcp(a.to_string()))
                .unwrap_or_else(|_| self.addr.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn tcp_listener_accepts_and_exchanges_bytes() {
        let listener = PortListener::bind(&LinkAddr::Tcp("127.0.0.1:0".to_string()))
            .await
            .unwrap();
        let addr = listener.local_addr();

        let client = tokio::spawn(async move {
            let mut port = connect(&addr).await.unwrap();
            port.write_all(b"ping").await.unwrap();
        });

        let mut port = listener.accept().await.unwrap();
        let mut buf = [0u8; 4];
        port.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
        client.await.unwrap();
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn unix_listener_cleans_up_socket_file() {
        let dir = std::env::temp_dir().join(format!("gl-port-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("link.sock");
        let addr = LinkAddr::Unix(path.clone());

        let listener = PortListener::bind(&addr).await.unwrap();
        assert!(path.exists());

        let client = tokio::spawn({
            let addr = addr.clone();
            async move {
                let mut port = connect(&addr).await.unwrap();
                port.write_all(b"hb").await.unwrap();
            }
        });
        let mut port = listener.accept().await.unwrap();
        let mut buf = [0u8; 2];
        port.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hb");
        client.await.unwrap();

        drop(listener);
        assert!(!path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
