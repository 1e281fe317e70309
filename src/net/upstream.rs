//! Upstream connection state machine and lifecycle tracking.
//!
//! # Responsibilities
//! - Represent one backend connection handle (one matrix cell)
//! - Track connection state (Disconnected → Connecting → Connected / Broken)
//! - Dial TCP or Unix-socket endpoints with a timeout
//! - Redial broken connections on next use

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

/// Endpoint descriptor for a configured location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// TCP backend, e.g. "127.0.0.1:9000".
    Tcp(SocketAddr),
    /// Local socket backend, e.g. "unix:/run/app.sock".
    Unix(PathBuf),
}

impl Endpoint {
    /// Parse a configured address string. Returns `None` when the string is
    /// neither a socket address nor a "unix:" path.
    pub fn parse(address: &str) -> Option<Endpoint> {
        if let Some(path) = address.strip_prefix("unix:") {
            if path.is_empty() {
                return None;
            }
            return Some(Endpoint::Unix(PathBuf::from(path)));
        }
        address.parse().ok().map(Endpoint::Tcp)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "{}", addr),
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// Connection state for lifecycle tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never dialed, or explicitly closed.
    Disconnected,
    /// Dial in progress.
    Connecting,
    /// Transport established and usable.
    Connected,
    /// I/O failed on an established transport; redial on next use.
    Broken,
}

/// The established transport for a connected cell.
#[derive(Debug)]
pub enum Transport {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

/// One backend connection handle.
///
/// Exactly one worker owns each handle after matrix distribution, so no
/// internal synchronization is needed.
#[derive(Debug)]
pub struct UpstreamConnection {
    endpoint: Endpoint,
    connect_timeout: Duration,
    state: ConnectionState,
    transport: Option<Transport>,
}

impl UpstreamConnection {
    /// Create a handle in the `Disconnected` state. No I/O happens here;
    /// dialing is driven by the owning worker's dial policy.
    pub fn new(endpoint: Endpoint, connect_timeout: Duration) -> Self {
        Self {
            endpoint,
            connect_timeout,
            state: ConnectionState::Disconnected,
            transport: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Dial the endpoint, replacing any previous transport.
    ///
    /// On failure the handle is left `Broken` so the next use retries.
    pub async fn connect(&mut self) -> io::Result<()> {
        self.transport = None;
        self.state = ConnectionState::Connecting;

        let dialed = tokio::time::timeout(self.connect_timeout, self.dial()).await;
        match dialed {
            Ok(Ok(transport)) => {
                self.transport = Some(transport);
                self.state = ConnectionState::Connected;
                tracing::debug!(endpoint = %self.endpoint, "upstream connected");
                Ok(())
            }
            Ok(Err(e)) => {
                self.state = ConnectionState::Broken;
                Err(e)
            }
            Err(_) => {
                self.state = ConnectionState::Broken;
                Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {} timed out", self.endpoint),
                ))
            }
        }
    }

    async fn dial(&self) -> io::Result<Transport> {
        match &self.endpoint {
            Endpoint::Tcp(addr) => TcpStream::connect(addr).await.map(Transport::Tcp),
            #[cfg(unix)]
            Endpoint::Unix(path) => UnixStream::connect(path).await.map(Transport::Unix),
            #[cfg(not(unix))]
            Endpoint::Unix(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "unix sockets are not supported on this platform",
            )),
        }
    }

    /// The established transport, dialing first if the handle is not
    /// currently `Connected`.
    pub async fn transport(&mut self) -> io::Result<&mut Transport> {
        if self.state != ConnectionState::Connected {
            self.connect().await?;
        }
        self.transport.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "no transport after connect")
        })
    }

    /// Record an I/O failure on the established transport. The next use
    /// redials.
    pub fn mark_broken(&mut self) {
        tracing::warn!(endpoint = %self.endpoint, "upstream connection broken");
        self.transport = None;
        self.state = ConnectionState::Broken;
    }

    /// Drop the transport without flagging an error.
    pub fn close(&mut self) {
        self.transport = None;
        self.state = ConnectionState::Disconnected;
    }
}
