//! Async UDP socket abstraction.
//!
//! [`DatagramChannel`] is the only view of the network the state machines
//! have: send a datagram, receive one, optionally with a deadline.  [`Socket`]
//! implements it over `tokio::net::UdpSocket`; [`crate::simulator::Simulator`]
//! wraps any channel to inject faults in tests.
//!
//! All protocol logic lives elsewhere; this module owns only byte I/O.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;

/// Maximum UDP payload size (theoretical limit; in practice kept much smaller).
const MAX_DATAGRAM: usize = 65_535;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can arise from socket operations.
#[derive(Debug)]
pub enum SocketError {
    /// Underlying I/O error from the OS.
    Io(std::io::Error),
    /// No datagram arrived before the deadline.
    Timeout,
}

impl SocketError {
    /// `true` for errors the OS reports on behalf of an *earlier* datagram
    /// (ICMP port unreachable and friends).  The socket is still usable and
    /// the caller should treat it as "nothing received".
    pub fn is_transient(&self) -> bool {
        use std::io::ErrorKind;
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                ErrorKind::ConnectionRefused
                    | ErrorKind::ConnectionReset
                    | ErrorKind::Interrupted
                    | ErrorKind::WouldBlock
            ),
            Self::Timeout => false,
        }
    }
}

impl std::fmt::Display for SocketError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "socket I/O error: {e}"),
            Self::Timeout => write!(f, "timed out waiting for a datagram"),
        }
    }
}

impl std::error::Error for SocketError {}

impl From<std::io::Error> for SocketError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

// ---------------------------------------------------------------------------
// DatagramChannel
// ---------------------------------------------------------------------------

/// Unreliable, unordered datagram transport.
///
/// All methods are `&self` so a channel can be shared across tasks.
#[async_trait]
pub trait DatagramChannel: Send + Sync {
    /// Send `buf` as a single datagram to `dest`.
    async fn send_to(&self, buf: &[u8], dest: SocketAddr) -> Result<(), SocketError>;

    /// Wait for the next datagram.  Returns `(bytes, sender_address)`.
    async fn recv_from(&self) -> Result<(Vec<u8>, SocketAddr), SocketError>;

    /// Like [`recv_from`](Self::recv_from), but gives up with
    /// [`SocketError::Timeout`] once `wait` has elapsed.
    async fn recv_timeout(&self, wait: Duration) -> Result<(Vec<u8>, SocketAddr), SocketError> {
        match tokio::time::timeout(wait, self.recv_from()).await {
            Ok(result) => result,
            Err(_) => Err(SocketError::Timeout),
        }
    }
}

// ---------------------------------------------------------------------------
// Socket
// ---------------------------------------------------------------------------

/// A bound UDP socket.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, SocketError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }

    /// Bind an ephemeral port on the unspecified address of the same family
    /// as `peer`.  Used by clients that only ever talk to one server.
    pub async fn bind_for(peer: SocketAddr) -> Result<Self, SocketError> {
        let any: SocketAddr = if peer.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        Self::bind(any).await
    }
}

#[async_trait]
impl DatagramChannel for Socket {
    async fn send_to(&self, buf: &[u8], dest: SocketAddr) -> Result<(), SocketError> {
        self.inner.send_to(buf, dest).await?;
        Ok(())
    }

    async fn recv_from(&self) -> Result<(Vec<u8>, SocketAddr), SocketError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (n, addr) = self.inner.recv_from(&mut buf).await?;
        buf.truncate(n);
        Ok((buf, addr))
    }
}
