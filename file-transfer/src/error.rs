//! Error taxonomy shared by the sender, receiver and dispatcher.

use std::net::SocketAddr;

use thiserror::Error;

use crate::packet::PacketError;
use crate::socket::SocketError;

#[derive(Error, Debug)]
pub enum TransferError {
    /// Datagram too short to hold a header.  Discarded by the receiver.
    #[error("malformed packet: {0}")]
    Malformed(#[from] PacketError),

    /// Datagram from someone other than the session's peer.  Discarded.
    #[error("datagram from unexpected sender {0}")]
    UnexpectedSender(SocketAddr),

    /// The sender ran out of retries for packet `seq`; the session is over.
    #[error("no acknowledgement for packet {seq} after {attempts} attempt(s)")]
    AckTimeout { seq: u32, attempts: u32 },

    /// The transfer needs more packets than a 32-bit sequence number can
    /// count.
    #[error("sequence number space exhausted after packet {}", u32::MAX)]
    SequenceExhausted,

    /// The receiver heard nothing from the server within the inactivity window.
    #[error("no response from server within {0:?}")]
    RequestTimeout(std::time::Duration),

    /// The dispatcher was asked for a file it does not serve.
    #[error("requested unknown file {0:?}")]
    UnknownFile(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Socket(#[from] SocketError),

    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransferError {
    /// `true` for errors the state machines recover from by dropping the
    /// offending datagram.
    pub fn is_discardable(&self) -> bool {
        matches!(self, Self::Malformed(_) | Self::UnexpectedSender(_))
    }
}
