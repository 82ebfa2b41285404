//! File-receiving side of the stop-and-wait protocol.
//!
//! [`Receiver`] implements in-order acceptance:
//!
//! - Only the packet whose sequence number equals [`Receiver::expected`] is
//!   accepted; its payload is delivered and it is ACKed.
//! - Duplicates and out-of-order packets are never delivered.  They are
//!   answered with an ACK for `expected - 1`, the last packet accepted, so a
//!   sender whose ACK was lost stops retransmitting.  Before anything has
//!   been accepted there is nothing to re-acknowledge and no ACK is sent.
//! - Datagrams from anyone but the server, or too short for a header, are
//!   reported as errors the caller discards.
//!
//! [`Receiver`] only manages state; [`fetch`] owns the socket loop and the
//! destination stream.

use std::net::SocketAddr;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::packet::{decode_packet, encode_ack, Packet};
use crate::socket::{DatagramChannel, SocketError};

/// What to do with one inbound datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// In-order packet: write its payload and ACK its sequence number.
    Accept(Packet),
    /// Duplicate or out-of-order packet `seq`: re-send `ack` if present.
    Reject { seq: u32, ack: Option<u32> },
}

/// Receive-side state for one outstanding request.
#[derive(Debug)]
pub struct Receiver {
    /// The only address packets are accepted from.
    pub server: SocketAddr,
    /// Sequence number of the next packet to accept.  Starts at 0.
    pub expected: u32,
    /// Set once the EOF packet has been accepted.
    pub finished: bool,
}

impl Receiver {
    pub fn new(server: SocketAddr) -> Self {
        Self {
            server,
            expected: 0,
            finished: false,
        }
    }

    /// Classify one datagram and advance `expected` if it is accepted.
    pub fn on_datagram(&mut self, data: &[u8], from: SocketAddr) -> Result<Delivery, TransferError> {
        if from != self.server {
            return Err(TransferError::UnexpectedSender(from));
        }
        let packet = decode_packet(data)?;

        if packet.seq != self.expected {
            return Ok(Delivery::Reject {
                seq: packet.seq,
                ack: self.last_accepted(),
            });
        }

        if !packet.eof && packet.seq == u32::MAX {
            return Err(TransferError::SequenceExhausted);
        }
        self.expected = self.expected.saturating_add(1);
        self.finished = packet.eof;
        Ok(Delivery::Accept(packet))
    }

    /// Sequence number of the most recently accepted packet, if any.
    pub fn last_accepted(&self) -> Option<u32> {
        self.expected.checked_sub(1)
    }
}

/// Summary of a completed receive.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveReport {
    /// Packets accepted, the EOF packet included.
    pub packets: u32,
    /// Payload bytes written to the destination.
    pub bytes: u64,
    /// Duplicate or out-of-order packets rejected.
    pub duplicates: u32,
}

/// Request `filename` from `server` and write the transfer into `dest`.
///
/// Returns once the EOF packet has been accepted and ACKed and `dest` has
/// been flushed.  Fails with [`TransferError::RequestTimeout`] if no datagram
/// at all arrives for `config.inactivity_timeout`, and with
/// [`TransferError::Config`] before sending the request if `config` does not
/// validate.
pub async fn fetch<W, C>(
    filename: &str,
    dest: &mut W,
    server: SocketAddr,
    channel: &C,
    config: &TransferConfig,
) -> Result<ReceiveReport, TransferError>
where
    W: AsyncWrite + Unpin + ?Sized,
    C: DatagramChannel + ?Sized,
{
    config.validate()?;
    log::info!("[recv] requesting file {filename:?} from {server}");
    channel.send_to(filename.as_bytes(), server).await?;

    let mut receiver = Receiver::new(server);
    let mut report = ReceiveReport::default();

    while !receiver.finished {
        let (data, from) = match channel.recv_timeout(config.inactivity_timeout).await {
            Ok(received) => received,
            Err(SocketError::Timeout) => {
                log::error!("[recv] timeout waiting for packet {}", receiver.expected);
                return Err(TransferError::RequestTimeout(config.inactivity_timeout));
            }
            Err(e) if e.is_transient() => {
                log::debug!("[recv] {e}; still waiting");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        match receiver.on_datagram(&data, from) {
            Ok(Delivery::Accept(packet)) => {
                if !packet.payload.is_empty() {
                    dest.write_all(&packet.payload).await?;
                }
                channel.send_to(&encode_ack(packet.seq), server).await?;
                log::debug!(
                    "[recv] ← DATA seq={} len={} eof={}; → ACK {}",
                    packet.seq,
                    packet.payload.len(),
                    packet.eof,
                    packet.seq
                );
                report.packets += 1;
                report.bytes += packet.payload.len() as u64;
            }
            Ok(Delivery::Reject { seq, ack }) => {
                report.duplicates += 1;
                match ack {
                    Some(ack) => {
                        channel.send_to(&encode_ack(ack), server).await?;
                        log::debug!("[recv] ← DATA seq={seq} out of order; → ACK {ack}");
                    }
                    None => log::debug!("[recv] ← DATA seq={seq} before first packet; no ACK"),
                }
            }
            Err(TransferError::UnexpectedSender(addr)) => {
                log::warn!("[recv] ignoring packet from unknown sender {addr}");
            }
            Err(e) if e.is_discardable() => log::warn!("[recv] received invalid packet: {e}"),
            Err(e) => return Err(e),
        }
    }

    dest.flush().await?;
    log::info!(
        "[recv] received EOF, file transfer complete: {} byte(s) in {} packet(s)",
        report.bytes,
        report.packets
    );
    Ok(report)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{encode_packet, PacketError, HEADER_LEN};

    fn server() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    #[test]
    fn initial_state() {
        let r = Receiver::new(server());
        assert_eq!(r.expected, 0);
        assert_eq!(r.last_accepted(), None);
        assert!(!r.finished);
    }

    #[test]
    fn in_order_packet_accepted() {
        let mut r = Receiver::new(server());
        let d = r.on_datagram(&encode_packet(0, b"hello", false), server()).unwrap();
        assert_eq!(d, Delivery::Accept(Packet::new(0, b"hello".to_vec(), false)));
        assert_eq!(r.expected, 1);
        assert_eq!(r.last_accepted(), Some(0));
        assert!(!r.finished);
    }

    #[test]
    fn duplicate_reacks_last_accepted_without_advancing() {
        let mut r = Receiver::new(server());
        r.on_datagram(&encode_packet(0, b"a", false), server()).unwrap();
        r.on_datagram(&encode_packet(1, b"b", false), server()).unwrap();

        let d = r.on_datagram(&encode_packet(1, b"b", false), server()).unwrap();
        assert_eq!(d, Delivery::Reject { seq: 1, ack: Some(1) });
        assert_eq!(r.expected, 2);
    }

    #[test]
    fn out_of_order_packet_rejected() {
        let mut r = Receiver::new(server());
        r.on_datagram(&encode_packet(0, b"a", false), server()).unwrap();

        let d = r.on_datagram(&encode_packet(5, b"z", false), server()).unwrap();
        assert_eq!(d, Delivery::Reject { seq: 5, ack: Some(0) });
        assert_eq!(r.expected, 1);
    }

    #[test]
    fn mismatch_before_first_packet_sends_no_ack() {
        let mut r = Receiver::new(server());
        let d = r.on_datagram(&encode_packet(3, b"x", false), server()).unwrap();
        assert_eq!(d, Delivery::Reject { seq: 3, ack: None });
        assert_eq!(r.expected, 0);
    }

    #[test]
    fn eof_packet_finishes_session() {
        let mut r = Receiver::new(server());
        r.on_datagram(&encode_packet(0, b"", true), server()).unwrap();
        assert!(r.finished);
        assert_eq!(r.expected, 1);
    }

    #[test]
    fn last_sequence_number_must_be_eof() {
        let mut r = Receiver::new(server());
        r.expected = u32::MAX;
        let err = r
            .on_datagram(&encode_packet(u32::MAX, b"more", false), server())
            .unwrap_err();
        assert!(matches!(err, TransferError::SequenceExhausted));
        assert!(!err.is_discardable());
        assert_eq!(r.expected, u32::MAX);

        let d = r.on_datagram(&encode_packet(u32::MAX, b"", true), server()).unwrap();
        assert!(matches!(d, Delivery::Accept(_)));
        assert!(r.finished);
    }

    #[tokio::test]
    async fn fetch_rejects_invalid_config_before_requesting() {
        use std::time::Duration;

        use crate::socket::Socket;

        let origin = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let client = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let config = TransferConfig {
            buffer_size: HEADER_LEN,
            ..Default::default()
        };

        let mut out = Vec::new();
        let err = fetch("file.txt", &mut out, origin.local_addr, &client, &config)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Config(_)), "got {err:?}");
        assert!(matches!(
            origin.recv_timeout(Duration::from_millis(50)).await,
            Err(SocketError::Timeout)
        ));
    }

    #[test]
    fn foreign_sender_rejected() {
        let mut r = Receiver::new(server());
        let stranger: SocketAddr = "127.0.0.1:9001".parse().unwrap();
        let err = r.on_datagram(&encode_packet(0, b"x", false), stranger).unwrap_err();
        assert!(matches!(err, TransferError::UnexpectedSender(a) if a == stranger));
        assert!(err.is_discardable());
        assert_eq!(r.expected, 0);
    }

    #[test]
    fn short_datagram_rejected() {
        let mut r = Receiver::new(server());
        let err = r.on_datagram(&[0u8; HEADER_LEN - 1], server()).unwrap_err();
        assert!(matches!(
            err,
            TransferError::Malformed(PacketError::BufferTooShort(4))
        ));
        assert!(err.is_discardable());
        assert_eq!(r.expected, 0);
    }
}
