//! File-serving side of the stop-and-wait protocol.
//!
//! [`Sender`] tracks the sequence number and transmission count of the single
//! in-flight packet.  It does **not** touch the socket; [`serve`] owns the
//! read/transmit/await loop and consults the [`Sender`] for every decision.
//!
//! # Stop-and-Wait contract
//! - At most **one** packet is in flight at any moment.
//! - The next chunk is read only after the current packet's ACK arrives.
//! - On timeout: resend the same bytes, up to `max_retries` transmissions.
//! - A datagram that is not the matching ACK from the peer is ignored and
//!   the wait continues until the attempt's deadline; it does not count as
//!   an attempt.
//! - The final packet carries an empty payload and the EOF flag.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;

use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::packet::{decode_ack, Packet};
use crate::socket::{DatagramChannel, SocketError};

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// Stop-and-wait send-side state for one session.
#[derive(Debug)]
pub struct Sender {
    /// Address every packet goes to and every ACK must come from.
    pub peer: SocketAddr,

    /// Sequence number of the in-flight packet.  Starts at 0.
    pub seq: u32,

    /// Transmissions of the in-flight packet so far (1 = first send).
    pub tx_count: u32,

    max_retries: u32,
}

impl Sender {
    pub fn new(peer: SocketAddr, max_retries: u32) -> Self {
        Self {
            peer,
            seq: 0,
            tx_count: 0,
            max_retries,
        }
    }

    /// Frame `chunk` with the current sequence number.
    ///
    /// An empty chunk means the source is exhausted and becomes the EOF packet.
    pub fn frame(&self, chunk: Vec<u8>) -> Packet {
        let eof = chunk.is_empty();
        Packet::new(self.seq, chunk, eof)
    }

    /// Note one transmission of the in-flight packet.
    pub fn on_transmit(&mut self) {
        self.tx_count += 1;
    }

    /// `true` if `datagram` from `from` acknowledges the in-flight packet.
    pub fn is_ack(&self, datagram: &[u8], from: SocketAddr) -> bool {
        from == self.peer && decode_ack(datagram) == Some(self.seq)
    }

    /// `true` while another transmission of the in-flight packet is allowed.
    pub fn can_retry(&self) -> bool {
        self.tx_count < self.max_retries
    }

    /// Move on to the next packet after a successful ACK.
    ///
    /// Sequence numbers never wrap: a packet after `u32::MAX` is refused with
    /// [`TransferError::SequenceExhausted`] and the state is left unchanged.
    pub fn advance(&mut self) -> Result<(), TransferError> {
        self.seq = self.seq.checked_add(1).ok_or(TransferError::SequenceExhausted)?;
        self.tx_count = 0;
        Ok(())
    }
}

/// Summary of a completed send.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SendReport {
    /// Distinct packets delivered, the EOF packet included.
    pub packets: u32,
    /// Payload bytes delivered.
    pub bytes: u64,
    /// Transmissions beyond the first, summed over all packets.
    pub retransmissions: u32,
}

// ---------------------------------------------------------------------------
// Session loop
// ---------------------------------------------------------------------------

/// Stream `source` to `dest` over `channel` until the EOF packet is ACKed.
///
/// Fails with [`TransferError::Config`] before sending anything if `config`
/// does not validate, and with [`TransferError::AckTimeout`] if some packet is
/// transmitted `config.max_retries` times without a matching ACK.  The source is read
/// sequentially and never rewound, so a failed session cannot be resumed.
pub async fn serve<R, C>(
    source: &mut R,
    dest: SocketAddr,
    channel: &C,
    config: &TransferConfig,
) -> Result<SendReport, TransferError>
where
    R: AsyncRead + Unpin + ?Sized,
    C: DatagramChannel + ?Sized,
{
    config.validate()?;
    let mut sender = Sender::new(dest, config.max_retries);
    let mut report = SendReport::default();
    let mut chunk = vec![0u8; config.chunk_size()];

    log::info!("[send] sending to {dest}");

    loop {
        let n = read_chunk(source, &mut chunk).await?;
        let packet = sender.frame(chunk[..n].to_vec());
        let bytes = packet.encode();

        loop {
            channel.send_to(&bytes, dest).await?;
            sender.on_transmit();
            log::debug!(
                "[send] → DATA seq={} len={} eof={} tx={}",
                packet.seq,
                packet.payload.len(),
                packet.eof,
                sender.tx_count
            );

            if await_ack(channel, &sender, config.packet_timeout).await? {
                log::debug!("[send] ← ACK {}", packet.seq);
                break;
            }
            if !sender.can_retry() {
                log::error!(
                    "[send] no ACK for packet {} after {} attempt(s); aborting transfer to {dest}",
                    packet.seq,
                    sender.tx_count
                );
                return Err(TransferError::AckTimeout {
                    seq: packet.seq,
                    attempts: sender.tx_count,
                });
            }
            log::debug!(
                "[send] timeout waiting for ACK {}, retry {}",
                packet.seq,
                sender.tx_count
            );
        }

        report.packets += 1;
        report.bytes += packet.payload.len() as u64;
        report.retransmissions += sender.tx_count - 1;

        if packet.eof {
            break;
        }
        sender.advance()?;
    }

    log::info!(
        "[send] finished sending to {dest}: {} byte(s) in {} packet(s), {} retransmission(s)",
        report.bytes,
        report.packets,
        report.retransmissions
    );
    Ok(report)
}

/// Wait up to `wait` for the ACK of the in-flight packet.
///
/// Returns `Ok(false)` when the deadline passes without it.
async fn await_ack<C>(channel: &C, sender: &Sender, wait: Duration) -> Result<bool, TransferError>
where
    C: DatagramChannel + ?Sized,
{
    let deadline = Instant::now() + wait;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(false);
        }
        match channel.recv_timeout(remaining).await {
            Ok((data, from)) => {
                if sender.is_ack(&data, from) {
                    return Ok(true);
                }
                log::debug!(
                    "[send] ignoring {} byte(s) from {from} while awaiting ACK {}",
                    data.len(),
                    sender.seq
                );
            }
            Err(SocketError::Timeout) => return Ok(false),
            Err(e) if e.is_transient() => log::debug!("[send] {e}; still waiting"),
            Err(e) => return Err(e.into()),
        }
    }
}

/// Read until `buf` is full or the source is exhausted.
async fn read_chunk<R>(source: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
