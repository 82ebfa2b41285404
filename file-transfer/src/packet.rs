//! Wire-format definitions for data packets and acknowledgements.
//!
//! Every datagram the sender emits is a [`Packet`]; every datagram the
//! receiver answers with is an ACK.  This module is responsible for:
//! - Defining the on-wire binary layout of both.
//! - Serialising a [`Packet`] into a byte buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Packet`], returning an
//!   error for truncated input.
//!
//! No I/O happens here — this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |      EOF      |                 Payload ...                   |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 5 bytes.
//!
//! An ACK is the 3-byte tag [`ACK_TAG`] followed by the 4-byte sequence
//! number being acknowledged ([`ACK_LEN`] = 7 bytes).  There are no
//! cumulative or range ACKs.

/// Byte length of the fixed-size packet header on the wire.
pub const HEADER_LEN: usize = 5;

/// Literal prefix of every acknowledgement datagram.
pub const ACK_TAG: &[u8; 3] = b"ACK";

/// Byte length of an acknowledgement datagram.
pub const ACK_LEN: usize = ACK_TAG.len() + 4;

/// Liveness probe sent to a dispatcher.
pub const PING: &[u8] = b"ping";

/// Reply to [`PING`].
pub const PONG: &[u8] = b"pong";

const OFF_SEQ: usize = 0;
const OFF_EOF: usize = 4;

/// A single data segment of a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Position of this packet within the transfer, starting at 0.
    pub seq: u32,
    /// Set on the final packet; no data follows it.
    pub eof: bool,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(seq: u32, payload: Vec<u8>, eof: bool) -> Self {
        Self { seq, eof, payload }
    }

    /// Serialise this packet into a newly allocated byte vector.
    ///
    /// The payload is copied verbatim; callers keep it below
    /// `buffer_size - HEADER_LEN` by choosing the chunk size.
    pub fn encode(&self) -> Vec<u8> {
        encode_packet(self.seq, &self.payload, self.eof)
    }

    /// Parse a [`Packet`] from a raw byte slice.
    ///
    /// Everything after the header is taken as payload.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        decode_packet(buf)
    }
}

/// Frame `payload` behind a header carrying `seq` and `eof`.
pub fn encode_packet(seq: u32, payload: &[u8], eof: bool) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(&seq.to_be_bytes());
    buf.push(u8::from(eof));
    buf.extend_from_slice(payload);
    buf
}

/// Returns [`PacketError::BufferTooShort`] if `buf` cannot hold a header.
pub fn decode_packet(buf: &[u8]) -> Result<Packet, PacketError> {
    if buf.len() < HEADER_LEN {
        return Err(PacketError::BufferTooShort(buf.len()));
    }

    let seq = u32::from_be_bytes([
        buf[OFF_SEQ],
        buf[OFF_SEQ + 1],
        buf[OFF_SEQ + 2],
        buf[OFF_SEQ + 3],
    ]);
    // Any non-zero byte counts as true.
    let eof = buf[OFF_EOF] != 0;

    Ok(Packet {
        seq,
        eof,
        payload: buf[HEADER_LEN..].to_vec(),
    })
}

/// Build the acknowledgement datagram for `seq`.
pub fn encode_ack(seq: u32) -> [u8; ACK_LEN] {
    let mut buf = [0u8; ACK_LEN];
    buf[..ACK_TAG.len()].copy_from_slice(ACK_TAG);
    buf[ACK_TAG.len()..].copy_from_slice(&seq.to_be_bytes());
    buf
}

/// Extract the acknowledged sequence number, or `None` if `buf` is not an ACK.
///
/// Not being an ACK is not an error: the sender's socket can also see new
/// file requests and other stray traffic.
pub fn decode_ack(buf: &[u8]) -> Option<u32> {
    if buf.len() != ACK_LEN || !buf.starts_with(ACK_TAG) {
        return None;
    }
    let n = ACK_TAG.len();
    Some(u32::from_be_bytes([buf[n], buf[n + 1], buf[n + 2], buf[n + 3]]))
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// Buffer shorter than the fixed header size; carries the actual length.
    BufferTooShort(usize),
}

impl std::fmt::Display for PacketError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PacketError::BufferTooShort(len) => write!(
                f,
                "datagram of {len} byte(s) is too short to contain a {HEADER_LEN}-byte header"
            ),
        }
    }
}

impl std::error::Error for PacketError {}
