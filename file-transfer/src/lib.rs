//! `file-transfer` — move one file between two hosts, over TCP or over a
//! stop-and-wait ARQ protocol on UDP.
//!
//! # Architecture
//!
//! ```text
//!   client process                          server process
//!  ┌──────────────┐    filename request    ┌──────────────┐
//!  │   Receiver   │───────────────────────▶│  Dispatcher  │
//!  │   (fetch)    │                        └──────┬───────┘
//!  │              │     DATA seq/eof              │ one session
//!  │              │◀──────────────────────┌──────▼───────┐
//!  │              │        ACK seq        │    Sender    │
//!  │              │──────────────────────▶│   (serve)    │
//!  └──────┬───────┘                       └──────┬───────┘
//!         │ DatagramChannel                      │ DatagramChannel
//!  ┌──────▼───────┐                       ┌──────▼───────┐
//!  │    Socket    │  (tokio UdpSocket)    │    Socket    │
//!  └──────────────┘                       └──────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]     — wire format (serialise / deserialise packets and ACKs)
//! - [`sender`]     — stop-and-wait send loop with bounded retransmission
//! - [`receiver`]   — in-order acceptance, ACKs, inactivity timeout
//! - [`dispatcher`] — server front end: probes, filename matching, sessions
//! - [`socket`]     — datagram channel trait and its UDP implementation
//! - [`simulator`]  — lossy/duplicating channel wrapper for testing
//! - [`tcp`]        — plain TCP streaming mode
//! - [`config`]     — transfer parameters
//! - [`error`]      — error taxonomy

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod simulator;
pub mod socket;
pub mod tcp;

pub use config::TransferConfig;
pub use dispatcher::{probe, Dispatch, Dispatcher};
pub use error::TransferError;
pub use receiver::{fetch, ReceiveReport};
pub use sender::{serve, SendReport};
pub use socket::{DatagramChannel, Socket};
