//! Transfer parameters.
//!
//! A [`TransferConfig`] is built once (by the CLI or a test) and handed by
//! reference to every session.  Nothing here is global.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::TransferError;
use crate::packet::HEADER_LEN;

/// Largest payload a single IPv4 UDP datagram can carry.
pub const MAX_UDP_PAYLOAD: usize = 65_507;

/// Adjustable transfer parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    /// Host the server binds to / the client connects to.
    pub host: String,
    pub port: u16,
    /// Size of one datagram, header included.
    pub buffer_size: usize,
    /// How long the sender waits for each ACK before retransmitting.
    pub packet_timeout: Duration,
    /// How long the receiver tolerates silence before giving up.
    pub inactivity_timeout: Duration,
    /// Transmissions per packet before the sender aborts.
    pub max_retries: u32,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9000,
            buffer_size: 1024,
            packet_timeout: Duration::from_millis(500),
            inactivity_timeout: Duration::from_secs(5),
            max_retries: 5,
        }
    }
}

impl TransferConfig {
    /// Bytes of file data per packet.  Zero for a buffer that cannot hold a
    /// header; [`validate`](Self::validate) rejects such a configuration.
    pub fn chunk_size(&self) -> usize {
        self.buffer_size.saturating_sub(HEADER_LEN)
    }

    pub fn validate(&self) -> Result<(), TransferError> {
        if self.buffer_size <= HEADER_LEN {
            return Err(TransferError::Config(format!(
                "buffer size {} leaves no room for payload behind a {HEADER_LEN}-byte header",
                self.buffer_size
            )));
        }
        if self.buffer_size > MAX_UDP_PAYLOAD {
            return Err(TransferError::Config(format!(
                "buffer size {} exceeds the UDP payload limit of {MAX_UDP_PAYLOAD}",
                self.buffer_size
            )));
        }
        if self.max_retries == 0 {
            return Err(TransferError::Config("max retries must be at least 1".into()));
        }
        if self.packet_timeout.is_zero() || self.inactivity_timeout.is_zero() {
            return Err(TransferError::Config("timeouts must be non-zero".into()));
        }
        Ok(())
    }

    /// Resolve `host:port`, taking the first address the resolver returns.
    pub async fn resolve(&self) -> Result<SocketAddr, TransferError> {
        let target = format!("{}:{}", self.host, self.port);
        let addr = tokio::net::lookup_host(&target).await?.next();
        addr.ok_or_else(|| TransferError::Config(format!("{target} did not resolve to an address")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = TransferConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_size(), 1024 - HEADER_LEN);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.packet_timeout, Duration::from_millis(500));
        assert_eq!(config.inactivity_timeout, Duration::from_secs(5));
    }

    #[test]
    fn buffer_must_exceed_header() {
        let config = TransferConfig {
            buffer_size: HEADER_LEN,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(TransferError::Config(_))));

        let config = TransferConfig {
            buffer_size: HEADER_LEN + 1,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_size(), 1);
    }

    #[test]
    fn buffer_smaller_than_header_has_no_chunk() {
        let config = TransferConfig {
            buffer_size: 2,
            ..Default::default()
        };
        assert_eq!(config.chunk_size(), 0);
        assert!(matches!(config.validate(), Err(TransferError::Config(_))));
    }

    #[test]
    fn oversized_buffer_rejected() {
        let config = TransferConfig {
            buffer_size: MAX_UDP_PAYLOAD + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_retries_rejected() {
        let config = TransferConfig {
            max_retries: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_timeout_rejected() {
        let config = TransferConfig {
            packet_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn resolves_loopback() {
        let config = TransferConfig {
            port: 4242,
            ..Default::default()
        };
        let addr = config.resolve().await.unwrap();
        assert_eq!(addr, "127.0.0.1:4242".parse::<SocketAddr>().unwrap());
    }
}
