//! Server front end: one socket, one served file, one session at a time.
//!
//! The [`Dispatcher`] receives every datagram arriving on the server socket
//! and decides what it is:
//!
//! | Datagram                 | Action                                     |
//! |--------------------------|--------------------------------------------|
//! | [`PING`]                 | Reply [`PONG`]; no session.                |
//! | the served file's name   | Run [`serve`] for the requester, inline.   |
//! | anything else            | Log and ignore; nothing is sent back.      |
//!
//! A transfer blocks the dispatch loop until it completes or the sender
//! gives up, so at most one session exists at any moment and it owns the
//! socket for its whole lifetime.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::File;
use tokio::io::BufReader;
use tokio::time::Instant;

use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::packet::{PING, PONG};
use crate::sender::{serve, SendReport};
use crate::socket::{DatagramChannel, SocketError};

/// Outcome of one successfully handled datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// A liveness probe was answered.
    Probe,
    /// The served file was streamed to the requester.
    Served(SendReport),
}

/// Serves a single file to whoever asks for it by name.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    path: PathBuf,
    name: String,
    config: TransferConfig,
}

impl Dispatcher {
    /// Requests must name the final component of `path` exactly.
    pub fn new(path: impl Into<PathBuf>, config: TransferConfig) -> Result<Self, TransferError> {
        config.validate()?;
        let path = path.into();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                TransferError::Config(format!("{} has no usable file name", path.display()))
            })?
            .to_string();
        Ok(Self { path, name, config })
    }

    /// Name clients must request.
    pub fn served_name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Dispatch datagrams forever.
    ///
    /// Session failures are logged and the loop keeps serving; only a fatal
    /// error on the socket itself ends it.
    pub async fn run<C>(&self, channel: &C) -> Result<(), TransferError>
    where
        C: DatagramChannel + ?Sized,
    {
        log::info!("[dispatch] serving {} as {:?}", self.path.display(), self.name);
        loop {
            let (data, from) = match channel.recv_from().await {
                Ok(received) => received,
                Err(e) if e.is_transient() => {
                    log::debug!("[dispatch] {e}");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            match self.handle_datagram(channel, &data, from).await {
                Ok(Dispatch::Probe) => log::debug!("[dispatch] answered probe from {from}"),
                Ok(Dispatch::Served(_)) => {}
                Err(TransferError::UnknownFile(name)) => {
                    log::warn!("[dispatch] {from} requested unknown file {name:?}");
                }
                Err(e) => log::error!("[dispatch] session with {from} failed: {e}"),
            }
        }
    }

    /// Handle one datagram received from `from`.
    pub async fn handle_datagram<C>(
        &self,
        channel: &C,
        data: &[u8],
        from: SocketAddr,
    ) -> Result<Dispatch, TransferError>
    where
        C: DatagramChannel + ?Sized,
    {
        if data == PING {
            channel.send_to(PONG, from).await?;
            return Ok(Dispatch::Probe);
        }

        let requested = String::from_utf8_lossy(data);
        log::info!("[dispatch] request for file {requested:?} from {from}");
        if requested.as_ref() != self.name.as_str() {
            return Err(TransferError::UnknownFile(requested.into_owned()));
        }

        let file = File::open(&self.path).await?;
        let mut source = BufReader::new(file);
        let report = serve(&mut source, from, channel, &self.config).await?;
        Ok(Dispatch::Served(report))
    }
}

/// Send a liveness probe to `server` and return the round-trip time.
///
/// Stray datagrams are ignored until `wait` runs out, at which point the
/// probe fails with [`TransferError::RequestTimeout`].
pub async fn probe<C>(channel: &C, server: SocketAddr, wait: Duration) -> Result<Duration, TransferError>
where
    C: DatagramChannel + ?Sized,
{
    let started = Instant::now();
    let deadline = started + wait;
    channel.send_to(PING, server).await?;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(TransferError::RequestTimeout(wait));
        }
        match channel.recv_timeout(remaining).await {
            Ok((data, from)) if from == server && data == PONG => return Ok(started.elapsed()),
            Ok((_, from)) => log::debug!("[dispatch] ignoring datagram from {from} during probe"),
            Err(SocketError::Timeout) => return Err(TransferError::RequestTimeout(wait)),
            Err(e) if e.is_transient() => log::debug!("[dispatch] {e}"),
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn served_name_is_final_component() {
        let d = Dispatcher::new("/srv/data/report.pdf", TransferConfig::default()).unwrap();
        assert_eq!(d.served_name(), "report.pdf");
        assert_eq!(d.path(), Path::new("/srv/data/report.pdf"));
    }

    #[test]
    fn path_without_name_rejected() {
        let err = Dispatcher::new("/", TransferConfig::default()).unwrap_err();
        assert!(matches!(err, TransferError::Config(_)));
    }

    #[test]
    fn invalid_config_rejected() {
        let config = TransferConfig {
            buffer_size: 2,
            ..Default::default()
        };
        assert!(Dispatcher::new("file.bin", config).is_err());
    }
}
