//! Plain TCP streaming mode.
//!
//! No framing and no protocol: the server accepts one connection, writes the
//! file, and closes; the client reads until EOF.  TCP provides ordering and
//! reliability, so this is only a copy loop.

use std::net::SocketAddr;
use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::{TcpListener, TcpStream};

use crate::error::TransferError;

/// Copy `reader` into `writer` in `buffer_size` pieces until EOF.
///
/// Returns the number of bytes copied.  `writer` is flushed before returning.
pub async fn pump<R, W>(reader: &mut R, writer: &mut W, buffer_size: usize) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; buffer_size.max(1)];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        total += n as u64;
    }
    writer.flush().await?;
    Ok(total)
}

/// Accept a single connection on `listener` and stream `path` to it.
///
/// Returns the peer address and the number of bytes sent.
pub async fn serve_once(
    listener: &TcpListener,
    path: &Path,
    buffer_size: usize,
) -> Result<(SocketAddr, u64), TransferError> {
    log::info!("[tcp] listening on {}", listener.local_addr()?);
    let (mut stream, peer) = listener.accept().await?;
    log::info!("[tcp] connection from {peer}");

    let mut file = File::open(path).await?;
    let sent = pump(&mut file, &mut stream, buffer_size).await?;
    stream.shutdown().await?;

    log::info!("[tcp] finished sending {sent} byte(s) to {peer}");
    Ok((peer, sent))
}

/// Connect to `server` and write everything it sends into `dest`.
pub async fn download<W>(server: SocketAddr, dest: &mut W, buffer_size: usize) -> Result<u64, TransferError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut stream = TcpStream::connect(server).await?;
    log::debug!("[tcp] connected to {server}");
    let received = pump(&mut stream, dest, buffer_size).await?;
    log::info!("[tcp] received {received} byte(s) from {server}");
    Ok(received)
}

/// [`download`] into a freshly created file at `path`.
pub async fn download_to_file(
    server: SocketAddr,
    path: &Path,
    buffer_size: usize,
) -> Result<u64, TransferError> {
    let mut out = BufWriter::new(File::create(path).await?);
    download(server, &mut out, buffer_size).await
}
