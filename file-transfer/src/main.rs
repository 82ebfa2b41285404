//! Entry point for `file-transfer`.
//!
//! Parses CLI arguments and dispatches into one of the server or client modes.
//! All actual protocol work is delegated to library modules; `main.rs` owns only
//! process setup (logging, argument parsing, path checks).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::fs::{self, File};
use tokio::io::BufWriter;
use tokio::net::TcpListener;

use file_transfer::{dispatcher, receiver, tcp, Dispatcher, Socket, TransferConfig};

/// Transfer a single file over TCP or reliable UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(flatten)]
    transfer: TransferArgs,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Args)]
struct TransferArgs {
    /// Host to bind (servers) or connect to (clients).
    #[arg(long, global = true, env = "HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to bind or connect to.
    #[arg(long, global = true, env = "PORT", default_value_t = 9000)]
    port: u16,

    /// Datagram / read buffer size in bytes, header included.
    #[arg(long, global = true, default_value_t = 1024)]
    buffer_size: usize,

    /// Milliseconds the UDP sender waits for each ACK.
    #[arg(long, global = true, default_value_t = 500)]
    packet_timeout_ms: u64,

    /// Milliseconds of silence after which the UDP client gives up.
    #[arg(long, global = true, default_value_t = 5000)]
    inactivity_timeout_ms: u64,

    /// Transmissions per packet before the UDP sender aborts.
    #[arg(long, global = true, default_value_t = 5)]
    max_retries: u32,
}

impl From<TransferArgs> for TransferConfig {
    fn from(args: TransferArgs) -> Self {
        Self {
            host: args.host,
            port: args.port,
            buffer_size: args.buffer_size,
            packet_timeout: Duration::from_millis(args.packet_timeout_ms),
            inactivity_timeout: Duration::from_millis(args.inactivity_timeout_ms),
            max_retries: args.max_retries,
        }
    }
}

#[derive(Subcommand)]
enum Mode {
    /// Serve one file over reliable UDP until killed.
    UdpServer {
        /// File to serve; clients request it by its file name.
        file: PathBuf,
    },
    /// Download a file from a UDP server.
    UdpClient {
        /// Name of the file to request.
        filename: String,
        /// Where to write it.
        destination: PathBuf,
    },
    /// Serve one file to the first TCP client that connects.
    TcpServer {
        /// File to send.
        file: PathBuf,
    },
    /// Download whatever a TCP server sends.
    TcpClient {
        /// Where to write it.
        destination: PathBuf,
    },
    /// Check that a UDP server is alive.
    Ping,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Set RUST_LOG to control verbosity.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = TransferConfig::from(cli.transfer);
    config.validate()?;

    match cli.mode {
        Mode::UdpServer { file } => {
            ensure_file(&file).await?;
            let dispatcher = Dispatcher::new(&file, config.clone())?;
            let addr = config.resolve().await?;
            let socket = Socket::bind(addr)
                .await
                .with_context(|| format!("failed to bind UDP {addr}"))?;
            log::info!(
                "Serving {} on UDP {}",
                fs::canonicalize(&file).await?.display(),
                socket.local_addr
            );
            dispatcher.run(&socket).await?;
        }
        Mode::UdpClient {
            filename,
            destination,
        } => {
            let server = config.resolve().await?;
            prepare_destination(&destination).await?;
            let socket = Socket::bind_for(server).await?;
            let file = File::create(&destination)
                .await
                .with_context(|| format!("failed to create {}", destination.display()))?;
            let mut out = BufWriter::new(file);
            receiver::fetch(&filename, &mut out, server, &socket, &config).await?;
            log::info!("File saved to {}", destination.display());
        }
        Mode::TcpServer { file } => {
            ensure_file(&file).await?;
            let addr = config.resolve().await?;
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("failed to bind TCP {addr}"))?;
            log::info!("Serving {}", fs::canonicalize(&file).await?.display());
            tcp::serve_once(&listener, &file, config.buffer_size).await?;
        }
        Mode::TcpClient { destination } => {
            let server = config.resolve().await?;
            prepare_destination(&destination).await?;
            log::info!("Downloading to {}", destination.display());
            tcp::download_to_file(server, &destination, config.buffer_size)
                .await
                .with_context(|| format!("download from {server} failed"))?;
            log::info!("Download complete.");
        }
        Mode::Ping => {
            let server = config.resolve().await?;
            let socket = Socket::bind_for(server).await?;
            let rtt = dispatcher::probe(&socket, server, config.inactivity_timeout).await?;
            log::info!("{server} is alive (rtt {rtt:?})");
        }
    }

    Ok(())
}

async fn ensure_file(path: &Path) -> Result<()> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => bail!("not a regular file: {}", path.display()),
        Err(_) => bail!("file does not exist: {}", path.display()),
    }
}

async fn prepare_destination(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    Ok(())
}
