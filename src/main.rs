use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dcap::{logging, DataChannel, DcapConfig, DoorSession};
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Default transfer block size (1MB)
const DEFAULT_BLOCK_SIZE: usize = 1024 * 1024;

#[derive(Parser, Debug)]
#[command(name = "dcap", version, about = "Read and write files through a dCache dcap door")]
struct Cli {
    /// TOML config file (timeouts, limits)
    #[arg(long, global = true, env = "DCAP_CONFIG")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Copy a remote file (or a byte range of it) to stdout
    Cat {
        /// Door address, host:port
        door: String,
        /// Remote path
        path: String,
        /// Start offset in bytes
        #[arg(long, default_value_t = 0)]
        offset: u64,
        /// Stop after this many bytes
        #[arg(long)]
        length: Option<u64>,
        #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
        block_size: usize,
    },
    /// Upload a local file to a remote path
    Put {
        /// Door address, host:port
        door: String,
        /// Remote path
        path: String,
        /// Local file to upload
        local: PathBuf,
        #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
        block_size: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose)?;

    let config = match &cli.config {
        Some(path) => DcapConfig::load(path)?,
        None => DcapConfig::default(),
    };

    match cli.command {
        Command::Cat {
            door,
            path,
            offset,
            length,
            block_size,
        } => {
            let (session, channel) = open_channel(&door, &path, "r", &config).await?;
            let outcome = cat(&channel, offset, length, block_size.max(1)).await;
            finish(session, channel, outcome).await
        }
        Command::Put {
            door,
            path,
            local,
            block_size,
        } => {
            let file = File::open(&local)
                .await
                .with_context(|| format!("Failed to open {}", local.display()))?;
            let (session, channel) = open_channel(&door, &path, "w", &config).await?;
            let outcome = put(&channel, file, block_size.max(1)).await;
            finish(session, channel, outcome).await
        }
    }
}

/// Door handshake and open, then bind the data channel the door hands out.
async fn open_channel(
    door: &str,
    path: &str,
    mode: &str,
    config: &DcapConfig,
) -> Result<(DoorSession, DataChannel)> {
    let mut session = DoorSession::connect(door, config)
        .await
        .with_context(|| format!("Failed to reach door {}", door))?;
    let endpoint = session
        .open(path, mode)
        .await
        .with_context(|| format!("Door refused {} ({})", path, mode))?;
    let channel = endpoint.connect(0, config).await.with_context(|| {
        format!(
            "Failed to open data channel to {}:{}",
            endpoint.host, endpoint.port
        )
    })?;
    Ok((session, channel))
}

/// Close the channel and leave the door whatever `outcome` was. The transfer
/// error wins over cleanup errors.
async fn finish(
    session: DoorSession,
    channel: DataChannel,
    outcome: Result<()>,
) -> Result<()> {
    let closed = channel.close().await.context("Failed to close data channel");
    let left = session.disconnect().await.context("Failed to leave door");
    outcome?;
    closed?;
    left
}

async fn cat(
    channel: &DataChannel,
    offset: u64,
    length: Option<u64>,
    block_size: usize,
) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut buf = vec![0u8; block_size];
    let mut position = offset;
    let end = length.map(|len| offset.saturating_add(len));

    loop {
        let want = match end {
            Some(end) if position >= end => break,
            Some(end) => block_size.min((end - position) as usize),
            None => block_size,
        };

        let n = channel
            .read(&mut buf[..want], position as i64)
            .await
            .with_context(|| format!("Read at offset {} failed", position))?;
        if n == 0 {
            break;
        }
        stdout.write_all(&buf[..n]).await?;
        position += n as u64;
    }

    stdout.flush().await?;
    tracing::info!(bytes = position - offset, "cat finished");
    Ok(())
}

async fn put(channel: &DataChannel, mut file: File, block_size: usize) -> Result<()> {
    let mut buf = vec![0u8; block_size];
    let mut position = 0u64;

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        channel
            .write(&buf[..n], position as i64)
            .await
            .with_context(|| format!("Write at offset {} failed", position))?;
        position += n as u64;
    }

    tracing::info!(bytes = position, "put finished");
    Ok(())
}
