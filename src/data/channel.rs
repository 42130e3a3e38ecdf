//! Data channel: positioned reads and writes over one bound TCP connection.
//!
//! The protocol is strictly half-duplex request/response, so each public
//! call holds the channel lock for its whole exchange.

use crate::config::DcapConfig;
use crate::data::deadline::DeadlineStream;
use crate::data::frame::{decode_ack, decode_data_stream, write_data_stream, FrameSink};
use crate::data::protocol::{
    encode_close, encode_handshake, encode_seek_and_read, encode_seek_and_write, field_len,
};
use crate::error::{DcapError, Result};
use std::net::SocketAddr;
use tokio::net::ToSocketAddrs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// One data connection bound to a door session.
///
/// Any error from `read`, `write` or `close` tears the connection down, and so
/// does dropping one of those futures before it completes; every later call
/// fails with [`DcapError::ChannelClosed`]. Acks are not checked
/// for a server-side status, so a successful return only means the peer
/// completed the exchange.
#[derive(Debug)]
pub struct DataChannel {
    io: Mutex<Option<DeadlineStream>>,
    session_id: u32,
    size: i64,
    peer: SocketAddr,
    max_ack_size: u32,
}

impl DataChannel {
    /// Connect to `addr` and bind the connection to `session_id` with the
    /// one-time `challenge`. `advisory_size` is reported by [`size`](Self::size)
    /// and never re-queried.
    pub async fn connect<A: ToSocketAddrs>(
        addr: A,
        session_id: u32,
        challenge: &[u8],
        advisory_size: i64,
        config: &DcapConfig,
    ) -> Result<Self> {
        let handshake = encode_handshake(session_id, challenge)?;
        let mut io =
            DeadlineStream::connect(addr, config.connect_timeout(), config.io_timeout()).await?;
        let peer = io.peer_addr()?;

        io.arm(config.connect_timeout());
        io.write_full(&handshake)
            .await
            .map_err(|e| DcapError::Connection(format!("Handshake with {} failed: {}", peer, e)))?;

        debug!(%peer, session_id, "data channel bound");

        Ok(Self {
            io: Mutex::new(Some(io)),
            session_id,
            size: advisory_size,
            peer,
            max_ack_size: config.max_ack_size,
        })
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Size captured when the channel was opened.
    pub fn size(&self) -> i64 {
        self.size
    }

    /// Read up to `dst.len()` bytes starting at `position`.
    ///
    /// Returns the number of bytes placed at the front of `dst`; fewer than
    /// requested (possibly 0) when the remote file ends first.
    pub async fn read(&self, dst: &mut [u8], position: i64) -> Result<usize> {
        check_position(position)?;
        let mut guard = self.io.lock().await;
        let mut io = guard.take().ok_or(DcapError::ChannelClosed)?;

        // The stream only goes back into the slot once the exchange finished
        // cleanly. An error or a dropped future leaves the channel closed.
        match read_exchange(&mut io, dst, position, self.max_ack_size).await {
            Ok(n) => {
                *guard = Some(io);
                Ok(n)
            }
            Err(e) => Err(self.tear_down("read", e)),
        }
    }

    /// Write all of `src` starting at `position`. Returns `src.len()`.
    ///
    /// `src` must fit one chunk (at most
    /// [`MAX_FIELD_LEN`](crate::data::protocol::MAX_FIELD_LEN) bytes); a longer
    /// buffer is rejected before anything is sent and the channel stays open.
    pub async fn write(&self, src: &[u8], position: i64) -> Result<usize> {
        check_position(position)?;
        field_len(src.len())?;
        let mut guard = self.io.lock().await;
        let mut io = guard.take().ok_or(DcapError::ChannelClosed)?;

        match write_exchange(&mut io, src, position, self.max_ack_size).await {
            Ok(n) => {
                *guard = Some(io);
                Ok(n)
            }
            Err(e) => Err(self.tear_down("write", e)),
        }
    }

    /// Send CLOSE, await its ack and release the socket.
    ///
    /// Idempotent: closing an already closed (or torn down) channel is a no-op.
    pub async fn close(&self) -> Result<()> {
        let mut guard = self.io.lock().await;
        let Some(mut io) = guard.take() else {
            return Ok(());
        };

        io.begin_write();
        io.write_full(&encode_close()).await?;
        decode_ack(&mut io, self.max_ack_size).await?;
        debug!(peer = %self.peer, session_id = self.session_id, "data channel closed");

        io.shutdown().await
    }

    pub async fn is_closed(&self) -> bool {
        self.io.lock().await.is_none()
    }

    fn tear_down(&self, op: &str, err: DcapError) -> DcapError {
        warn!(
            peer = %self.peer,
            session_id = self.session_id,
            "{} failed, dropping data channel: {}",
            op,
            err
        );
        err
    }
}

fn check_position(position: i64) -> Result<()> {
    if position < 0 {
        return Err(DcapError::Protocol(format!(
            "Negative file position: {}",
            position
        )));
    }
    Ok(())
}

async fn read_exchange(
    io: &mut DeadlineStream,
    dst: &mut [u8],
    position: i64,
    max_ack_size: u32,
) -> Result<usize> {
    io.begin_write();
    io.write_full(&encode_seek_and_read(position, dst.len() as i64))
        .await?;
    decode_ack(io, max_ack_size).await?;

    let read = decode_data_stream(io, dst, max_ack_size).await?;
    debug!(position, requested = dst.len(), read = read.bytes, "seek-and-read done");
    Ok(read.bytes)
}

async fn write_exchange(
    io: &mut DeadlineStream,
    src: &[u8],
    position: i64,
    max_ack_size: u32,
) -> Result<usize> {
    io.begin_write();
    io.write_full(&encode_seek_and_write(position)).await?;
    decode_ack(io, max_ack_size).await?;

    write_data_stream(io, src).await?;
    decode_ack(io, max_ack_size).await?;
    debug!(position, written = src.len(), "seek-and-write done");
    Ok(src.len())
}
