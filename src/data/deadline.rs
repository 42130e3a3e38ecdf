//! Deadline-bounded socket I/O.
//!
//! Every logical operation (send a command, receive an ack, move one chunk)
//! gets one absolute deadline. Inside it the socket is driven by readiness:
//! wait for readable/writable with the time left, try one non-blocking
//! read/write, repeat until the buffer is done or the deadline passes.

use crate::data::frame::{FrameSink, FrameSource};
use crate::error::{DcapError, Result};
use async_trait::async_trait;
use std::io::ErrorKind as IoErrorKind;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, Interest};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::time::{timeout, timeout_at, Instant};

/// Absolute deadline for one logical operation.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    pub fn instant(&self) -> Instant {
        self.at
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    fn timeout_error(&self) -> DcapError {
        DcapError::Timeout(self.budget)
    }
}

/// One bounded operation and the buffer it drains or fills.
#[derive(Debug)]
pub enum BoundedOp<'a> {
    Read(&'a mut [u8]),
    Write(&'a [u8]),
}

impl BoundedOp<'_> {
    fn interest(&self) -> Interest {
        match self {
            BoundedOp::Read(_) => Interest::READABLE,
            BoundedOp::Write(_) => Interest::WRITABLE,
        }
    }

    fn len(&self) -> usize {
        match self {
            BoundedOp::Read(buf) => buf.len(),
            BoundedOp::Write(buf) => buf.len(),
        }
    }
}

/// Run `op` to completion against `stream`, or fail once `deadline` passes.
///
/// Fails with [`DcapError::Timeout`] when the buffer is not done in time and
/// [`DcapError::PeerClosed`] when the peer closes mid-operation.
pub async fn perform_bounded(
    stream: &TcpStream,
    mut op: BoundedOp<'_>,
    deadline: Deadline,
) -> Result<()> {
    let total = op.len();
    let mut done = 0usize;

    while done < total {
        if deadline.is_expired() {
            return Err(deadline.timeout_error());
        }

        match timeout_at(deadline.instant(), stream.ready(op.interest())).await {
            Ok(ready) => ready?,
            Err(_) => return Err(deadline.timeout_error()),
        };

        let result = match &mut op {
            BoundedOp::Read(buf) => stream.try_read(&mut buf[done..]),
            BoundedOp::Write(buf) => stream.try_write(&buf[done..]),
        };

        match result {
            Ok(0) => return Err(DcapError::PeerClosed),
            Ok(n) => {
                done += n;
                tracing::trace!(n, done, total, "partial i/o");
            }
            Err(e) if e.kind() == IoErrorKind::WouldBlock => continue,
            Err(e) if is_disconnect(&e) => return Err(DcapError::PeerClosed),
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

fn is_disconnect(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        IoErrorKind::ConnectionReset | IoErrorKind::BrokenPipe | IoErrorKind::ConnectionAborted
    )
}

// =============================================================================
// DeadlineStream
// =============================================================================

/// A TCP stream whose reads and writes are bounded by a per-operation deadline.
///
/// The deadline is re-armed by `begin_read`/`begin_write`; every `read_full` and
/// `write_full` until the next re-arm shares it.
#[derive(Debug)]
pub struct DeadlineStream {
    stream: TcpStream,
    io_timeout: Duration,
    deadline: Deadline,
}

impl DeadlineStream {
    /// Connect within `connect_timeout`.
    pub async fn connect<A: ToSocketAddrs>(
        addr: A,
        connect_timeout: Duration,
        io_timeout: Duration,
    ) -> Result<Self> {
        let stream = match timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(DcapError::Connection(format!("Connect failed: {}", e))),
            Err(_) => {
                return Err(DcapError::Connection(format!(
                    "Connect timed out after {:?}",
                    connect_timeout
                )))
            }
        };
        stream.set_nodelay(true)?;
        Ok(Self::new(stream, io_timeout))
    }

    pub fn new(stream: TcpStream, io_timeout: Duration) -> Self {
        Self {
            stream,
            io_timeout,
            deadline: Deadline::after(io_timeout),
        }
    }

    /// Arm a deadline with an explicit budget (used for the handshake).
    pub fn arm(&mut self, budget: Duration) {
        self.deadline = Deadline::after(budget);
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    /// Half-close the write side, then drop the socket.
    pub async fn shutdown(mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

#[async_trait]
impl FrameSource for DeadlineStream {
    async fn read_full(&mut self, buf: &mut [u8]) -> Result<()> {
        perform_bounded(&self.stream, BoundedOp::Read(buf), self.deadline).await
    }

    fn begin_read(&mut self) {
        self.deadline = Deadline::after(self.io_timeout);
    }
}

#[async_trait]
impl FrameSink for DeadlineStream {
    async fn write_full(&mut self, buf: &[u8]) -> Result<()> {
        perform_bounded(&self.stream, BoundedOp::Write(buf), self.deadline).await
    }

    fn begin_write(&mut self) {
        self.deadline = Deadline::after(self.io_timeout);
    }
}
