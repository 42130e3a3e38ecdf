//! Ack and data-stream framing.
//!
//! Ack frame: len:i32 | payload
//! Data stream: header(8) | { chunk_len:i32 | chunk }* | EOD(-1) | ack
//!
//! The codec is written against [`FrameSource`] and [`FrameSink`] so the same
//! code runs over a deadline-bounded socket or an in-memory buffer.

use crate::data::protocol::{field_len, Opcode, DATA_HEADER_SIZE, EOD};
use crate::error::{DcapError, Result};
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};

// =============================================================================
// Source / sink seams
// =============================================================================

#[async_trait]
pub trait FrameSource: Send {
    /// Fill `buf` completely. Fails with [`DcapError::PeerClosed`] if the
    /// peer goes away first.
    async fn read_full(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Marks the start of one bounded logical operation. Sources with a
    /// deadline re-arm it here; the rest ignore it.
    fn begin_read(&mut self) {}
}

#[async_trait]
pub trait FrameSink: Send {
    /// Write all of `buf`.
    async fn write_full(&mut self, buf: &[u8]) -> Result<()>;

    fn begin_write(&mut self) {}
}

#[async_trait]
impl<'a> FrameSource for &'a [u8] {
    async fn read_full(&mut self, buf: &mut [u8]) -> Result<()> {
        let data: &'a [u8] = *self;
        if data.len() < buf.len() {
            *self = &data[data.len()..];
            return Err(DcapError::PeerClosed);
        }
        let (head, tail) = data.split_at(buf.len());
        buf.copy_from_slice(head);
        *self = tail;
        Ok(())
    }
}

#[async_trait]
impl FrameSink for Vec<u8> {
    async fn write_full(&mut self, buf: &[u8]) -> Result<()> {
        self.extend_from_slice(buf);
        Ok(())
    }
}

async fn read_i32<S: FrameSource + ?Sized>(src: &mut S) -> Result<i32> {
    let mut word = [0u8; 4];
    src.read_full(&mut word).await?;
    Ok(i32::from_be_bytes(word))
}

// =============================================================================
// Ack
// =============================================================================

/// Acknowledgement frame received after every command and data stream.
///
/// The payload is kept opaque: it is neither parsed for a status code nor
/// checked for an error result. Receiving an `Ack` only means the peer
/// answered; it does not mean the operation succeeded on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub payload: Bytes,
}

/// Read one ack frame. A length that is negative or above `max_size`, or a
/// peer close inside the frame, is a protocol error.
pub async fn decode_ack<S: FrameSource + ?Sized>(src: &mut S, max_size: u32) -> Result<Ack> {
    src.begin_read();

    let len = read_i32(src).await.map_err(truncated_ack)?;
    if len < 0 || len as u32 > max_size {
        return Err(DcapError::Protocol(format!(
            "Ack length {} outside 0..={}",
            len, max_size
        )));
    }

    let mut payload = vec![0u8; len as usize];
    src.read_full(&mut payload).await.map_err(truncated_ack)?;
    tracing::trace!(len, "ack received");

    Ok(Ack {
        payload: Bytes::from(payload),
    })
}

fn truncated_ack(err: DcapError) -> DcapError {
    match err {
        DcapError::PeerClosed => DcapError::Protocol("Peer closed inside ack frame".to_string()),
        other => other,
    }
}

// =============================================================================
// Data stream (read path)
// =============================================================================

/// Result of draining one data stream into a caller buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRead {
    /// Bytes written at the front of the destination
    pub bytes: usize,
    /// Ack that followed the EOD sentinel
    pub ack: Ack,
}

/// Drain a chunked data stream into `dst`, then consume the trailing ack.
///
/// Each chunk is read straight into `dst` at the write cursor. A chunk larger
/// than the space left is rejected before any of its bytes are read. The
/// stream may end early via EOD; `bytes` then stays below `dst.len()`.
pub async fn decode_data_stream<S: FrameSource + ?Sized>(
    src: &mut S,
    dst: &mut [u8],
    max_ack_size: u32,
) -> Result<StreamRead> {
    src.begin_read();
    let mut header = [0u8; DATA_HEADER_SIZE];
    src.read_full(&mut header).await?;

    let mut cursor = 0usize;
    loop {
        src.begin_read();
        let len = read_i32(src).await?;
        if len < 0 {
            if len != EOD {
                return Err(DcapError::Protocol(format!(
                    "Malformed end-of-data sentinel: {}",
                    len
                )));
            }
            break;
        }

        let len = len as usize;
        let remaining = dst.len() - cursor;
        if len > remaining {
            return Err(DcapError::Protocol(format!(
                "Chunk of {} bytes exceeds {} bytes remaining in buffer",
                len, remaining
            )));
        }

        src.read_full(&mut dst[cursor..cursor + len]).await?;
        cursor += len;
        tracing::trace!(chunk = len, total = cursor, "data chunk received");
    }

    let ack = decode_ack(src, max_ack_size).await?;
    Ok(StreamRead { bytes: cursor, ack })
}

// =============================================================================
// Data stream (write path)
// =============================================================================

/// Frames for sending `src` as one chunk: `{4, DATA, len} payload`, then `{EOD}`.
///
/// Fails with a protocol error if `src` does not fit a single chunk.
pub fn encode_data_stream(src: &[u8]) -> Result<impl Iterator<Item = Bytes>> {
    let len = field_len(src.len())?;
    let mut chunk = BytesMut::with_capacity(DATA_HEADER_SIZE + 4 + src.len());
    chunk.put_u32(4);
    chunk.put_u32(Opcode::Data as u32);
    chunk.put_u32(len);
    chunk.put_slice(src);

    let mut end = BytesMut::with_capacity(4);
    end.put_i32(EOD);

    Ok([chunk.freeze(), end.freeze()].into_iter())
}

/// Send `src` as a data stream, one bounded operation per frame.
pub async fn write_data_stream<S: FrameSink + ?Sized>(sink: &mut S, src: &[u8]) -> Result<()> {
    for frame in encode_data_stream(src)? {
        sink.begin_write();
        sink.write_full(&frame).await?;
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
