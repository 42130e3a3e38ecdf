//! Data channel command encoding.
//!
//! Wire format: all multi-byte integers are big-endian.
//! Command frame: len:u32 | opcode:u32 | operands
//! `len` counts everything after itself.

use crate::error::{DcapError, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// SEEK_SET, the only whence value this client sends
pub const SEEK_SET: u32 = 0;

/// End-of-data sentinel terminating a chunk stream
pub const EOD: i32 = -1;

/// Size of the header preceding a chunk stream: len:u32 (=4) | DATA:u32
pub const DATA_HEADER_SIZE: usize = 8;

/// Largest length a 32-bit length field can carry; the peer reads them as i32
pub const MAX_FIELD_LEN: usize = i32::MAX as usize;

// =============================================================================
// Opcodes
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Opcode {
    Close = 4,
    Data = 8,
    SeekAndRead = 11,
    SeekAndWrite = 12,
}

/// Convert a buffer length to a wire length field.
///
/// Anything above [`MAX_FIELD_LEN`] would go out as a negative (or wrapped)
/// length, so it is rejected before a byte is sent.
pub fn field_len(len: usize) -> Result<u32> {
    i32::try_from(len)
        .map(|n| n as u32)
        .map_err(|_| {
            DcapError::Protocol(format!(
                "Length {} exceeds the {} byte frame limit",
                len, MAX_FIELD_LEN
            ))
        })
}

// =============================================================================
// Channel-binding handshake
// =============================================================================

/// First bytes on a fresh data connection: session:i32 | challenge_len:i32 | challenge.
/// Not a command frame; there is no outer length.
pub fn encode_handshake(session_id: u32, challenge: &[u8]) -> Result<Bytes> {
    let challenge_len = field_len(challenge.len())?;
    let mut buf = BytesMut::with_capacity(8 + challenge.len());
    buf.put_u32(session_id);
    buf.put_u32(challenge_len);
    buf.put_slice(challenge);
    Ok(buf.freeze())
}

// =============================================================================
// Commands
// =============================================================================

/// SEEK_AND_READ (11): offset:i64 | whence:u32 | length:i64
pub fn encode_seek_and_read(offset: i64, length: i64) -> Bytes {
    debug_assert!(offset >= 0 && length >= 0);
    let payload_len = 4 + 8 + 4 + 8;
    let mut buf = BytesMut::with_capacity(4 + payload_len);
    buf.put_u32(payload_len as u32);
    buf.put_u32(Opcode::SeekAndRead as u32);
    buf.put_i64(offset);
    buf.put_u32(SEEK_SET);
    buf.put_i64(length);
    buf.freeze()
}

/// SEEK_AND_WRITE (12): offset:i64 | whence:u32
///
/// Carries no length operand; the amount written is implied by the data
/// stream that follows.
pub fn encode_seek_and_write(offset: i64) -> Bytes {
    debug_assert!(offset >= 0);
    let payload_len = 4 + 8 + 4;
    let mut buf = BytesMut::with_capacity(4 + payload_len);
    buf.put_u32(payload_len as u32);
    buf.put_u32(Opcode::SeekAndWrite as u32);
    buf.put_i64(offset);
    buf.put_u32(SEEK_SET);
    buf.freeze()
}

/// CLOSE (4): no operands
pub fn encode_close() -> Bytes {
    let mut buf = BytesMut::with_capacity(8);
    buf.put_u32(4);
    buf.put_u32(Opcode::Close as u32);
    buf.freeze()
}

// =============================================================================
// Tests
// =============================================================================
