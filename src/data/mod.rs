//! Data channel engine for the dcap protocol.
//!
//! A door session negotiates `(host, port, session, challenge)`; this module
//! opens the data connection, binds it to the session and runs positioned
//! reads and writes over it.
//!
//! # Architecture
//!
//! ```text
//! caller --> DataChannel --> protocol (command bytes) --> DeadlineStream (send)
//!                                                              |
//! caller <-- frame (ack / chunk stream) <-- DeadlineStream (receive) <-- peer
//! ```
//!
//! # Wire format
//!
//! Big-endian throughout, every boundary explicit-length:
//! - Handshake: `session:i32 | challenge_len:i32 | challenge`
//! - Command: `len:i32 | opcode:i32 | operands`
//! - Ack: `len:i32 | payload`
//! - Data stream: `4:i32 | DATA:i32 | { len:i32 | bytes }* | -1:i32`

pub mod channel;
pub mod deadline;
pub mod frame;
pub mod protocol;

pub use channel::DataChannel;
pub use deadline::{perform_bounded, BoundedOp, Deadline, DeadlineStream};
pub use frame::{
    decode_ack, decode_data_stream, encode_data_stream, write_data_stream, Ack, FrameSink,
    FrameSource, StreamRead,
};
pub use protocol::{
    encode_close, encode_handshake, encode_seek_and_read, encode_seek_and_write, field_len,
    Opcode, DATA_HEADER_SIZE, EOD, MAX_FIELD_LEN, SEEK_SET,
};
