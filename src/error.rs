//! Error types for the dcap client.

use std::time::Duration;
use thiserror::Error;

/// Main error type for data channel and door operations.
///
/// Every error raised by a [`DataChannel`](crate::DataChannel) call is fatal
/// to that channel: the socket is released and later calls fail with
/// [`DcapError::ChannelClosed`].
#[derive(Debug, Error)]
pub enum DcapError {
    /// Connect or handshake failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Peer closed the socket before a frame was complete.
    #[error("Connection closed by peer")]
    PeerClosed,

    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A bounded operation did not finish before its deadline.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Frame inconsistent with the protocol (bad length, oversized chunk, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The channel was closed, or torn down after an earlier error.
    #[error("Channel is closed")]
    ChannelClosed,

    /// Door (control session) rejected or garbled a request.
    #[error("Control error: {0}")]
    Control(String),

    /// Configuration could not be loaded.
    #[error("Config error: {0}")]
    Config(String),
}

/// Coarse error category, for callers that only need to branch on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    Timeout,
    Protocol,
    Control,
    Config,
}

impl DcapError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DcapError::Connection(_)
            | DcapError::PeerClosed
            | DcapError::Io(_)
            | DcapError::ChannelClosed => ErrorKind::Connection,
            DcapError::Timeout(_) => ErrorKind::Timeout,
            DcapError::Protocol(_) => ErrorKind::Protocol,
            DcapError::Control(_) => ErrorKind::Control,
            DcapError::Config(_) => ErrorKind::Config,
        }
    }
}

/// Result type alias using DcapError.
pub type Result<T> = std::result::Result<T, DcapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(DcapError::PeerClosed.kind(), ErrorKind::Connection);
        assert_eq!(DcapError::ChannelClosed.kind(), ErrorKind::Connection);
        assert_eq!(
            DcapError::Io(std::io::Error::other("boom")).kind(),
            ErrorKind::Connection
        );
        assert_eq!(
            DcapError::Timeout(Duration::from_secs(4)).kind(),
            ErrorKind::Timeout
        );
        assert_eq!(
            DcapError::Protocol("bad".into()).kind(),
            ErrorKind::Protocol
        );
    }

    #[test]
    fn test_error_display() {
        let err = DcapError::Protocol("chunk of 10 bytes exceeds 4 remaining".into());
        assert_eq!(
            err.to_string(),
            "Protocol error: chunk of 10 bytes exceeds 4 remaining"
        );
        assert_eq!(DcapError::ChannelClosed.to_string(), "Channel is closed");
    }
}
