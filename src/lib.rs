//! dcap - client for the dCache dcap data protocol.
//!
//! A [`DoorSession`] negotiates access to a remote file over the ASCII control
//! connection; the [`DataEndpoint`] it returns opens a [`DataChannel`] that
//! performs positioned reads and writes over a binary, big-endian data
//! connection with deadline-bounded I/O.
//!
//! ```no_run
//! # async fn demo() -> dcap::Result<()> {
//! use dcap::{DcapConfig, DoorSession};
//!
//! let config = DcapConfig::default();
//! let mut door = DoorSession::connect("door.example.org:22125", &config).await?;
//! let channel = door.open("/exports/data/p34", "r").await?.connect(0, &config).await?;
//!
//! let mut buf = vec![0u8; 8192];
//! let n = channel.read(&mut buf, 0).await?;
//! println!("{}", String::from_utf8_lossy(&buf[..n]));
//!
//! channel.close().await?;
//! door.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod data;
pub mod door;
pub mod error;
pub mod logging;

pub use config::DcapConfig;
pub use data::{Ack, DataChannel};
pub use door::{DataEndpoint, DoorSession};
pub use error::{DcapError, ErrorKind, Result};
