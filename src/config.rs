//! Client configuration.
//!
//! Loaded from a TOML file; every field is optional.
//!
//! ```toml
//! io_timeout_ms = 4000
//! connect_timeout_ms = 4000
//! door_timeout_ms = 10000
//! max_ack_size = 65536
//! ```

use crate::error::{DcapError, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Default bound on one logical data channel operation (4s)
pub const DEFAULT_IO_TIMEOUT_MS: u64 = 4_000;

/// Default bound on connect + handshake (4s)
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 4_000;

/// Default bound on one door request/reply (10s)
pub const DEFAULT_DOOR_TIMEOUT_MS: u64 = 10_000;

/// Largest ack payload accepted (64KB) - prevents OOM from corrupted frames
pub const DEFAULT_MAX_ACK_SIZE: u32 = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DcapConfig {
    pub io_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub door_timeout_ms: u64,
    pub max_ack_size: u32,
}

impl Default for DcapConfig {
    fn default() -> Self {
        Self {
            io_timeout_ms: DEFAULT_IO_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            door_timeout_ms: DEFAULT_DOOR_TIMEOUT_MS,
            max_ack_size: DEFAULT_MAX_ACK_SIZE,
        }
    }
}

impl DcapConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| DcapError::Config(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            DcapError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<()> {
        if self.io_timeout_ms == 0 || self.connect_timeout_ms == 0 || self.door_timeout_ms == 0 {
            return Err(DcapError::Config("Timeouts must be non-zero".to_string()));
        }
        Ok(())
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn door_timeout(&self) -> Duration {
        Duration::from_millis(self.door_timeout_ms)
    }
}
