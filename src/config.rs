//! Tunables for the sync engine.
//!
//! All fields have defaults matching what adbd expects, so an empty TOML
//! document is a valid configuration.

use crate::error::{AdbError, Result};
use crate::sync::protocol::{MAX_CHUNK_SIZE, MAX_FRAME_SIZE};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Bytes per DATA frame when pushing (1..=64 KiB)
    pub chunk_size: usize,

    /// Largest length-prefixed frame accepted from the device
    pub max_frame_size: u32,

    /// Issue STAT before RECV so pull progress carries a total
    pub stat_before_pull: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            chunk_size: MAX_CHUNK_SIZE,
            max_frame_size: MAX_FRAME_SIZE,
            stat_before_pull: true,
        }
    }
}

impl SyncConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: SyncConfig =
            toml::from_str(s).map_err(|e| AdbError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(AdbError::Config(format!(
                "chunk_size must be between 1 and {}, got {}",
                MAX_CHUNK_SIZE, self.chunk_size
            )));
        }
        // DATA frames from adbd are at most one chunk; anything smaller would
        // reject well-formed pulls.
        if (self.max_frame_size as usize) < MAX_CHUNK_SIZE {
            return Err(AdbError::Config(format!(
                "max_frame_size must be at least {}, got {}",
                MAX_CHUNK_SIZE, self.max_frame_size
            )));
        }
        Ok(())
    }
}
