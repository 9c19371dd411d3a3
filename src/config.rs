//! Writer configuration
//!
//! Tunables for compression selection and streamed ingestion. Defaults match
//! the archive format's recommended settings; a TOML file can override any
//! subset of them:
//!
//! ```toml
//! min_compression_size = 8192
//! zstd_level = 9
//! ```

use crate::error::{EngramError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Files smaller than this are stored uncompressed (4KB)
pub const DEFAULT_MIN_COMPRESSION_SIZE: usize = 4096;

/// Zstd level used for text and database payloads
pub const DEFAULT_ZSTD_LEVEL: i32 = 6;

/// Chunk size for streamed disk reads (64KB)
pub const DEFAULT_STREAM_BUFFER_SIZE: usize = 64 * 1024;

/// Archive writer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Minimum size for automatic compression (bytes)
    pub min_compression_size: usize,

    /// Zstd compression level (1-22)
    pub zstd_level: i32,

    /// Read chunk size for `add_file_from_disk`
    pub stream_buffer_size: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            min_compression_size: DEFAULT_MIN_COMPRESSION_SIZE,
            zstd_level: DEFAULT_ZSTD_LEVEL,
            stream_buffer_size: DEFAULT_STREAM_BUFFER_SIZE,
        }
    }
}

impl ArchiveConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        let levels = zstd::compression_level_range();
        if !levels.contains(&self.zstd_level) {
            return Err(EngramError::Config(format!(
                "zstd_level {} outside supported range {}..={}",
                self.zstd_level,
                levels.start(),
                levels.end()
            )));
        }
        if self.stream_buffer_size == 0 {
            return Err(EngramError::Config(
                "stream_buffer_size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
