use std::io;
use thiserror::Error;

/// Result type for engram operations
pub type Result<T> = std::result::Result<T, EngramError>;

/// Unified error type for all engram operations
#[derive(Debug, Error)]
pub enum EngramError {
    // Archive errors
    #[error("Invalid archive format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported archive version: {0}")]
    UnsupportedVersion(u16),

    #[error("File not found in archive: {0}")]
    NotFound(String),

    #[error("Corrupt entry {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("Unsupported compression method: {0}")]
    Unsupported(u8),

    #[error("Entry is not valid UTF-8 text: {0}")]
    InvalidUtf8(String),

    // Writer errors
    #[error("Duplicate path in archive: {0}")]
    DuplicatePath(String),

    #[error("Archive writer already finalized")]
    WriterFinalized,

    #[error("Invalid entry path: {0}")]
    InvalidPath(String),

    // Database bridge errors
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("VFS error: {0}")]
    Vfs(String),

    // Manifest errors
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngramError {
    pub(crate) fn corrupt(path: &str, reason: impl Into<String>) -> Self {
        EngramError::Corrupt {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<toml::de::Error> for EngramError {
    fn from(err: toml::de::Error) -> Self {
        EngramError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for EngramError {
    fn from(err: toml::ser::Error) -> Self {
        EngramError::Config(err.to_string())
    }
}
