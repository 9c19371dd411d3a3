//! engram-archive: single-file archives with integrity checks and SQL access
//!
//! An engram archive packs many named files into one container:
//! - Per-entry compression (None, LZ4 or Zstd), chosen automatically by size
//!   and file type unless the caller picks one
//! - CRC-32 verification of every read
//! - O(1) lookup through a trailing table of contents
//! - SQL queries against embedded SQLite databases, served from memory
//!   through a per-handle VFS with no extraction to disk
//!
//! # Example
//!
//! ```no_run
//! use engram_archive::{ArchiveReader, ArchiveWriter};
//!
//! // Create an archive
//! let mut writer = ArchiveWriter::create("example.eng")?;
//! writer.add_file("data.txt", b"Hello, World!")?;
//! writer.finalize()?;
//!
//! // Read from archive
//! let mut reader = ArchiveReader::open("example.eng")?;
//! let data = reader.read_file("data.txt")?;
//! # Ok::<(), engram_archive::EngramError>(())
//! ```

pub mod archive;
pub mod config;
pub mod error;
pub mod manifest;
pub mod vfs;

pub use archive::{
    ArchiveReader, ArchiveWriter, CompressionMethod, DirectoryEntry, DIRECTORY_ENTRY_SIZE,
    FOOTER_SIZE, FORMAT_VERSION, HEADER_SIZE, MAGIC, MANIFEST_PATH, MAX_PATH_LENGTH,
};
#[cfg(feature = "async")]
pub use archive::AsyncArchiveReader;
pub use config::ArchiveConfig;
pub use error::{EngramError, Result};
pub use manifest::Manifest;
pub use vfs::{json_params, Database, LockLevel, Row};
