//! In-memory SQLite access to databases stored in engram archives
//!
//! A database entry is decompressed once into a private buffer and served
//! to SQLite through a per-handle VFS. Nothing is extracted to disk, and
//! writes made through the handle are discarded when it is dropped.

mod database;
mod sqlite;
mod store;

pub use database::{json_params, Database, Row};
pub use store::{BackingStore, LockLevel, MemoryFile};

use crate::archive::ArchiveReader;
use crate::error::Result;
use tracing::debug;

impl ArchiveReader {
    /// Open a database entry for SQL queries
    ///
    /// Fails with `NotFound` if the entry is absent and with `Corrupt` if it
    /// does not pass its integrity check. The entry does not have to carry a
    /// database extension.
    pub fn open_database(&mut self, path: &str) -> Result<Database> {
        let image = self.read_file(path)?;
        debug!("Loaded database image {} ({} bytes)", path, image.len());
        Database::from_bytes(path, image)
    }
}
