//! Tokio facade over [`ArchiveReader`]
//!
//! Reads run on the blocking pool. Each task opens its own file handle and
//! shares the parsed index, so batch reads proceed in parallel.

use crate::archive::format::DirectoryEntry;
use crate::archive::reader::{ArchiveReader, SharedArchive};
use crate::error::{EngramError, Result};
use crate::vfs::Database;
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;
use tracing::debug;

/// Async archive reader
pub struct AsyncArchiveReader {
    reader: ArchiveReader,
    shared: SharedArchive,
}

impl AsyncArchiveReader {
    /// Open an archive without blocking the runtime
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let reader = join(tokio::task::spawn_blocking(move || ArchiveReader::open(path))).await?;
        Ok(Self::from_reader(reader))
    }

    /// Wrap an already opened reader
    pub fn from_reader(reader: ArchiveReader) -> Self {
        let shared = reader.shared();
        Self { reader, shared }
    }

    /// Synchronous view for metadata and blocking reads
    pub fn reader(&mut self) -> &mut ArchiveReader {
        &mut self.reader
    }

    pub fn into_inner(self) -> ArchiveReader {
        self.reader
    }

    pub fn entry_count(&self) -> usize {
        self.reader.entry_count()
    }

    pub fn list_files(&self) -> Vec<&str> {
        self.reader.list_files()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.reader.contains(path)
    }

    pub fn get_metadata(&self, path: &str) -> Option<&DirectoryEntry> {
        self.reader.get_metadata(path)
    }

    pub fn list_prefix(&self, prefix: &str) -> Vec<&str> {
        self.reader.list_prefix(prefix)
    }

    /// Read a file on the calling thread
    pub fn read_file_sync(&mut self, path: &str) -> Result<Vec<u8>> {
        self.reader.read_file(path)
    }

    /// Read a file on the blocking pool
    pub async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        join(self.spawn_read(path)).await
    }

    /// Read several files concurrently
    ///
    /// Results follow input order. The first failure in input order fails
    /// the whole batch; reads already on the blocking pool are not cancelled
    /// and run to completion with their results discarded.
    pub async fn read_files<S: AsRef<str>>(&self, paths: &[S]) -> Result<Vec<Vec<u8>>> {
        debug!("Reading {} files concurrently", paths.len());
        let tasks: Vec<_> = paths.iter().map(|p| self.spawn_read(p.as_ref())).collect();

        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            results.push(join(task).await?);
        }
        Ok(results)
    }

    /// Read the raw manifest blob, or `None` if absent
    pub async fn read_manifest(&self) -> Result<Option<Vec<u8>>> {
        let shared = self.shared.clone();
        join(tokio::task::spawn_blocking(move || {
            shared.open_handle()?.read_manifest()
        }))
        .await
    }

    /// Open a database entry on the blocking pool
    pub async fn open_database(&self, path: &str) -> Result<Database> {
        let shared = self.shared.clone();
        let path = path.to_string();
        join(tokio::task::spawn_blocking(move || {
            shared.open_handle()?.open_database(&path)
        }))
        .await
    }

    fn spawn_read(&self, path: &str) -> JoinHandle<Result<Vec<u8>>> {
        let shared = self.shared.clone();
        let path = path.to_string();
        tokio::task::spawn_blocking(move || shared.open_handle()?.read_file(&path))
    }
}

async fn join<T>(task: JoinHandle<Result<T>>) -> Result<T> {
    task.await
        .map_err(|e| EngramError::Internal(format!("blocking task failed: {}", e)))?
}
