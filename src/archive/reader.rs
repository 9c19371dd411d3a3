use crate::archive::compression::decompress;
use crate::archive::format::{
    normalize_path, ArchiveHeader, DirectoryEntry, Footer, DIRECTORY_ENTRY_SIZE, FOOTER_SIZE,
    HEADER_SIZE, MANIFEST_PATH,
};
use crate::error::{EngramError, Result};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Parsed table of contents, shared between handles on the same archive
#[derive(Debug)]
struct ArchiveIndex {
    version: u16,
    entries: Vec<DirectoryEntry>,
    lookup: HashMap<String, usize>,
}

impl ArchiveIndex {
    /// Read footer, header and TOC; data blocks are never touched
    fn load(file: &mut File) -> Result<Self> {
        let file_len = file.metadata()?.len();
        if file_len < (HEADER_SIZE + FOOTER_SIZE) as u64 {
            return Err(EngramError::InvalidFormat(format!(
                "File too small for an archive: {} bytes",
                file_len
            )));
        }

        // Footer first: it locates everything else
        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let footer = Footer::read_from(&mut *file)?;

        file.seek(SeekFrom::Start(0))?;
        let header = ArchiveHeader::read_from(&mut *file)?;
        header.validate_version()?;

        let toc_end = file_len - FOOTER_SIZE as u64;
        if footer.toc_offset < HEADER_SIZE as u64
            || footer.toc_offset.checked_add(footer.toc_size()) != Some(toc_end)
        {
            return Err(EngramError::InvalidFormat(format!(
                "Footer does not match file layout: TOC at {} with {} entries, file is {} bytes",
                footer.toc_offset, footer.entry_count, file_len
            )));
        }

        // Bounded by the file length checked above
        let mut toc = vec![0u8; footer.toc_size() as usize];
        file.seek(SeekFrom::Start(footer.toc_offset))?;
        file.read_exact(&mut toc)?;

        let mut entries = Vec::with_capacity(footer.entry_count as usize);
        let mut lookup = HashMap::with_capacity(footer.entry_count as usize);

        for record in toc.chunks_exact(DIRECTORY_ENTRY_SIZE) {
            let entry = DirectoryEntry::read_from(record)?;

            let in_data_region = entry.offset >= HEADER_SIZE as u64
                && entry.end_offset().map_or(false, |end| end <= footer.toc_offset);
            if !in_data_region {
                return Err(EngramError::InvalidFormat(format!(
                    "Entry {} points outside the data region ({} + {})",
                    entry.path, entry.offset, entry.compressed_size
                )));
            }

            if lookup.insert(entry.path.clone(), entries.len()).is_some() {
                return Err(EngramError::InvalidFormat(format!(
                    "Duplicate entry path in TOC: {}",
                    entry.path
                )));
            }
            entries.push(entry);
        }

        check_no_overlap(&entries)?;

        Ok(Self {
            version: header.version,
            entries,
            lookup,
        })
    }

    fn get(&self, path: &str) -> Option<&DirectoryEntry> {
        self.lookup
            .get(path)
            .or_else(|| self.lookup.get(&normalize_path(path)))
            .map(|&i| &self.entries[i])
    }
}

fn check_no_overlap(entries: &[DirectoryEntry]) -> Result<()> {
    let mut ranges: Vec<(u64, u64)> = entries
        .iter()
        .filter(|e| e.compressed_size > 0)
        .map(|e| (e.offset, e.offset + e.compressed_size))
        .collect();
    ranges.sort_unstable();

    for pair in ranges.windows(2) {
        if pair[1].0 < pair[0].1 {
            return Err(EngramError::InvalidFormat(format!(
                "Overlapping entries at offsets {} and {}",
                pair[0].0, pair[1].0
            )));
        }
    }
    Ok(())
}

/// Owned, `Send` recipe for opening more handles on one archive
#[derive(Debug, Clone)]
pub(crate) struct SharedArchive {
    path: PathBuf,
    index: Arc<ArchiveIndex>,
}

impl SharedArchive {
    pub(crate) fn open_handle(&self) -> Result<ArchiveReader> {
        Ok(ArchiveReader {
            file: File::open(&self.path)?,
            path: self.path.clone(),
            index: Arc::clone(&self.index),
        })
    }
}

/// Archive reader with O(1) file lookup
///
/// Opening parses only the footer, header and table of contents. Every read
/// returns a freshly allocated buffer.
pub struct ArchiveReader {
    file: File,
    path: PathBuf,
    index: Arc<ArchiveIndex>,
}

impl ArchiveReader {
    /// Open an archive file for reading
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let index = ArchiveIndex::load(&mut file)?;

        info!(
            "Opened archive {:?}: version {}, {} entries",
            path,
            index.version,
            index.entries.len()
        );

        Ok(Self {
            file,
            path,
            index: Arc::new(index),
        })
    }

    /// Open an independent handle on the same archive
    ///
    /// The new handle has its own file cursor and shares the parsed index,
    /// so both can read concurrently.
    pub fn try_clone(&self) -> Result<Self> {
        self.shared().open_handle()
    }

    pub(crate) fn shared(&self) -> SharedArchive {
        SharedArchive {
            path: self.path.clone(),
            index: Arc::clone(&self.index),
        }
    }

    /// Location of the archive on disk
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Format version recorded in the header
    pub fn format_version(&self) -> u16 {
        self.index.version
    }

    /// Get number of entries in archive
    pub fn entry_count(&self) -> usize {
        self.index.entries.len()
    }

    /// List all file paths in insertion order
    pub fn list_files(&self) -> Vec<&str> {
        self.index.entries.iter().map(|e| e.path.as_str()).collect()
    }

    /// Iterate over every directory entry in insertion order
    pub fn entries(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.index.entries.iter()
    }

    /// Check if a file exists in the archive
    pub fn contains(&self, path: &str) -> bool {
        self.index.get(path).is_some()
    }

    /// Get entry metadata without reading data
    pub fn get_metadata(&self, path: &str) -> Option<&DirectoryEntry> {
        self.index.get(path)
    }

    /// List paths starting with `prefix` (linear scan, insertion order)
    pub fn list_prefix(&self, prefix: &str) -> Vec<&str> {
        self.index
            .entries
            .iter()
            .map(|e| e.path.as_str())
            .filter(|path| path.starts_with(prefix))
            .collect()
    }

    /// List entries that look like SQLite databases
    pub fn list_databases(&self) -> Vec<&str> {
        self.index
            .entries
            .iter()
            .map(|e| e.path.as_str())
            .filter(|path| {
                path.ends_with(".db") || path.ends_with(".sqlite") || path.ends_with(".sqlite3")
            })
            .collect()
    }

    /// Read a file from the archive
    ///
    /// Decompresses the payload and verifies its CRC-32 before returning it.
    pub fn read_file(&mut self, path: &str) -> Result<Vec<u8>> {
        let index = Arc::clone(&self.index);
        let entry = index
            .get(path)
            .ok_or_else(|| EngramError::NotFound(path.to_string()))?;

        let method = entry.compression()?;
        if !method.is_supported() {
            return Err(EngramError::Unsupported(method.as_u8()));
        }

        // Entry ranges were checked against the file layout at open
        self.file.seek(SeekFrom::Start(entry.offset))?;
        let mut raw = vec![0u8; entry.compressed_size as usize];
        self.file.read_exact(&mut raw)?;

        let data = decompress(&entry.path, &raw, method, entry.uncompressed_size)?;

        let actual = crc32fast::hash(&data);
        if actual != entry.crc32 {
            warn!(
                "CRC mismatch for {}: expected {:08x}, got {:08x}",
                entry.path, entry.crc32, actual
            );
            return Err(EngramError::corrupt(
                &entry.path,
                format!("CRC mismatch: expected {:08x}, got {:08x}", entry.crc32, actual),
            ));
        }

        debug!("Read {} ({} bytes, {})", entry.path, data.len(), method);
        Ok(data)
    }

    /// Read several files; results follow input order and the first failure
    /// fails the whole batch
    pub fn read_files<S: AsRef<str>>(&mut self, paths: &[S]) -> Result<Vec<Vec<u8>>> {
        paths.iter().map(|p| self.read_file(p.as_ref())).collect()
    }

    /// Read a file as UTF-8 text
    pub fn read_text(&mut self, path: &str) -> Result<String> {
        let data = self.read_file(path)?;
        String::from_utf8(data).map_err(|_| EngramError::InvalidUtf8(path.to_string()))
    }

    /// Read and deserialize a JSON file
    pub fn read_json<T: DeserializeOwned>(&mut self, path: &str) -> Result<T> {
        let data = self.read_file(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Read the raw `manifest.json` blob, or `None` if the archive has none
    pub fn read_manifest(&mut self) -> Result<Option<Vec<u8>>> {
        match self.read_file(MANIFEST_PATH) {
            Ok(data) => Ok(Some(data)),
            Err(EngramError::NotFound(path)) if path == MANIFEST_PATH => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Read every entry and report the paths that fail integrity checks
    ///
    /// I/O errors abort the scan; corrupt or unsupported entries are collected.
    pub fn verify(&mut self) -> Result<Vec<String>> {
        let index = Arc::clone(&self.index);
        let mut failed = Vec::new();

        for entry in &index.entries {
            match self.read_file(&entry.path) {
                Ok(_) => {}
                Err(EngramError::Corrupt { .. }) | Err(EngramError::Unsupported(_)) => {
                    failed.push(entry.path.clone());
                }
                Err(e) => return Err(e),
            }
        }

        Ok(failed)
    }
}
