use crate::archive::compression::{compress, compress_stream};
use crate::archive::format::{
    normalize_path, validate_path, ArchiveHeader, CompressionMethod, DirectoryEntry, Footer,
    HEADER_SIZE, MANIFEST_PATH,
};
use crate::config::ArchiveConfig;
use crate::error::{EngramError, Result};
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Archive writer for creating .eng files
///
/// Entries are compressed and appended to the output as they are added; the
/// table of contents and footer are written by [`finalize`](Self::finalize).
/// A writer is single-threaded: share it only behind external serialization.
pub struct ArchiveWriter<W: Write = File> {
    state: WriterState<W>,
    config: ArchiveConfig,
}

enum WriterState<W: Write> {
    Open(OpenArchive<W>),
    Finalized,
}

struct OpenArchive<W: Write> {
    output: BufWriter<W>,
    entries: Vec<DirectoryEntry>,
    paths: HashSet<String>,
    /// Byte position of the next payload
    position: u64,
}

impl ArchiveWriter<File> {
    /// Create a new archive file, truncating any existing file
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::create_with_config(path, ArchiveConfig::default())
    }

    /// Create a new archive file with explicit settings
    ///
    /// The settings are validated before the file is created.
    pub fn create_with_config<P: AsRef<Path>>(path: P, config: ArchiveConfig) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref();
        debug!("Creating archive at {:?}", path);
        let file = File::create(path)?;
        Self::new(file)?.with_config(config)
    }
}

impl<W: Write> ArchiveWriter<W> {
    /// Start an archive on an arbitrary output; writes the header immediately
    pub fn new(output: W) -> Result<Self> {
        let mut output = BufWriter::new(output);
        ArchiveHeader::new().write_to(&mut output)?;

        Ok(Self {
            state: WriterState::Open(OpenArchive {
                output,
                entries: Vec::new(),
                paths: HashSet::new(),
                position: HEADER_SIZE as u64,
            }),
            config: ArchiveConfig::default(),
        })
    }

    /// Replace the writer settings, rejecting out-of-range values with `Config`
    pub fn with_config(mut self, config: ArchiveConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    /// Whether `finalize` has already run
    pub fn is_finalized(&self) -> bool {
        matches!(self.state, WriterState::Finalized)
    }

    /// Number of entries added so far
    pub fn entry_count(&self) -> usize {
        match &self.state {
            WriterState::Open(open) => open.entries.len(),
            WriterState::Finalized => 0,
        }
    }

    /// Add a file to the archive with automatic compression selection
    pub fn add_file(&mut self, path: &str, data: &[u8]) -> Result<()> {
        let method = CompressionMethod::choose_for_path(
            path,
            data.len() as u64,
            self.config.min_compression_size,
        );
        self.add_entry(path, data, method, true)
    }

    /// Add a file with specific compression method
    pub fn add_file_with_compression(
        &mut self,
        path: &str,
        data: &[u8],
        compression: CompressionMethod,
    ) -> Result<()> {
        self.add_entry(path, data, compression, false)
    }

    /// Store an opaque manifest blob at `manifest.json` (Zstd)
    pub fn add_manifest(&mut self, data: &[u8]) -> Result<()> {
        self.add_file_with_compression(MANIFEST_PATH, data, CompressionMethod::Zstd)
    }

    /// Stream a file from disk into the archive
    ///
    /// The source is read in `stream_buffer_size` chunks, so memory use does
    /// not depend on the file size. When the auto-selected method would not
    /// shrink the file, a measuring pass over the source catches it and the
    /// entry is stored raw, as `add_file` does. The entry's modified time is
    /// taken from the source file. If streaming fails after bytes reached the
    /// output the writer is closed and the partial output is left to the
    /// caller.
    pub fn add_file_from_disk<P: AsRef<Path>>(&mut self, archive_path: &str, disk_path: P) -> Result<()> {
        let disk_path = disk_path.as_ref();
        let config = self.config.clone();
        let open = self.open_mut()?;
        let path = open.claim_path(archive_path)?;

        let mut source = File::open(disk_path)?;
        let metadata = source.metadata()?;
        let mut method =
            CompressionMethod::choose_for_path(&path, metadata.len(), config.min_compression_size);
        let modified_time = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or_else(now_secs);

        if method != CompressionMethod::None {
            // Nothing reaches the output here, so failures leave the writer open
            let measured = compress_stream(
                &mut source,
                io::sink(),
                method,
                config.zstd_level,
                config.stream_buffer_size,
            )?;
            if measured.compressed_size >= measured.uncompressed_size {
                debug!(
                    "{} does not shrink under {} ({} -> {} bytes), storing raw",
                    path, method, measured.uncompressed_size, measured.compressed_size
                );
                method = CompressionMethod::None;
            }
            source.seek(SeekFrom::Start(0))?;
        }

        let offset = open.position;
        let streamed = compress_stream(
            source,
            &mut open.output,
            method,
            config.zstd_level,
            config.stream_buffer_size,
        );

        let summary = match streamed {
            Ok(summary) => summary,
            Err(e) => {
                warn!("Streaming {:?} into {} failed: {}", disk_path, path, e);
                self.state = WriterState::Finalized;
                return Err(e);
            }
        };

        debug!(
            "Streamed {} ({} -> {} bytes, {})",
            path, summary.uncompressed_size, summary.compressed_size, method
        );

        open.position += summary.compressed_size;
        open.push(DirectoryEntry {
            path,
            offset,
            compressed_size: summary.compressed_size,
            uncompressed_size: summary.uncompressed_size,
            crc32: summary.crc32,
            compression_method: method.as_u8(),
            modified_time,
        });

        Ok(())
    }

    /// Write the table of contents and footer, then hand back the output
    ///
    /// The writer keeps no capability afterwards: every later call fails
    /// with `WriterFinalized`.
    pub fn finalize(&mut self) -> Result<W> {
        let open = match std::mem::replace(&mut self.state, WriterState::Finalized) {
            WriterState::Open(open) => open,
            WriterState::Finalized => return Err(EngramError::WriterFinalized),
        };
        let OpenArchive {
            mut output,
            entries,
            position,
            ..
        } = open;

        let entry_count = u32::try_from(entries.len()).map_err(|_| {
            EngramError::InvalidFormat(format!("Too many entries: {}", entries.len()))
        })?;

        // TOC follows the last data block
        let toc_offset = position;
        for entry in &entries {
            entry.write_to(&mut output)?;
        }
        Footer::new(toc_offset, entry_count).write_to(&mut output)?;

        output.flush()?;
        let inner = output.into_inner().map_err(|e| e.into_error())?;

        info!(
            "Finalized archive: {} entries, TOC at offset {}",
            entry_count, toc_offset
        );
        Ok(inner)
    }

    fn open_mut(&mut self) -> Result<&mut OpenArchive<W>> {
        match &mut self.state {
            WriterState::Open(open) => Ok(open),
            WriterState::Finalized => Err(EngramError::WriterFinalized),
        }
    }

    fn add_entry(
        &mut self,
        path: &str,
        data: &[u8],
        compression: CompressionMethod,
        auto_selected: bool,
    ) -> Result<()> {
        let zstd_level = self.config.zstd_level;
        let open = self.open_mut()?;

        if !compression.is_supported() {
            return Err(EngramError::Unsupported(compression.as_u8()));
        }
        let path = open.claim_path(path)?;

        let compressed = compress(data, compression, zstd_level)?;
        // Auto-selected methods fall back to raw storage when they don't pay off
        let (payload, method) = if auto_selected
            && compression != CompressionMethod::None
            && compressed.len() >= data.len()
        {
            (data.to_vec(), CompressionMethod::None)
        } else {
            (compressed, compression)
        };

        let offset = open.position;
        open.output.write_all(&payload)?;
        open.position += payload.len() as u64;

        debug!(
            "Added {} ({} -> {} bytes, {})",
            path,
            data.len(),
            payload.len(),
            method
        );

        open.push(DirectoryEntry {
            path,
            offset,
            compressed_size: payload.len() as u64,
            uncompressed_size: data.len() as u64,
            crc32: crc32fast::hash(data),
            compression_method: method.as_u8(),
            modified_time: now_secs(),
        });

        Ok(())
    }
}

impl<W: Write> OpenArchive<W> {
    /// Normalize and validate a path, rejecting duplicates
    fn claim_path(&self, path: &str) -> Result<String> {
        let normalized = normalize_path(path);
        validate_path(&normalized)?;
        if self.paths.contains(&normalized) {
            return Err(EngramError::DuplicatePath(normalized));
        }
        Ok(normalized)
    }

    fn push(&mut self, entry: DirectoryEntry) {
        self.paths.insert(entry.path.clone());
        self.entries.push(entry);
    }
}

impl<W: Write> Drop for ArchiveWriter<W> {
    fn drop(&mut self) {
        if let WriterState::Open(open) = &self.state {
            warn!(
                "Archive writer dropped before finalize; {} entries were never indexed",
                open.entries.len()
            );
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
