//! Compression dispatch for entry payloads
//!
//! - None: payload stored verbatim
//! - Lz4: LZ4 frame format (same encoding for buffered and streamed writes)
//! - Zstd: standard zstd frame
//! - Deflate: reserved tag, rejected in both directions
//!
//! Decoding is bounded by the entry's recorded uncompressed size, so a
//! damaged size field or payload can never expand past what the directory
//! promised.

use crate::archive::format::CompressionMethod;
use crate::error::{EngramError, Result};
use lz4_flex::frame::{FrameDecoder, FrameEncoder};
use std::io::{self, Read, Write};

/// Upper bound on speculative preallocation while decoding (64MB)
const MAX_PREALLOCATION: u64 = 64 * 1024 * 1024;

impl CompressionMethod {
    /// Choose a method from the entry's extension and size
    pub fn choose_for_path(path: &str, size: u64, min_compression_size: usize) -> Self {
        // Don't compress small files
        if size < min_compression_size as u64 {
            return Self::None;
        }

        let file_name = path.rsplit('/').next().unwrap_or(path);
        let extension = match file_name.rsplit_once('.') {
            Some((_, ext)) => ext.to_lowercase(),
            None => String::new(),
        };

        match extension.as_str() {
            // Already compressed formats
            "jpg" | "jpeg" | "png" | "gif" | "webp" | "mp3" | "mp4" | "zip" | "gz" | "bz2"
            | "7z" | "xz" | "zst" | "lz4" => Self::None,
            // Text formats - use Zstd for best compression
            "json" | "txt" | "md" | "toml" | "yaml" | "yml" | "xml" | "html" | "css" | "js"
            | "ts" | "csv" => Self::Zstd,
            // Database files
            "db" | "sqlite" | "sqlite3" => Self::Zstd,
            // Default: LZ4 for speed
            _ => Self::Lz4,
        }
    }
}

/// Compress a buffer in one shot
pub fn compress(data: &[u8], method: CompressionMethod, zstd_level: i32) -> Result<Vec<u8>> {
    match method {
        CompressionMethod::None => Ok(data.to_vec()),
        CompressionMethod::Lz4 => {
            let mut encoder = FrameEncoder::new(Vec::with_capacity(data.len() / 2 + 64));
            encoder.write_all(data)?;
            encoder
                .finish()
                .map_err(|e| EngramError::Internal(format!("LZ4 compression failed: {}", e)))
        }
        CompressionMethod::Zstd => Ok(zstd::encode_all(data, zstd_level)?),
        CompressionMethod::Deflate => Err(EngramError::Unsupported(method.as_u8())),
    }
}

/// Reverse `compress`, verifying the output length against `expected_size`
///
/// Decode failures are reported as `Corrupt` for `path`.
pub fn decompress(
    path: &str,
    data: &[u8],
    method: CompressionMethod,
    expected_size: u64,
) -> Result<Vec<u8>> {
    let output = match method {
        CompressionMethod::None => data.to_vec(),
        CompressionMethod::Lz4 => read_bounded(path, FrameDecoder::new(data), expected_size)?,
        CompressionMethod::Zstd => {
            let decoder = zstd::stream::Decoder::new(data)
                .map_err(|e| EngramError::corrupt(path, format!("zstd: {}", e)))?;
            read_bounded(path, decoder, expected_size)?
        }
        CompressionMethod::Deflate => return Err(EngramError::Unsupported(method.as_u8())),
    };

    if output.len() as u64 != expected_size {
        return Err(EngramError::corrupt(
            path,
            format!(
                "decoded {} bytes, directory records {}",
                output.len(),
                expected_size
            ),
        ));
    }

    Ok(output)
}

fn read_bounded<R: Read>(path: &str, reader: R, expected_size: u64) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(expected_size.min(MAX_PREALLOCATION) as usize);
    // One byte of slack so an oversized stream is detected rather than truncated
    reader
        .take(expected_size.saturating_add(1))
        .read_to_end(&mut output)
        .map_err(|e| EngramError::corrupt(path, format!("decompression failed: {}", e)))?;
    Ok(output)
}

/// Sizes and checksum gathered while streaming an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSummary {
    pub uncompressed_size: u64,
    pub compressed_size: u64,
    pub crc32: u32,
}

/// Stream `source` through `method` into `sink` in `buffer_size` chunks
pub fn compress_stream<R: Read, W: Write>(
    source: R,
    sink: W,
    method: CompressionMethod,
    zstd_level: i32,
    buffer_size: usize,
) -> Result<StreamSummary> {
    let mut source = HashingReader::new(source);
    let mut sink = CountingWriter::new(sink);

    match method {
        CompressionMethod::None => copy_chunked(&mut source, &mut sink, buffer_size)?,
        CompressionMethod::Lz4 => {
            let mut encoder = FrameEncoder::new(&mut sink);
            copy_chunked(&mut source, &mut encoder, buffer_size)?;
            encoder
                .finish()
                .map_err(|e| EngramError::Internal(format!("LZ4 compression failed: {}", e)))?;
        }
        CompressionMethod::Zstd => {
            let mut encoder = zstd::stream::Encoder::new(&mut sink, zstd_level)?;
            copy_chunked(&mut source, &mut encoder, buffer_size)?;
            encoder.finish()?;
        }
        CompressionMethod::Deflate => return Err(EngramError::Unsupported(method.as_u8())),
    }

    let (uncompressed_size, crc32) = source.finish();
    Ok(StreamSummary {
        uncompressed_size,
        compressed_size: sink.written,
        crc32,
    })
}

fn copy_chunked<R: Read, W: Write>(reader: &mut R, writer: &mut W, buffer_size: usize) -> io::Result<()> {
    let mut buf = vec![0u8; buffer_size.max(1)];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buf[..n])?;
    }
}

/// Reader adapter that checksums and counts everything read through it
struct HashingReader<R> {
    inner: R,
    hasher: crc32fast::Hasher,
    read: u64,
}

impl<R: Read> HashingReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: crc32fast::Hasher::new(),
            read: 0,
        }
    }

    fn finish(self) -> (u64, u32) {
        (self.read, self.hasher.finalize())
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.read += n as u64;
        Ok(n)
    }
}

/// Writer adapter that counts bytes passed to the inner writer
pub(crate) struct CountingWriter<W> {
    inner: W,
    written: u64,
}

impl<W: Write> CountingWriter<W> {
    pub(crate) fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
