use crate::error::{EngramError, Result};
use std::fmt;
use std::io::{Read, Write};

/// Magic bytes, written at the start of the header and repeated in the footer
pub const MAGIC: [u8; 6] = *b"ENGRAM";

/// Current format version
pub const FORMAT_VERSION: u16 = 1;

/// Header size in bytes (magic + version)
pub const HEADER_SIZE: usize = 8;

/// Footer size in bytes (toc_offset + entry_count + magic)
pub const FOOTER_SIZE: usize = 18;

/// Directory entry size in bytes
pub const DIRECTORY_ENTRY_SIZE: usize = 320;

/// Width of the NUL-padded path field
pub const PATH_FIELD_SIZE: usize = 255;

/// Maximum path length in bytes (UTF-8); the path field always keeps a NUL
pub const MAX_PATH_LENGTH: usize = PATH_FIELD_SIZE - 1;

/// Reserved trailing bytes in each directory entry
const RESERVED_SIZE: usize = 28;

/// Well-known path of the archive manifest
pub const MANIFEST_PATH: &str = "manifest.json";

/// Compression methods understood by the format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CompressionMethod {
    None = 0,
    Lz4 = 1,
    Zstd = 2,
    /// Reserved tag, never produced or decoded
    Deflate = 3,
}

impl CompressionMethod {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Lz4),
            2 => Ok(Self::Zstd),
            3 => Ok(Self::Deflate),
            _ => Err(EngramError::Unsupported(value)),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether this build can encode and decode the method
    pub fn is_supported(self) -> bool {
        !matches!(self, Self::Deflate)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Lz4 => "lz4",
            Self::Zstd => "zstd",
            Self::Deflate => "deflate",
        }
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Archive header: magic followed by the format version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveHeader {
    pub version: u16,
}

impl ArchiveHeader {
    pub fn new() -> Self {
        Self {
            version: FORMAT_VERSION,
        }
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&MAGIC)?;
        writer.write_all(&self.version.to_le_bytes())?;
        Ok(())
    }

    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; 6];
        reader.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(EngramError::InvalidFormat(
                "Invalid header magic".to_string(),
            ));
        }

        let version = read_u16(&mut reader)?;
        Ok(Self { version })
    }

    /// Reject archives written by a newer format revision
    pub fn validate_version(&self) -> Result<()> {
        if self.version == 0 || self.version > FORMAT_VERSION {
            return Err(EngramError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

impl Default for ArchiveHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// Footer: locates the table of contents from the end of the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    pub toc_offset: u64,
    pub entry_count: u32,
}

impl Footer {
    pub fn new(toc_offset: u64, entry_count: u32) -> Self {
        Self {
            toc_offset,
            entry_count,
        }
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&self.toc_offset.to_le_bytes())?;
        writer.write_all(&self.entry_count.to_le_bytes())?;
        writer.write_all(&MAGIC)?;
        Ok(())
    }

    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let toc_offset = read_u64(&mut reader)?;
        let entry_count = read_u32(&mut reader)?;

        let mut magic = [0u8; 6];
        reader.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(EngramError::InvalidFormat(
                "Invalid footer magic".to_string(),
            ));
        }

        Ok(Self {
            toc_offset,
            entry_count,
        })
    }

    /// Size of the table of contents this footer describes
    pub fn toc_size(&self) -> u64 {
        self.entry_count as u64 * DIRECTORY_ENTRY_SIZE as u64
    }
}

/// Table-of-contents record describing one stored entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub path: String,
    /// Byte position of the compressed payload
    pub offset: u64,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    /// CRC-32 of the uncompressed bytes
    pub crc32: u32,
    /// Raw method tag, kept as stored so reserved tags stay inspectable
    pub compression_method: u8,
    /// Unix seconds
    pub modified_time: u64,
}

impl DirectoryEntry {
    /// Decode the stored method tag
    pub fn compression(&self) -> Result<CompressionMethod> {
        CompressionMethod::from_u8(self.compression_method)
    }

    /// End of the payload (exclusive); `None` on overflow
    pub fn end_offset(&self) -> Option<u64> {
        self.offset.checked_add(self.compressed_size)
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        let path_bytes = self.path.as_bytes();
        validate_path_bytes(path_bytes)?;

        let mut path_buf = [0u8; PATH_FIELD_SIZE];
        path_buf[..path_bytes.len()].copy_from_slice(path_bytes);
        writer.write_all(&path_buf)?;

        writer.write_all(&self.offset.to_le_bytes())?;
        writer.write_all(&self.compressed_size.to_le_bytes())?;
        writer.write_all(&self.uncompressed_size.to_le_bytes())?;
        writer.write_all(&self.crc32.to_le_bytes())?;
        writer.write_all(&[self.compression_method])?;
        writer.write_all(&self.modified_time.to_le_bytes())?;
        writer.write_all(&[0u8; RESERVED_SIZE])?;

        Ok(())
    }

    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut path_buf = [0u8; PATH_FIELD_SIZE];
        reader.read_exact(&mut path_buf)?;

        let path_len = path_buf
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| EngramError::InvalidFormat("Unterminated entry path".to_string()))?;
        if path_len == 0 {
            return Err(EngramError::InvalidFormat("Empty entry path".to_string()));
        }
        let path = std::str::from_utf8(&path_buf[..path_len])
            .map_err(|e| EngramError::InvalidFormat(format!("Invalid UTF-8 in path: {}", e)))?
            .to_string();

        let offset = read_u64(&mut reader)?;
        let compressed_size = read_u64(&mut reader)?;
        let uncompressed_size = read_u64(&mut reader)?;
        let crc32 = read_u32(&mut reader)?;

        let mut method = [0u8; 1];
        reader.read_exact(&mut method)?;

        let modified_time = read_u64(&mut reader)?;

        let mut reserved = [0u8; RESERVED_SIZE];
        reader.read_exact(&mut reserved)?;

        Ok(Self {
            path,
            offset,
            compressed_size,
            uncompressed_size,
            crc32,
            compression_method: method[0],
            modified_time,
        })
    }
}

/// Normalize path to forward slashes (cross-platform compatibility)
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Check a path fits the directory entry's path field
pub fn validate_path(path: &str) -> Result<()> {
    validate_path_bytes(path.as_bytes())
}

fn validate_path_bytes(bytes: &[u8]) -> Result<()> {
    if bytes.is_empty() {
        return Err(EngramError::InvalidPath("path is empty".to_string()));
    }
    if bytes.len() > MAX_PATH_LENGTH {
        return Err(EngramError::InvalidPath(format!(
            "path too long: {} bytes (max {})",
            bytes.len(),
            MAX_PATH_LENGTH
        )));
    }
    if bytes.contains(&0) {
        return Err(EngramError::InvalidPath(
            "path contains a NUL byte".to_string(),
        ));
    }
    Ok(())
}

// Helper functions for reading primitive types
fn read_u16<R: Read>(mut reader: R) -> Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32<R: Read>(mut reader: R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(mut reader: R) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> DirectoryEntry {
        DirectoryEntry {
            path: "test/file.txt".to_string(),
            offset: 1024,
            compressed_size: 2000,
            uncompressed_size: 5000,
            crc32: 0xDEADBEEF,
            compression_method: CompressionMethod::Zstd.as_u8(),
            modified_time: 1699999999,
        }
    }

    #[test]
    fn test_compression_method_from_u8() {
        assert_eq!(CompressionMethod::from_u8(0).unwrap(), CompressionMethod::None);
        assert_eq!(CompressionMethod::from_u8(1).unwrap(), CompressionMethod::Lz4);
        assert_eq!(CompressionMethod::from_u8(2).unwrap(), CompressionMethod::Zstd);
        assert_eq!(CompressionMethod::from_u8(3).unwrap(), CompressionMethod::Deflate);
        assert!(!CompressionMethod::Deflate.is_supported());
        assert!(matches!(
            CompressionMethod::from_u8(99),
            Err(EngramError::Unsupported(99))
        ));
    }

    #[test]
    fn test_header_layout() {
        let mut buf = Vec::new();
        ArchiveHeader::new().write_to(&mut buf).unwrap();

        assert_eq!(buf.len(), HEADER_SIZE);
        assert_eq!(&buf[..6], b"ENGRAM");
        assert_eq!(u16::from_le_bytes([buf[6], buf[7]]), FORMAT_VERSION);

        let parsed = ArchiveHeader::read_from(&buf[..]).unwrap();
        assert!(parsed.validate_version().is_ok());
    }

    #[test]
    fn test_header_rejects_bad_magic_and_version() {
        let mut buf = b"ENGRAX".to_vec();
        buf.extend_from_slice(&1u16.to_le_bytes());
        assert!(matches!(
            ArchiveHeader::read_from(&buf[..]),
            Err(EngramError::InvalidFormat(_))
        ));

        let header = ArchiveHeader { version: 7 };
        assert!(matches!(
            header.validate_version(),
            Err(EngramError::UnsupportedVersion(7))
        ));
    }

    #[test]
    fn test_footer_layout() {
        let footer = Footer::new(4096, 12);
        let mut buf = Vec::new();
        footer.write_to(&mut buf).unwrap();

        assert_eq!(buf.len(), FOOTER_SIZE);
        assert_eq!(&buf[12..], b"ENGRAM");
        assert_eq!(Footer::read_from(&buf[..]).unwrap(), footer);
        assert_eq!(footer.toc_size(), 12 * 320);
    }

    #[test]
    fn test_directory_entry_layout() {
        let entry = sample_entry();
        let mut buf = Vec::new();
        entry.write_to(&mut buf).unwrap();

        assert_eq!(buf.len(), DIRECTORY_ENTRY_SIZE);
        // path field is NUL padded
        assert_eq!(&buf[..13], b"test/file.txt");
        assert!(buf[13..255].iter().all(|&b| b == 0));
        // offset directly follows the path field
        assert_eq!(u64::from_le_bytes(buf[255..263].try_into().unwrap()), 1024);
        // method tag sits after offset, sizes and crc
        assert_eq!(buf[255 + 8 + 8 + 8 + 4], 2);
        // reserved tail is zeroed
        assert!(buf[292..].iter().all(|&b| b == 0));

        let parsed = DirectoryEntry::read_from(&buf[..]).unwrap();
        assert_eq!(parsed, entry);
        assert_eq!(parsed.compression().unwrap(), CompressionMethod::Zstd);
    }

    #[test]
    fn test_max_length_path() {
        let mut entry = sample_entry();
        entry.path = "a".repeat(MAX_PATH_LENGTH);
        let mut buf = Vec::new();
        entry.write_to(&mut buf).unwrap();
        assert_eq!(DirectoryEntry::read_from(&buf[..]).unwrap().path, entry.path);

        entry.path = "a".repeat(MAX_PATH_LENGTH + 1);
        assert!(matches!(
            entry.write_to(Vec::new()),
            Err(EngramError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_unterminated_path_rejected() {
        let mut buf = vec![b'x'; DIRECTORY_ENTRY_SIZE];
        buf[PATH_FIELD_SIZE..].fill(0);
        assert!(matches!(
            DirectoryEntry::read_from(&buf[..]),
            Err(EngramError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_validate_path() {
        assert!(validate_path("dir/file.txt").is_ok());
        assert!(validate_path("").is_err());
        assert!(validate_path("bad\0path").is_err());
        assert_eq!(normalize_path("dir\\sub\\file.txt"), "dir/sub/file.txt");
    }
}
