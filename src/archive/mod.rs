mod compression;
mod format;
pub(crate) mod reader;
mod writer;

#[cfg(feature = "async")]
mod async_reader;

pub use compression::{compress, compress_stream, decompress, StreamSummary};
pub use format::{
    normalize_path, validate_path, ArchiveHeader, CompressionMethod, DirectoryEntry, Footer,
    DIRECTORY_ENTRY_SIZE, FOOTER_SIZE, FORMAT_VERSION, HEADER_SIZE, MAGIC, MANIFEST_PATH,
    MAX_PATH_LENGTH, PATH_FIELD_SIZE,
};
pub use reader::ArchiveReader;
pub use writer::ArchiveWriter;

#[cfg(feature = "async")]
pub use async_reader::AsyncArchiveReader;
