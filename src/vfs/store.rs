//! Backing stores for files opened through the archive VFS
//!
//! SQLite sees every file as a random-access byte range with advisory
//! locks. Each store implements that capability set; today the only
//! variant is an owned in-memory buffer.

use libsqlite3_sys as ffi;
use std::io;
use std::os::raw::c_int;

/// SQLite file lock levels, in escalation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LockLevel {
    #[default]
    Unlocked,
    Shared,
    Reserved,
    Pending,
    Exclusive,
}

impl LockLevel {
    pub fn from_raw(level: c_int) -> Option<Self> {
        match level {
            ffi::SQLITE_LOCK_NONE => Some(Self::Unlocked),
            ffi::SQLITE_LOCK_SHARED => Some(Self::Shared),
            ffi::SQLITE_LOCK_RESERVED => Some(Self::Reserved),
            ffi::SQLITE_LOCK_PENDING => Some(Self::Pending),
            ffi::SQLITE_LOCK_EXCLUSIVE => Some(Self::Exclusive),
            _ => None,
        }
    }

    pub fn as_raw(self) -> c_int {
        match self {
            Self::Unlocked => ffi::SQLITE_LOCK_NONE,
            Self::Shared => ffi::SQLITE_LOCK_SHARED,
            Self::Reserved => ffi::SQLITE_LOCK_RESERVED,
            Self::Pending => ffi::SQLITE_LOCK_PENDING,
            Self::Exclusive => ffi::SQLITE_LOCK_EXCLUSIVE,
        }
    }
}

/// Growable in-memory file
#[derive(Debug, Default)]
pub struct MemoryFile {
    data: Vec<u8>,
    lock: LockLevel,
}

impl MemoryFile {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            lock: LockLevel::Unlocked,
        }
    }

    /// Copy bytes at `offset` into `buf`, zero-filling past the end
    ///
    /// Returns the number of bytes that came from the file.
    pub fn read(&self, offset: u64, buf: &mut [u8]) -> usize {
        let start = match usize::try_from(offset) {
            Ok(start) if start < self.data.len() => start,
            _ => {
                buf.fill(0);
                return 0;
            }
        };

        let available = (self.data.len() - start).min(buf.len());
        buf[..available].copy_from_slice(&self.data[start..start + available]);
        buf[available..].fill(0);
        available
    }

    /// Write `bytes` at `offset`, growing the buffer as needed
    pub fn write(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()> {
        let start = usize::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset out of range"))?;
        let end = start
            .checked_add(bytes.len())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "write past address space"))?;

        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(bytes);
        Ok(())
    }

    pub fn truncate(&mut self, size: u64) -> io::Result<()> {
        let size = usize::try_from(size)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "size out of range"))?;
        self.data.resize(size, 0);
        Ok(())
    }

    pub fn file_size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Record a lock escalation; never contended
    pub fn lock(&mut self, level: LockLevel) {
        if level > self.lock {
            self.lock = level;
        }
    }

    /// Record a lock downgrade to `level`
    pub fn unlock(&mut self, level: LockLevel) {
        if level < self.lock {
            self.lock = level;
        }
    }

    pub fn lock_level(&self) -> LockLevel {
        self.lock
    }
}

/// Storage capability behind one VFS file
#[derive(Debug)]
pub enum BackingStore {
    Memory(MemoryFile),
}

impl BackingStore {
    pub fn memory(data: Vec<u8>) -> Self {
        Self::Memory(MemoryFile::new(data))
    }

    pub fn read(&self, offset: u64, buf: &mut [u8]) -> usize {
        match self {
            Self::Memory(file) => file.read(offset, buf),
        }
    }

    pub fn write(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()> {
        match self {
            Self::Memory(file) => file.write(offset, bytes),
        }
    }

    pub fn truncate(&mut self, size: u64) -> io::Result<()> {
        match self {
            Self::Memory(file) => file.truncate(size),
        }
    }

    pub fn file_size(&self) -> u64 {
        match self {
            Self::Memory(file) => file.file_size(),
        }
    }

    /// Memory is always consistent
    pub fn sync(&self) -> io::Result<()> {
        match self {
            Self::Memory(_) => Ok(()),
        }
    }

    pub fn lock(&mut self, level: LockLevel) {
        match self {
            Self::Memory(file) => file.lock(level),
        }
    }

    pub fn unlock(&mut self, level: LockLevel) {
        match self {
            Self::Memory(file) => file.unlock(level),
        }
    }

    pub fn lock_level(&self) -> LockLevel {
        match self {
            Self::Memory(file) => file.lock_level(),
        }
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> Vec<u8> {
        match self {
            Self::Memory(file) => file.bytes().to_vec(),
        }
    }
}
