//! Random-access byte storage underneath a murmur file.
//!
//! The engines never touch files directly. They read and write byte ranges
//! through the [`Storage`] trait, which has two implementations:
//!
//! - [`MappedFile`]: a memory-mapped file on disk, used by [`crate::Store`]
//! - [`MemoryStorage`]: a plain byte vector, handy for tests and tooling
//!
//! # Safety
//!
//! [`MappedFile`] maps the file with `memmap2`. Mapping is unsafe because
//! another process could truncate the file underneath the mapping. murmur
//! files are never resized after creation, and concurrent writers are outside
//! the supported model, so the mapping is treated as stable for the lifetime
//! of one operation.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::Path;

use memmap2::{Mmap, MmapMut};

use crate::error::{ConfigurationError, Result, StorageError};

/// Byte-addressed storage with a fixed length.
pub trait Storage {
    /// Path used in error messages.
    fn path(&self) -> &str;

    /// Total size in bytes.
    fn len(&self) -> u64;

    /// Returns `true` if the storage holds no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fills `buf` with the bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::OutOfBounds`] if the range extends past the end.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Overwrites the bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::OutOfBounds`] if the range extends past the end,
    /// or [`StorageError::ReadOnly`] if the storage is not writable.
    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()>;

    /// Flushes written bytes to stable storage.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Sync`] if the flush fails.
    fn sync(&mut self) -> Result<()>;
}

/// Converts an `(offset, len)` pair into a checked byte range.
fn checked_range(path: &str, size: u64, offset: u64, len: usize) -> Result<std::ops::Range<usize>> {
    let length = len as u64;
    match offset.checked_add(length) {
        Some(end) if end <= size => {
            // Both ends are bounded by the mapping length, which is a usize.
            #[allow(clippy::cast_possible_truncation)]
            Ok(offset as usize..end as usize)
        }
        _ => Err(StorageError::OutOfBounds {
            path: path.to_string(),
            offset,
            length,
            size,
        }
        .into()),
    }
}

/// The two ways a file can be mapped.
#[derive(Debug)]
enum Mapping {
    ReadOnly(Mmap),
    ReadWrite(MmapMut),
}

impl Mapping {
    fn bytes(&self) -> &[u8] {
        match self {
            Self::ReadOnly(map) => &map[..],
            Self::ReadWrite(map) => &map[..],
        }
    }
}

/// A memory-mapped murmur file.
///
/// Dropping the value unmaps the file and closes the descriptor, which also
/// releases any advisory lock taken with [`MappedFile::lock`].
#[derive(Debug)]
pub struct MappedFile {
    /// Keeps the descriptor (and its lock) alive alongside the mapping.
    file: File,
    map: Mapping,
    path: String,
}

impl MappedFile {
    /// Creates a new zero-filled file of `size` bytes and maps it read-write.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::AlreadyExists`] if the path is present,
    /// or [`StorageError`] if creation, sizing, or mapping fails.
    pub fn create<P: AsRef<Path>>(path: P, size: u64) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.to_string_lossy().to_string();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| -> crate::MurmurError {
                if e.kind() == ErrorKind::AlreadyExists {
                    ConfigurationError::AlreadyExists {
                        path: path_str.clone(),
                    }
                    .into()
                } else {
                    StorageError::Open {
                        path: path_str.clone(),
                        source: e,
                    }
                    .into()
                }
            })?;

        file.set_len(size).map_err(|e| StorageError::Open {
            path: path_str.clone(),
            source: e,
        })?;

        // SAFETY: The file was just created by us with `create_new` and sized
        // above; nothing else resizes it while the mapping is alive.
        let map = unsafe {
            MmapMut::map_mut(&file).map_err(|e| StorageError::Map {
                path: path_str.clone(),
                source: e,
            })?
        };

        Ok(Self {
            file,
            map: Mapping::ReadWrite(map),
            path: path_str,
        })
    }

    /// Opens an existing file and maps it read-write.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the file cannot be opened (the
    /// platform error is kept as the source), or [`StorageError::Map`] if
    /// mapping fails.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.to_string_lossy().to_string();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| StorageError::Open {
                path: path_str.clone(),
                source: e,
            })?;

        // SAFETY: murmur files keep their size for their whole life, and the
        // descriptor stays open for as long as the mapping.
        let map = unsafe {
            MmapMut::map_mut(&file).map_err(|e| StorageError::Map {
                path: path_str.clone(),
                source: e,
            })?
        };

        Ok(Self {
            file,
            map: Mapping::ReadWrite(map),
            path: path_str,
        })
    }

    /// Opens an existing file and maps it read-only.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] or [`StorageError::Map`].
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.to_string_lossy().to_string();

        let file = File::open(path).map_err(|e| StorageError::Open {
            path: path_str.clone(),
            source: e,
        })?;

        // SAFETY: Same as `open`; the mapping is never written through.
        let map = unsafe {
            Mmap::map(&file).map_err(|e| StorageError::Map {
                path: path_str.clone(),
                source: e,
            })?
        };

        Ok(Self {
            file,
            map: Mapping::ReadOnly(map),
            path: path_str,
        })
    }

    /// Takes an exclusive advisory lock on the file, blocking until granted.
    ///
    /// The lock is released when this value is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Lock`] if the OS refuses the lock.
    pub fn lock(&self) -> Result<()> {
        self.file.lock().map_err(|e| StorageError::Lock {
            path: self.path.clone(),
            source: e,
        })?;
        tracing::trace!(path = %self.path, "acquired exclusive lock");
        Ok(())
    }
}

impl Storage for MappedFile {
    fn path(&self) -> &str {
        &self.path
    }

    fn len(&self) -> u64 {
        self.map.bytes().len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let bytes = self.map.bytes();
        let range = checked_range(&self.path, bytes.len() as u64, offset, buf.len())?;
        buf.copy_from_slice(&bytes[range]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let Mapping::ReadWrite(map) = &mut self.map else {
            return Err(StorageError::ReadOnly {
                path: self.path.clone(),
            }
            .into());
        };
        let range = checked_range(&self.path, map.len() as u64, offset, data.len())?;
        map[range].copy_from_slice(data);
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        if let Mapping::ReadWrite(map) = &self.map {
            map.flush().map_err(|e| StorageError::Sync {
                path: self.path.clone(),
                source: e,
            })?;
        }
        Ok(())
    }
}

/// Storage backed by an in-memory byte vector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStorage {
    bytes: Vec<u8>,
}

impl MemoryStorage {
    /// Creates zero-filled storage of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0; size],
        }
    }

    /// Wraps existing bytes, e.g. a file read into memory.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the storage, returning the raw bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.bytes
    }
}

impl Storage for MemoryStorage {
    fn path(&self) -> &str {
        "<memory>"
    }

    fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let range = checked_range(self.path(), self.len(), offset, buf.len())?;
        buf.copy_from_slice(&self.bytes[range]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let range = checked_range(self.path(), self.len(), offset, data.len())?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
}
