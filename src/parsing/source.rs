//! Byte sources for block loads.
//!
//! Parallel loads never share a cursor: every worker asks the
//! [`ReaderFactory`] for its own [`ByteRangeReader`] and reads only the
//! byte range it was assigned.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::CrsdError;

/// Trait for reading byte ranges from different sources (files, memory maps, etc.)
pub trait ByteRangeReader {
    /// Read exactly `length` bytes starting at `offset`.
    fn read_range(&mut self, offset: u64, length: u64) -> Result<Vec<u8>, CrsdError>;
}

/// Hands out independent readers over the same bytes.
pub trait ReaderFactory: Sync {
    type Reader: ByteRangeReader;

    fn open_reader(&self) -> Result<Self::Reader, CrsdError>;

    /// Total number of bytes available.
    fn len(&self) -> Result<u64, CrsdError>;
}

/// Local file reader implementation
pub struct FileRangeReader {
    file: File,
}

impl FileRangeReader {
    pub fn new<P: AsRef<Path>>(file_path: P) -> Result<Self, CrsdError> {
        let file = File::open(file_path)?;
        Ok(Self { file })
    }
}

impl ByteRangeReader for FileRangeReader {
    fn read_range(&mut self, offset: u64, length: u64) -> Result<Vec<u8>, CrsdError> {
        self.file.seek(SeekFrom::Start(offset))?;

        let mut buffer = vec![0u8; length as usize];
        self.file.read_exact(&mut buffer).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                CrsdError::TruncatedStream {
                    block: "file",
                    offset,
                    expected: length,
                    actual: self.file.metadata().map(|m| m.len().saturating_sub(offset)).unwrap_or(0),
                }
            } else {
                CrsdError::IOError(e)
            }
        })?;

        Ok(buffer)
    }
}

/// A file on disk; each reader gets its own handle.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ReaderFactory for FileSource {
    type Reader = FileRangeReader;

    fn open_reader(&self) -> Result<Self::Reader, CrsdError> {
        FileRangeReader::new(&self.path)
    }

    fn len(&self) -> Result<u64, CrsdError> {
        Ok(std::fs::metadata(&self.path)?.len())
    }
}

/// Bytes already in memory, typically a memory-mapped file.
#[derive(Debug, Clone, Copy)]
pub struct SliceSource<'a> {
    bytes: &'a [u8],
}

impl<'a> SliceSource<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }
}

impl<'a> ReaderFactory for SliceSource<'a> {
    type Reader = SliceReader<'a>;

    fn open_reader(&self) -> Result<Self::Reader, CrsdError> {
        Ok(SliceReader { bytes: self.bytes })
    }

    fn len(&self) -> Result<u64, CrsdError> {
        Ok(self.bytes.len() as u64)
    }
}

pub struct SliceReader<'a> {
    bytes: &'a [u8],
}

impl ByteRangeReader for SliceReader<'_> {
    fn read_range(&mut self, offset: u64, length: u64) -> Result<Vec<u8>, CrsdError> {
        let available = (self.bytes.len() as u64).saturating_sub(offset);
        if length > available {
            return Err(CrsdError::TruncatedStream {
                block: "memory",
                offset,
                expected: length,
                actual: available,
            });
        }
        let start = offset as usize;
        Ok(self.bytes[start..start + length as usize].to_vec())
    }
}
