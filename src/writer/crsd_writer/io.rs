// Low level file handling utilities for CrsdWriter
use super::*;
use std::io::Write;

use tracing::debug;

use crate::blocks::file_header::{BlockLocation, SECTION_TERMINATOR};

impl CrsdWriter {
    /// Creates a new CrsdWriter for the given file path (overwrites existing)
    /// and writes the header with its terminator.
    pub fn new(path: &str, header: FileHeader) -> Result<Self, CrsdError> {
        let mut file = File::create(path)?;
        header.write(&mut file)?;
        let offset = header.size_with_terminator();
        if offset > header.xml.byte_offset {
            return Err(CrsdError::Serialization(format!(
                "header is {offset} bytes but XML_BLOCK_BYTE_OFFSET is {}",
                header.xml.byte_offset
            )));
        }
        Ok(CrsdWriter { file, offset, header })
    }

    /// Zero-fill up to `target`.
    fn pad_to(&mut self, target: u64) -> Result<(), CrsdError> {
        if target > self.offset {
            let padding = vec![0u8; (target - self.offset) as usize];
            self.file.write_all(&padding)?;
            self.offset = target;
        }
        Ok(())
    }

    /// Writes a block at the position the header declares for it.
    pub(super) fn write_block_at(
        &mut self,
        label: &'static str,
        block: Option<BlockLocation>,
        bytes: &[u8],
    ) -> Result<(), CrsdError> {
        let block = block.ok_or_else(|| {
            CrsdError::Serialization(format!("{} files carry no {label} block", self.header.crsd_type))
        })?;
        if bytes.len() as u64 != block.size {
            return Err(CrsdError::Serialization(format!(
                "{label} block is {} bytes but the header declares {}",
                bytes.len(),
                block.size
            )));
        }
        if self.offset > block.byte_offset {
            return Err(CrsdError::Serialization(format!(
                "{label} block belongs at byte {} but {} bytes are already written",
                block.byte_offset, self.offset
            )));
        }

        self.pad_to(block.byte_offset)?;
        self.file.write_all(bytes)?;
        self.offset += bytes.len() as u64;
        debug!(block = label, offset = block.byte_offset, size = block.size, "wrote block");
        Ok(())
    }

    pub(super) fn write_terminator(&mut self) -> Result<(), CrsdError> {
        self.file.write_all(&[SECTION_TERMINATOR, b'\n'])?;
        self.offset += 2;
        Ok(())
    }

    /// Returns the current file offset.
    pub fn offset(&self) -> u64 { self.offset }

    /// Finalizes the file (flushes all data to disk).
    pub fn finalize(mut self) -> Result<(), CrsdError> {
        self.file.flush()?;
        Ok(())
    }
}
