//! Implementation of the CrsdWriter struct split across several submodules

use std::fs::File;

use crate::blocks::file_header::FileHeader;
use crate::error::CrsdError;
use crate::parsing::record_table::RecordTable;

mod io;

/// Writer for CRSD files.
///
/// The header decides where every block goes, so it must be complete
/// (see [`FileHeader::set_block_sizes`]) before the writer is created.
/// Blocks must then be written in file order: XML, support, PPP, PVP,
/// signal. Each block must be exactly as long as the header declares.
pub struct CrsdWriter {
    file: File,
    offset: u64,
    header: FileHeader,
}

impl CrsdWriter {
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Write the XML block followed by its section terminator.
    pub fn write_xml(&mut self, xml: &[u8]) -> Result<(), CrsdError> {
        let block = Some(self.header.xml);
        self.write_block_at("XML", block, xml)?;
        self.write_terminator()
    }

    pub fn write_support(&mut self, bytes: &[u8]) -> Result<(), CrsdError> {
        self.write_block_at("support", self.header.support, bytes)
    }

    /// Encode and write the per-pulse parameter block.
    pub fn write_ppp(&mut self, table: &RecordTable) -> Result<(), CrsdError> {
        let bytes = table.to_bytes()?;
        self.write_block_at("PPP", self.header.ppp, &bytes)
    }

    /// Encode and write the per-vector parameter block.
    pub fn write_pvp(&mut self, table: &RecordTable) -> Result<(), CrsdError> {
        let bytes = table.to_bytes()?;
        self.write_block_at("PVP", self.header.pvp, &bytes)
    }

    pub fn write_signal(&mut self, bytes: &[u8]) -> Result<(), CrsdError> {
        self.write_block_at("signal", self.header.signal, bytes)
    }
}
