//! CRSD File Indexing System
//!
//! This module provides functionality to create lightweight indexes of CRSD
//! files that can be serialized to JSON and used later to read signal
//! vectors and parameter records through any [`ByteRangeReader`], without
//! parsing the header or mapping the XML again.

use serde::{Deserialize, Serialize};

use crate::api::crsd::CrsdReader;
use crate::api::metadata::{Metadata, MetadataSummary};
use crate::blocks::addressing::SignalAddressing;
use crate::blocks::file_header::FileHeader;
use crate::error::CrsdError;
use crate::parsing::decoder::FieldValue;
use crate::parsing::record_table::RecordTable;
use crate::parsing::source::ByteRangeReader;

/// Complete CRSD file index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrsdIndex {
    /// File size for validation
    pub file_size: u64,
    pub header: FileHeader,
    pub metadata: MetadataSummary,
}

impl CrsdIndex {
    /// Create an index from an opened reader.
    pub fn from_reader<M: Metadata>(reader: &CrsdReader<M>) -> Self {
        Self {
            file_size: reader.file_size(),
            header: reader.header().clone(),
            metadata: MetadataSummary::from_metadata(reader.metadata()),
        }
    }

    /// Save the index to a JSON file
    pub fn save_to_file(&self, index_path: &str) -> Result<(), CrsdError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CrsdError::Serialization(format!("JSON serialization failed: {}", e)))?;

        std::fs::write(index_path, json)?;

        Ok(())
    }

    /// Load an index from a JSON file
    pub fn load_from_file(index_path: &str) -> Result<Self, CrsdError> {
        let json = std::fs::read_to_string(index_path)?;

        let index: CrsdIndex = serde_json::from_str(&json)
            .map_err(|e| CrsdError::Serialization(format!("JSON deserialization failed: {}", e)))?;

        Ok(index)
    }

    /// Signal addressing rebuilt from the index.
    pub fn signal_addressing(&self) -> Result<SignalAddressing, CrsdError> {
        let block = self
            .header
            .signal
            .ok_or_else(|| CrsdError::Metadata(format!("{} files carry no signal block", self.header.crsd_type)))?;
        SignalAddressing::new(
            block.byte_offset,
            self.metadata.bytes_per_sample,
            self.metadata.channels.clone(),
        )
    }

    /// Read the raw samples of one vector.
    pub fn read_signal_vector<R: ByteRangeReader>(
        &self,
        channel: usize,
        vector: usize,
        reader: &mut R,
    ) -> Result<Vec<u8>, CrsdError> {
        let addressing = self.signal_addressing()?;
        let offset = addressing.vector_offset(channel, vector)?;
        reader.read_range(offset, addressing.vector_size(channel)?)
    }

    /// Read and decode one PVP record.
    pub fn read_pvp_record<R: ByteRangeReader>(
        &self,
        channel: usize,
        vector: usize,
        reader: &mut R,
    ) -> Result<Vec<(String, FieldValue)>, CrsdError> {
        let block = self
            .header
            .pvp
            .ok_or_else(|| CrsdError::Metadata(format!("{} files carry no PVP block", self.header.crsd_type)))?;
        let layout = self
            .metadata
            .pvp
            .as_ref()
            .ok_or_else(|| CrsdError::Metadata("index has no PVP layout".to_string()))?;
        let counts = self.metadata.vector_counts();
        let offset = record_offset(block.byte_offset, layout.total_size_bytes(), &counts, channel, vector)?;
        let raw = reader.read_range(offset, layout.total_size_bytes() as u64)?;
        RecordTable::decode_record(layout, &raw)
    }

    /// Read and decode one PPP record.
    pub fn read_ppp_record<R: ByteRangeReader>(
        &self,
        sequence: usize,
        pulse: usize,
        reader: &mut R,
    ) -> Result<Vec<(String, FieldValue)>, CrsdError> {
        let block = self
            .header
            .ppp
            .ok_or_else(|| CrsdError::Metadata(format!("{} files carry no PPP block", self.header.crsd_type)))?;
        let layout = self
            .metadata
            .ppp
            .as_ref()
            .ok_or_else(|| CrsdError::Metadata("index has no PPP layout".to_string()))?;
        let offset = record_offset(
            block.byte_offset,
            layout.total_size_bytes(),
            &self.metadata.tx_sequences,
            sequence,
            pulse,
        )?;
        let raw = reader.read_range(offset, layout.total_size_bytes() as u64)?;
        RecordTable::decode_record(layout, &raw)
    }
}

/// Absolute offset of record `index` of `channel` in a parameter block.
fn record_offset(
    base: u64,
    record_size: usize,
    counts: &[usize],
    channel: usize,
    index: usize,
) -> Result<u64, CrsdError> {
    let count = *counts.get(channel).ok_or(CrsdError::OutOfRange {
        what: "channel",
        index: channel,
        limit: counts.len(),
    })?;
    if index >= count {
        return Err(CrsdError::OutOfRange { what: "record", index, limit: count });
    }
    counts[..channel]
        .iter()
        .try_fold(index as u64, |acc, &n| acc.checked_add(n as u64))
        .and_then(|records| records.checked_mul(record_size as u64))
        .and_then(|skip| base.checked_add(skip))
        .ok_or_else(|| {
            CrsdError::Metadata(format!("record {index} of channel {channel} lies beyond the addressable range"))
        })
}
