//! Mapping of logical coordinates to absolute file offsets.

use serde::{Deserialize, Serialize};

use crate::error::CrsdError;

/// Shape of one signal channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelShape {
    pub num_vectors: usize,
    pub num_samples: usize,
    /// Size of the channel's compressed signal, when compression is active.
    pub compressed_size: Option<u64>,
}

impl ChannelShape {
    pub fn new(num_vectors: usize, num_samples: usize) -> Self {
        Self {
            num_vectors,
            num_samples,
            compressed_size: None,
        }
    }
}

/// Addressing for the signal block.
///
/// Channels are stored back to back; within an uncompressed channel each
/// vector holds `num_samples` samples of `bytes_per_sample` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalAddressing {
    base_offset: u64,
    bytes_per_sample: usize,
    channels: Vec<ChannelShape>,
    // Byte offset of each channel relative to the block start.
    channel_starts: Vec<u64>,
    block_size: u64,
}

impl SignalAddressing {
    /// Lay the channels out back to back from `base_offset`.
    ///
    /// Fails with [`CrsdError::Metadata`] when a channel size or the end of
    /// the last channel does not fit in a 64-bit offset.
    pub fn new(base_offset: u64, bytes_per_sample: usize, channels: Vec<ChannelShape>) -> Result<Self, CrsdError> {
        let mut channel_starts = Vec::with_capacity(channels.len());
        let mut start = 0u64;
        for (channel, shape) in channels.iter().enumerate() {
            channel_starts.push(start);
            start = start
                .checked_add(stored_size(shape, bytes_per_sample)?)
                .ok_or_else(|| too_large(format!("signal channels up to channel {channel}")))?;
        }
        base_offset
            .checked_add(start)
            .ok_or_else(|| too_large(format!("signal block at byte {base_offset}")))?;
        Ok(Self {
            base_offset,
            bytes_per_sample,
            channels,
            channel_starts,
            block_size: start,
        })
    }

    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    pub fn bytes_per_sample(&self) -> usize {
        self.bytes_per_sample
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn shape(&self, channel: usize) -> Result<&ChannelShape, CrsdError> {
        self.channels.get(channel).ok_or(CrsdError::OutOfRange {
            what: "channel",
            index: channel,
            limit: self.channels.len(),
        })
    }

    pub fn is_compressed(&self, channel: usize) -> Result<bool, CrsdError> {
        Ok(self.shape(channel)?.compressed_size.is_some())
    }

    /// Bytes the channel occupies in the file.
    pub fn channel_size(&self, channel: usize) -> Result<u64, CrsdError> {
        stored_size(self.shape(channel)?, self.bytes_per_sample)
    }

    /// Absolute offset of the channel's first byte.
    pub fn channel_offset(&self, channel: usize) -> Result<u64, CrsdError> {
        self.shape(channel)?;
        Ok(self.base_offset + self.channel_starts[channel])
    }

    /// Bytes in one uncompressed vector of the channel.
    pub fn vector_size(&self, channel: usize) -> Result<u64, CrsdError> {
        let shape = self.uncompressed_shape(channel)?;
        (shape.num_samples as u64)
            .checked_mul(self.bytes_per_sample as u64)
            .ok_or_else(|| too_large(format!("vectors of channel {channel}")))
    }

    /// Absolute offset of the first sample of a vector.
    pub fn vector_offset(&self, channel: usize, vector: usize) -> Result<u64, CrsdError> {
        let shape = self.uncompressed_shape(channel)?;
        if vector >= shape.num_vectors {
            return Err(CrsdError::OutOfRange {
                what: "vector",
                index: vector,
                limit: shape.num_vectors,
            });
        }
        Ok(self.channel_offset(channel)? + vector as u64 * self.vector_size(channel)?)
    }

    /// Absolute file offset of one sample.
    ///
    /// # Errors
    /// * [`CrsdError::OutOfRange`] for any index past the channel's shape.
    /// * [`CrsdError::CompressedAddressing`] if the channel is compressed;
    ///   compressed channels can only be read whole.
    pub fn file_offset(&self, channel: usize, vector: usize, sample: usize) -> Result<u64, CrsdError> {
        let shape = self.uncompressed_shape(channel)?;
        if sample >= shape.num_samples {
            return Err(CrsdError::OutOfRange {
                what: "sample",
                index: sample,
                limit: shape.num_samples,
            });
        }
        Ok(self.vector_offset(channel, vector)? + sample as u64 * self.bytes_per_sample as u64)
    }

    /// Total bytes of all channels.
    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    fn uncompressed_shape(&self, channel: usize) -> Result<&ChannelShape, CrsdError> {
        let shape = self.shape(channel)?;
        if shape.compressed_size.is_some() {
            return Err(CrsdError::CompressedAddressing { channel });
        }
        Ok(shape)
    }
}

fn stored_size(shape: &ChannelShape, bytes_per_sample: usize) -> Result<u64, CrsdError> {
    match shape.compressed_size {
        Some(size) => Ok(size),
        None => checked_product(&[shape.num_vectors, shape.num_samples, bytes_per_sample])
            .ok_or_else(|| too_large(format!("a channel of {} x {} samples", shape.num_vectors, shape.num_samples))),
    }
}

fn checked_product(factors: &[usize]) -> Option<u64> {
    factors.iter().try_fold(1u64, |acc, &f| acc.checked_mul(f as u64))
}

fn too_large(what: String) -> CrsdError {
    CrsdError::Metadata(format!("{what} exceeds the addressable range"))
}

/// One two-dimensional array in the support block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportArrayShape {
    pub id: String,
    pub num_rows: usize,
    pub num_cols: usize,
    pub bytes_per_element: usize,
    /// Offset of the array relative to the support block start.
    pub array_byte_offset: u64,
}

impl SupportArrayShape {
    pub fn size_bytes(&self) -> Result<u64, CrsdError> {
        checked_product(&[self.num_rows, self.num_cols, self.bytes_per_element])
            .ok_or_else(|| too_large(format!("support array {}", self.id)))
    }
}

/// Addressing for the support block. Arrays are stored row-major.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupportAddressing {
    base_offset: u64,
    arrays: Vec<SupportArrayShape>,
    required_size: u64,
}

impl SupportAddressing {
    /// Fails with [`CrsdError::Metadata`] when an array ends past a 64-bit
    /// offset.
    pub fn new(base_offset: u64, arrays: Vec<SupportArrayShape>) -> Result<Self, CrsdError> {
        let mut required_size = 0u64;
        for array in &arrays {
            let end = array
                .array_byte_offset
                .checked_add(array.size_bytes()?)
                .and_then(|end| base_offset.checked_add(end).map(|_| end))
                .ok_or_else(|| too_large(format!("support array {}", array.id)))?;
            required_size = required_size.max(end);
        }
        Ok(Self {
            base_offset,
            arrays,
            required_size,
        })
    }

    pub fn arrays(&self) -> &[SupportArrayShape] {
        &self.arrays
    }

    pub fn array(&self, id: &str) -> Result<&SupportArrayShape, CrsdError> {
        self.arrays
            .iter()
            .find(|a| a.id == id)
            .ok_or_else(|| CrsdError::UnknownSupportArray(id.to_string()))
    }

    /// Absolute offset and length of a whole array.
    pub fn array_range(&self, id: &str) -> Result<(u64, u64), CrsdError> {
        let array = self.array(id)?;
        Ok((self.base_offset + array.array_byte_offset, array.size_bytes()?))
    }

    /// Absolute offset of element `(row, col)`.
    pub fn element_offset(&self, id: &str, row: usize, col: usize) -> Result<u64, CrsdError> {
        let array = self.array(id)?;
        if row >= array.num_rows {
            return Err(CrsdError::OutOfRange { what: "row", index: row, limit: array.num_rows });
        }
        if col >= array.num_cols {
            return Err(CrsdError::OutOfRange { what: "column", index: col, limit: array.num_cols });
        }
        let element = (row as u64 * array.num_cols as u64 + col as u64) * array.bytes_per_element as u64;
        Ok(self.base_offset + array.array_byte_offset + element)
    }

    /// Bytes needed to hold every array.
    pub fn required_size(&self) -> u64 {
        self.required_size
    }
}
