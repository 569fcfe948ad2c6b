//! The slice of the XML metadata the container core depends on.
//!
//! Mapping the XML document onto a full metadata model happens outside this
//! crate. A [`MetadataMapper`] turns the raw XML block into any type that
//! implements [`Metadata`], which exposes just the shape facts needed to
//! size the parameter blocks and address the signal and support blocks.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::blocks::addressing::{ChannelShape, SupportArrayShape};
use crate::blocks::field_layout::{PppLayout, PvpLayout};
use crate::error::CrsdError;

/// Shape facts read from the XML metadata.
///
/// Uncompressed products only need the counts; the compression methods
/// default to "not compressed".
pub trait Metadata {
    fn num_channels(&self) -> usize;

    fn num_vectors(&self, channel: usize) -> usize;

    fn num_samples(&self, channel: usize) -> usize;

    /// Bytes in one complex signal sample.
    fn num_bytes_per_sample(&self) -> usize;

    /// Size of a channel's compressed signal, if the product is compressed.
    fn compressed_signal_size(&self, _channel: usize) -> Option<u64> {
        None
    }

    fn is_compressed(&self) -> bool {
        false
    }

    /// Number of transmit sequences, each with its own run of PPP records.
    fn num_tx_sequences(&self) -> usize {
        0
    }

    fn num_pulses(&self, _sequence: usize) -> usize {
        0
    }

    fn pvp_layout(&self) -> Option<&PvpLayout> {
        None
    }

    fn ppp_layout(&self) -> Option<&PppLayout> {
        None
    }

    fn support_arrays(&self) -> &[SupportArrayShape] {
        &[]
    }

    /// Signal shape of one channel.
    fn channel_shape(&self, channel: usize) -> ChannelShape {
        ChannelShape {
            num_vectors: self.num_vectors(channel),
            num_samples: self.num_samples(channel),
            compressed_size: if self.is_compressed() {
                self.compressed_signal_size(channel)
            } else {
                None
            },
        }
    }
}

/// Turns the raw XML block into [`Metadata`].
pub trait MetadataMapper {
    type Output: Metadata;

    fn map(&self, xml: &[u8], schema_paths: &[PathBuf]) -> Result<Self::Output, CrsdError>;
}

impl<M, F> MetadataMapper for F
where
    M: Metadata,
    F: Fn(&[u8], &[PathBuf]) -> Result<M, CrsdError>,
{
    type Output = M;

    fn map(&self, xml: &[u8], schema_paths: &[PathBuf]) -> Result<M, CrsdError> {
        self(xml, schema_paths)
    }
}

/// A self-contained copy of the shape facts.
///
/// Used by the JSON index, and handy for mappers that only need to fill in
/// counts and layouts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataSummary {
    pub bytes_per_sample: usize,
    pub channels: Vec<ChannelShape>,
    /// Pulse count of each transmit sequence.
    pub tx_sequences: Vec<usize>,
    pub pvp: Option<PvpLayout>,
    pub ppp: Option<PppLayout>,
    pub support_arrays: Vec<SupportArrayShape>,
}

impl MetadataSummary {
    /// Capture the shape facts of any metadata value.
    pub fn from_metadata<M: Metadata + ?Sized>(metadata: &M) -> Self {
        Self {
            bytes_per_sample: metadata.num_bytes_per_sample(),
            channels: (0..metadata.num_channels()).map(|c| metadata.channel_shape(c)).collect(),
            tx_sequences: (0..metadata.num_tx_sequences()).map(|s| metadata.num_pulses(s)).collect(),
            pvp: metadata.pvp_layout().cloned(),
            ppp: metadata.ppp_layout().cloned(),
            support_arrays: metadata.support_arrays().to_vec(),
        }
    }

    /// Per-channel vector counts.
    pub fn vector_counts(&self) -> Vec<usize> {
        self.channels.iter().map(|c| c.num_vectors).collect()
    }
}

impl Metadata for MetadataSummary {
    fn num_channels(&self) -> usize {
        self.channels.len()
    }

    fn num_vectors(&self, channel: usize) -> usize {
        self.channels.get(channel).map_or(0, |c| c.num_vectors)
    }

    fn num_samples(&self, channel: usize) -> usize {
        self.channels.get(channel).map_or(0, |c| c.num_samples)
    }

    fn num_bytes_per_sample(&self) -> usize {
        self.bytes_per_sample
    }

    fn compressed_signal_size(&self, channel: usize) -> Option<u64> {
        self.channels.get(channel).and_then(|c| c.compressed_size)
    }

    fn is_compressed(&self) -> bool {
        self.channels.iter().any(|c| c.compressed_size.is_some())
    }

    fn num_tx_sequences(&self) -> usize {
        self.tx_sequences.len()
    }

    fn num_pulses(&self, sequence: usize) -> usize {
        self.tx_sequences.get(sequence).copied().unwrap_or(0)
    }

    fn pvp_layout(&self) -> Option<&PvpLayout> {
        self.pvp.as_ref()
    }

    fn ppp_layout(&self) -> Option<&PppLayout> {
        self.ppp.as_ref()
    }

    fn support_arrays(&self) -> &[SupportArrayShape] {
        &self.support_arrays
    }
}
