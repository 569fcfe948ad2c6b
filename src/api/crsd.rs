use std::fs::File;
use std::ops::Range;
use std::path::PathBuf;

use memmap2::Mmap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::api::metadata::{Metadata, MetadataMapper};
use crate::blocks::addressing::{SignalAddressing, SupportAddressing};
use crate::blocks::file_header::{BlockLocation, DEFAULT_HEADER_BLOCK_SIZE, FileHeader};
use crate::error::CrsdError;
use crate::parsing::partition::build_pool;
use crate::parsing::record_table::{BlockRegion, RecordTable};
use crate::parsing::source::SliceSource;

/// Tunables for opening a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    /// Workers used for parameter and signal loads; at least 1.
    pub num_threads: usize,
    /// Chunk size used while scanning the header for its terminator.
    pub header_block_size: usize,
    /// Schemas handed to the metadata mapper for XML validation.
    pub schema_paths: Vec<PathBuf>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            num_threads: std::thread::available_parallelism().map_or(1, |n| n.get()),
            header_block_size: DEFAULT_HEADER_BLOCK_SIZE,
            schema_paths: Vec::new(),
        }
    }
}

impl ReaderOptions {
    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads.max(1);
        self
    }

    pub fn with_header_block_size(mut self, block_size: usize) -> Self {
        self.header_block_size = block_size.max(1);
        self
    }

    pub fn with_schema(mut self, path: impl Into<PathBuf>) -> Self {
        self.schema_paths.push(path.into());
        self
    }
}

/// An opened CRSD file.
///
/// The file stays memory mapped for the lifetime of the reader. Parameter
/// blocks are decoded eagerly on open; signal and support bytes are sliced
/// from the map on request.
#[derive(Debug)]
pub struct CrsdReader<M: Metadata> {
    header: FileHeader,
    metadata: M,
    ppp: Option<RecordTable>,
    pvp: Option<RecordTable>,
    signal: Option<SignalAddressing>,
    support: SupportAddressing,
    num_threads: usize,
    mmap: Mmap,
}

impl<M: Metadata> CrsdReader<M> {
    /// Open a CRSD file.
    ///
    /// # Arguments
    /// * `path` - Path to the `.crsd` file on disk.
    /// * `mapper` - Turns the XML block into [`Metadata`].
    /// * `options` - Thread count, header chunk size and schema paths.
    ///
    /// # Returns
    /// The reader with its PPP and PVP tables loaded, or the first error
    /// met while reading the header, mapping metadata or loading a block.
    pub fn open<P>(path: &str, mapper: &P, options: ReaderOptions) -> Result<Self, CrsdError>
    where
        P: MetadataMapper<Output = M>,
    {
        let num_threads = options.num_threads.max(1);
        let mut file = File::open(path)?;
        let header = FileHeader::read(&mut file, options.header_block_size)?;
        let mmap = unsafe { Mmap::map(&file)? };
        let file_len = mmap.len() as u64;

        // Every declared block must lie inside the file.
        let declared = [
            ("XML", Some(header.xml)),
            ("support", header.support),
            ("PPP", header.ppp),
            ("PVP", header.pvp),
            ("signal", header.signal),
        ];
        for (label, block) in declared {
            if let Some(block) = block {
                check_in_file(label, block, file_len)?;
            }
        }

        let xml = slice(&mmap, "XML", header.xml)?;
        let metadata = mapper.map(xml, &options.schema_paths)?;
        info!(
            path,
            crsd_type = %header.crsd_type,
            channels = metadata.num_channels(),
            tx_sequences = metadata.num_tx_sequences(),
            "mapped CRSD metadata"
        );

        let source = SliceSource::new(&mmap);

        let ppp = match header.ppp {
            Some(block) => {
                let layout = metadata
                    .ppp_layout()
                    .ok_or_else(|| CrsdError::Metadata("header declares a PPP block but metadata has no PPP layout".into()))?;
                let counts: Vec<usize> = (0..metadata.num_tx_sequences()).map(|s| metadata.num_pulses(s)).collect();
                let table = RecordTable::load(&source, BlockRegion::new("PPP", block), &counts, layout, num_threads)?;
                debug!(records = counts.iter().sum::<usize>(), "loaded PPP block");
                Some(table)
            }
            None => None,
        };

        let pvp = match header.pvp {
            Some(block) => {
                let layout = metadata
                    .pvp_layout()
                    .ok_or_else(|| CrsdError::Metadata("header declares a PVP block but metadata has no PVP layout".into()))?;
                let counts: Vec<usize> = (0..metadata.num_channels()).map(|c| metadata.num_vectors(c)).collect();
                let table = RecordTable::load(&source, BlockRegion::new("PVP", block), &counts, layout, num_threads)?;
                debug!(records = counts.iter().sum::<usize>(), "loaded PVP block");
                Some(table)
            }
            None => None,
        };

        let signal = match header.signal {
            Some(block) => {
                let shapes = (0..metadata.num_channels()).map(|c| metadata.channel_shape(c)).collect();
                let addressing = SignalAddressing::new(block.byte_offset, metadata.num_bytes_per_sample(), shapes)?;
                if addressing.block_size() > block.size {
                    return Err(CrsdError::Metadata(format!(
                        "signal channels need {} bytes but SIGNAL_BLOCK_SIZE is {}",
                        addressing.block_size(),
                        block.size
                    )));
                }
                Some(addressing)
            }
            None => None,
        };

        let support_block = header.support.unwrap_or_default();
        let support = SupportAddressing::new(support_block.byte_offset, metadata.support_arrays().to_vec())?;
        if support.required_size() > support_block.size {
            return Err(CrsdError::Metadata(format!(
                "support arrays need {} bytes but SUPPORT_BLOCK_SIZE is {}",
                support.required_size(),
                support_block.size
            )));
        }

        Ok(Self {
            header,
            metadata,
            ppp,
            pvp,
            signal,
            support,
            num_threads,
            mmap,
        })
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn metadata(&self) -> &M {
        &self.metadata
    }

    /// Per-pulse parameters, for products that transmit.
    pub fn ppp(&self) -> Option<&RecordTable> {
        self.ppp.as_ref()
    }

    /// Per-vector parameters, for products that receive.
    pub fn pvp(&self) -> Option<&RecordTable> {
        self.pvp.as_ref()
    }

    pub fn signal_addressing(&self) -> Option<&SignalAddressing> {
        self.signal.as_ref()
    }

    pub fn support_addressing(&self) -> &SupportAddressing {
        &self.support
    }

    /// Size of the opened file in bytes.
    pub fn file_size(&self) -> u64 {
        self.mmap.len() as u64
    }

    /// The raw XML block.
    pub fn xml(&self) -> &[u8] {
        // Checked against the file length on open.
        slice(&self.mmap, "XML", self.header.xml).unwrap_or_default()
    }

    fn signal_or_err(&self) -> Result<&SignalAddressing, CrsdError> {
        self.signal
            .as_ref()
            .ok_or_else(|| CrsdError::Metadata(format!("{} files carry no signal block", self.header.crsd_type)))
    }

    /// Byte span of a vector range of one uncompressed channel.
    fn vector_span(&self, channel: usize, vectors: &Range<usize>) -> Result<(u64, u64), CrsdError> {
        let signal = self.signal_or_err()?;
        let shape = *signal.shape(channel)?;
        if vectors.start > vectors.end || vectors.end > shape.num_vectors {
            return Err(CrsdError::OutOfRange {
                what: "vector",
                index: vectors.end,
                limit: shape.num_vectors,
            });
        }
        let vector_size = signal.vector_size(channel)?;
        let too_large = || {
            CrsdError::Metadata(format!("vectors {vectors:?} of channel {channel} exceed the addressable range"))
        };
        let base = signal.channel_offset(channel)?;
        let start = (vectors.start as u64)
            .checked_mul(vector_size)
            .and_then(|skip| base.checked_add(skip))
            .ok_or_else(too_large)?;
        let len = (vectors.len() as u64).checked_mul(vector_size).ok_or_else(too_large)?;
        Ok((start, len))
    }

    /// Raw samples of `vectors` in one uncompressed channel.
    pub fn read_signal(&self, channel: usize, vectors: Range<usize>) -> Result<&[u8], CrsdError> {
        let (start, len) = self.vector_span(channel, &vectors)?;
        slice(&self.mmap, "signal", BlockLocation::new(len, start))
    }

    /// Copy `vectors` of one uncompressed channel into an owned buffer,
    /// splitting the copy across the reader's worker pool.
    pub fn read_signal_parallel(&self, channel: usize, vectors: Range<usize>) -> Result<Vec<u8>, CrsdError> {
        let (start, len) = self.vector_span(channel, &vectors)?;
        let vector_size = self.signal_or_err()?.vector_size(channel)? as usize;
        let src = slice(&self.mmap, "signal", BlockLocation::new(len, start))?;
        let mut out = vec![0u8; src.len()];
        if out.is_empty() || vector_size == 0 {
            return Ok(out);
        }

        let per_worker = vectors.len().div_ceil(self.num_threads) * vector_size;
        let pool = build_pool(self.num_threads)?;
        pool.install(|| {
            out.par_chunks_mut(per_worker)
                .zip(src.par_chunks(per_worker))
                .for_each(|(dst, src)| dst.copy_from_slice(src));
        });
        Ok(out)
    }

    /// The whole compressed signal of one channel.
    pub fn read_compressed_signal(&self, channel: usize) -> Result<&[u8], CrsdError> {
        let signal = self.signal_or_err()?;
        if !signal.is_compressed(channel)? {
            return Err(CrsdError::Metadata(format!("channel {channel} is not compressed")));
        }
        let start = signal.channel_offset(channel)?;
        let size = signal.channel_size(channel)?;
        slice(&self.mmap, "signal", BlockLocation::new(size, start))
    }

    /// Bytes of one support array.
    pub fn read_support_array(&self, id: &str) -> Result<&[u8], CrsdError> {
        let (start, size) = self.support.array_range(id)?;
        slice(&self.mmap, "support", BlockLocation::new(size, start))
    }
}

fn check_in_file(label: &'static str, block: BlockLocation, file_len: u64) -> Result<(), CrsdError> {
    if block.end()? > file_len {
        return Err(CrsdError::TruncatedStream {
            block: label,
            offset: block.byte_offset,
            expected: block.size,
            actual: file_len.saturating_sub(block.byte_offset),
        });
    }
    Ok(())
}

fn slice<'a>(mmap: &'a Mmap, label: &'static str, block: BlockLocation) -> Result<&'a [u8], CrsdError> {
    check_in_file(label, block, mmap.len() as u64)?;
    Ok(&mmap[block.byte_offset as usize..block.end()? as usize])
}
