//! Splitting a block load into disjoint worker assignments.

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::blocks::file_header::BlockLocation;
use crate::error::CrsdError;

/// A named block span, used to bound a load and label its errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRegion {
    pub label: &'static str,
    pub byte_offset: u64,
    pub size: u64,
}

impl BlockRegion {
    pub fn new(label: &'static str, location: BlockLocation) -> Self {
        Self {
            label,
            byte_offset: location.byte_offset,
            size: location.size,
        }
    }
}

/// A contiguous run of records of one channel, handled by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub channel: usize,
    pub first_record: usize,
    pub num_records: usize,
    /// Absolute file offset of the first record.
    pub byte_offset: u64,
}

impl Assignment {
    pub fn byte_len(&self, record_size: usize) -> u64 {
        self.num_records as u64 * record_size as u64
    }
}

/// Bytes taken by `counts` records of `record_size` bytes in `region`.
///
/// Fails with [`CrsdError::TruncatedStream`] when the records would end
/// past a 64-bit offset; the region can never hold them.
pub fn required_bytes(region: &BlockRegion, record_size: usize, counts: &[usize]) -> Result<u64, CrsdError> {
    counts
        .iter()
        .try_fold(0u64, |acc, &n| acc.checked_add(n as u64))
        .and_then(|total| total.checked_mul(record_size as u64))
        .filter(|&needed| region.byte_offset.checked_add(needed).is_some())
        .ok_or(CrsdError::TruncatedStream {
            block: region.label,
            offset: region.byte_offset,
            expected: u64::MAX,
            actual: region.size,
        })
}

/// Plan the reads for a block of fixed-size records.
///
/// Channels are laid out back to back from the start of `region`. The
/// total record count is cut into runs of at most `ceil(total /
/// num_threads)` records, and a run never crosses a channel boundary, so
/// large channels are split across workers and small ones are read whole.
/// The returned assignments are in file order, disjoint, and cover every
/// record exactly once.
///
/// # Errors
/// [`CrsdError::TruncatedStream`] if the records do not fit in `region`.
pub fn plan_partitions(
    region: BlockRegion,
    record_size: usize,
    counts: &[usize],
    num_threads: usize,
) -> Result<Vec<Assignment>, CrsdError> {
    let needed = required_bytes(&region, record_size, counts)?;
    if needed > region.size {
        return Err(CrsdError::TruncatedStream {
            block: region.label,
            offset: region.byte_offset,
            expected: needed,
            actual: region.size,
        });
    }
    let total: u64 = counts.iter().map(|&n| n as u64).sum();
    if total == 0 {
        return Ok(Vec::new());
    }
    let chunk = usize::try_from(total.div_ceil(num_threads.max(1) as u64)).unwrap_or(usize::MAX);

    let mut assignments = Vec::new();
    let mut offset = region.byte_offset;
    for (channel, &count) in counts.iter().enumerate() {
        let mut first = 0;
        while first < count {
            let n = chunk.min(count - first);
            assignments.push(Assignment {
                channel,
                first_record: first,
                num_records: n,
                byte_offset: offset,
            });
            offset += n as u64 * record_size as u64;
            first += n;
        }
    }
    Ok(assignments)
}

/// Build the worker pool used for one load.
pub fn build_pool(num_threads: usize) -> Result<ThreadPool, CrsdError> {
    ThreadPoolBuilder::new()
        .num_threads(num_threads.max(1))
        .thread_name(|i| format!("crsd-load-{i}"))
        .build()
        .map_err(|e| CrsdError::ThreadPool(e.to_string()))
}
