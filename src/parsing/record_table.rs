//! Decoded PVP/PPP blocks.

use rayon::prelude::*;
use tracing::debug;

use crate::blocks::field_format::FieldFormat;
use crate::blocks::field_layout::FieldLayout;
use crate::blocks::parameters::FixedField;
use crate::error::CrsdError;
use crate::parsing::decoder::{FieldValue, decode_field, encode_field, zero_value};
use crate::parsing::partition::{Assignment, build_pool, plan_partitions, required_bytes};
use crate::parsing::source::{ByteRangeReader, ReaderFactory};

pub use crate::parsing::partition::BlockRegion;

#[derive(Debug, Clone, PartialEq)]
struct ResolvedField {
    name: String,
    offset: usize,
    format: FieldFormat,
}

/// One decoded record; values follow the table's field order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    values: Vec<FieldValue>,
}

impl Record {
    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }
}

/// Per-channel sequences of decoded parameter records.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordTable {
    fields: Vec<ResolvedField>,
    record_size: usize,
    channels: Vec<Vec<Record>>,
}

impl RecordTable {
    /// Load a parameter block.
    ///
    /// Channel `c` holds `counts[c]` records of `layout.total_size_bytes()`
    /// bytes each, stored directly after channel `c - 1`. The records are
    /// split into disjoint runs (see [`plan_partitions`]) and decoded on a
    /// pool of `num_threads` workers, each with its own reader from
    /// `source`. The table is returned only once every run has decoded;
    /// the first failing run fails the whole load.
    ///
    /// # Errors
    /// * [`CrsdError::TruncatedStream`] if the records need more bytes than
    ///   the region declares or the source holds.
    /// * [`CrsdError::LayoutInconsistency`] if a field's format disagrees
    ///   with its size.
    pub fn load<S, F>(
        source: &S,
        region: BlockRegion,
        counts: &[usize],
        layout: &FieldLayout<F>,
        num_threads: usize,
    ) -> Result<Self, CrsdError>
    where
        S: ReaderFactory + ?Sized,
        F: FixedField,
    {
        let fields = resolve(layout)?;
        let record_size = layout.total_size_bytes();
        if layout.is_empty() && counts.iter().any(|&n| n > 0) {
            return Err(CrsdError::LayoutInconsistency {
                field: String::new(),
                reason: format!("{} layout has no fields", region.label),
            });
        }

        let needed = required_bytes(&region, record_size, counts)?;
        if needed > region.size {
            return Err(CrsdError::TruncatedStream {
                block: region.label,
                offset: region.byte_offset,
                expected: needed,
                actual: region.size,
            });
        }
        let available = source.len()?.saturating_sub(region.byte_offset);
        if needed > available {
            return Err(CrsdError::TruncatedStream {
                block: region.label,
                offset: region.byte_offset,
                expected: needed,
                actual: available,
            });
        }

        let plan = plan_partitions(region, record_size, counts, num_threads)?;
        debug!(
            block = region.label,
            channels = counts.len(),
            records = counts.iter().sum::<usize>(),
            record_size,
            assignments = plan.len(),
            threads = num_threads,
            "planned parameter block load"
        );

        let mut channels: Vec<Vec<Record>> = counts.iter().map(|&n| vec![Record::default(); n]).collect();

        // Hand each assignment the destination slice it alone writes.
        let mut jobs: Vec<(Assignment, &mut [Record])> = Vec::with_capacity(plan.len());
        let mut pending = plan.iter().copied().peekable();
        for (channel, records) in channels.iter_mut().enumerate() {
            let mut rest: &mut [Record] = records.as_mut_slice();
            while let Some(assignment) = pending.next_if(|a| a.channel == channel) {
                let (head, tail) = std::mem::take(&mut rest).split_at_mut(assignment.num_records);
                rest = tail;
                jobs.push((assignment, head));
            }
        }

        let pool = build_pool(num_threads)?;
        pool.install(|| {
            jobs.into_par_iter()
                .try_for_each(|(assignment, dest)| decode_assignment(source, &fields, record_size, assignment, dest))
        })?;

        Ok(Self {
            fields,
            record_size,
            channels,
        })
    }

    /// A table of zero-valued records, ready to be filled for writing.
    pub fn zeroed<F: FixedField>(layout: &FieldLayout<F>, counts: &[usize]) -> Result<Self, CrsdError> {
        let fields = resolve(layout)?;
        let blank = Record {
            values: fields.iter().map(|f| zero_value(&f.format)).collect(),
        };
        Ok(Self {
            fields,
            record_size: layout.total_size_bytes(),
            channels: counts.iter().map(|&n| vec![blank.clone(); n]).collect(),
        })
    }

    /// Decode a single record laid out per `layout`.
    pub fn decode_record<F: FixedField>(
        layout: &FieldLayout<F>,
        raw: &[u8],
    ) -> Result<Vec<(String, FieldValue)>, CrsdError> {
        let fields = resolve(layout)?;
        let values = decode_values(raw, &fields)?;
        Ok(fields.into_iter().map(|f| f.name).zip(values).collect())
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn num_records(&self, channel: usize) -> Option<usize> {
        self.channels.get(channel).map(Vec::len)
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Field names in offset order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn channel(&self, channel: usize) -> Option<&[Record]> {
        self.channels.get(channel).map(Vec::as_slice)
    }

    pub fn record(&self, channel: usize, index: usize) -> Option<&Record> {
        self.channels.get(channel)?.get(index)
    }

    /// Value of one field of one record.
    pub fn get(&self, channel: usize, index: usize, name: &str) -> Option<&FieldValue> {
        let field = self.field_index(name)?;
        self.record(channel, index)?.values.get(field)
    }

    /// Replace the value of one field; the value must fit the field format.
    pub fn set(&mut self, channel: usize, index: usize, name: &str, value: FieldValue) -> Result<(), CrsdError> {
        let field = self.field_index(name).ok_or_else(|| CrsdError::LayoutInconsistency {
            field: name.to_string(),
            reason: "no such field in this table".to_string(),
        })?;
        let mut scratch = Vec::new();
        encode_field(&value, &self.fields[field].format, name, &mut scratch)?;

        let num_channels = self.channels.len();
        let records = self.channels.get_mut(channel).ok_or(CrsdError::OutOfRange {
            what: "channel",
            index: channel,
            limit: num_channels,
        })?;
        let num_records = records.len();
        let record = records.get_mut(index).ok_or(CrsdError::OutOfRange {
            what: "record",
            index,
            limit: num_records,
        })?;
        record.values[field] = value;
        Ok(())
    }

    /// Encode the table in file order, channel after channel.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CrsdError> {
        let total: usize = self.channels.iter().map(Vec::len).sum();
        let mut out = Vec::with_capacity(total * self.record_size);
        let mut scratch = Vec::new();
        for record in self.channels.iter().flatten() {
            let start = out.len();
            out.resize(start + self.record_size, 0);
            for (field, value) in self.fields.iter().zip(&record.values) {
                scratch.clear();
                encode_field(value, &field.format, &field.name, &mut scratch)?;
                let at = start + field.offset;
                out[at..at + scratch.len()].copy_from_slice(&scratch);
            }
        }
        Ok(out)
    }
}

fn resolve<F: FixedField>(layout: &FieldLayout<F>) -> Result<Vec<ResolvedField>, CrsdError> {
    layout
        .descriptors()
        .into_iter()
        .map(|d| {
            d.format.check_size(&d.name, d.size_words)?;
            Ok(ResolvedField {
                offset: d.offset_bytes(),
                name: d.name,
                format: d.format,
            })
        })
        .collect()
}

fn decode_values(raw: &[u8], fields: &[ResolvedField]) -> Result<Vec<FieldValue>, CrsdError> {
    fields
        .iter()
        .map(|f| {
            let end = f.offset + f.format.width_bytes();
            if end > raw.len() {
                return Err(CrsdError::TooShortBuffer {
                    actual:   raw.len(),
                    expected: end,
                    file:     file!(),
                    line:     line!(),
                });
            }
            decode_field(&raw[f.offset..end], &f.format)
        })
        .collect()
}

fn decode_assignment<S: ReaderFactory + ?Sized>(
    source: &S,
    fields: &[ResolvedField],
    record_size: usize,
    assignment: Assignment,
    dest: &mut [Record],
) -> Result<(), CrsdError> {
    let mut reader = source.open_reader()?;
    let bytes = reader.read_range(assignment.byte_offset, assignment.byte_len(record_size))?;
    for (record, raw) in dest.iter_mut().zip(bytes.chunks_exact(record_size)) {
        record.values = decode_values(raw, fields)?;
    }
    Ok(())
}
