#![allow(dead_code)]

use std::path::{Path, PathBuf};

use crsd_rs::api::metadata::MetadataSummary;
use crsd_rs::blocks::addressing::{ChannelShape, SupportArrayShape};
use crsd_rs::blocks::field_layout::{PppLayout, PvpLayout};
use crsd_rs::blocks::file_header::{CrsdType, FileHeader};
use crsd_rs::blocks::parameters::{PppField, PvpField};
use crsd_rs::error::CrsdError;
use crsd_rs::parsing::decoder::FieldValue;
use crsd_rs::parsing::record_table::RecordTable;
use crsd_rs::writer::CrsdWriter;

pub fn pvp_layout() -> Result<PvpLayout, CrsdError> {
    let mut layout = PvpLayout::new();
    layout.append(PvpField::RcvStart);
    layout.append(PvpField::RcvPos);
    layout.append(PvpField::Signal);
    layout.append_custom_parameter(1, "F8", "Gain")?;
    layout.append_custom_parameter(1, "S8", "Label")?;
    Ok(layout)
}

pub fn ppp_layout() -> Result<PppLayout, CrsdError> {
    let mut layout = PppLayout::new();
    layout.append(PppField::TxTime);
    layout.append(PppField::TxPos);
    layout.append(PppField::Fx1);
    layout.append_custom_parameter(1, "I8", "Code")?;
    Ok(layout)
}

pub fn sample_metadata(compressed: bool) -> Result<MetadataSummary, CrsdError> {
    let mut channels = vec![ChannelShape::new(3, 8), ChannelShape::new(5, 4)];
    if compressed {
        channels[0].compressed_size = Some(50);
        channels[1].compressed_size = Some(30);
    }
    Ok(MetadataSummary {
        bytes_per_sample: 4,
        channels,
        tx_sequences: vec![4, 2],
        pvp: Some(pvp_layout()?),
        ppp: Some(ppp_layout()?),
        support_arrays: vec![
            SupportArrayShape {
                id: "GAIN".to_string(),
                num_rows: 2,
                num_cols: 3,
                bytes_per_element: 8,
                array_byte_offset: 0,
            },
            SupportArrayShape {
                id: "NOISE".to_string(),
                num_rows: 4,
                num_cols: 1,
                bytes_per_element: 4,
                array_byte_offset: 48,
            },
        ],
    })
}

pub fn xyz(x: f64, y: f64, z: f64) -> FieldValue {
    FieldValue::Composite(vec![
        ("X".to_string(), FieldValue::Float(x)),
        ("Y".to_string(), FieldValue::Float(y)),
        ("Z".to_string(), FieldValue::Float(z)),
    ])
}

pub fn int_frac(int: i64, frac: f64) -> FieldValue {
    FieldValue::Composite(vec![
        ("Int".to_string(), FieldValue::Int(int)),
        ("Frac".to_string(), FieldValue::Float(frac)),
    ])
}

pub fn pvp_table(metadata: &MetadataSummary) -> Result<RecordTable, CrsdError> {
    let layout = metadata.pvp.as_ref().ok_or_else(|| CrsdError::Metadata("no PVP layout".into()))?;
    let counts = metadata.vector_counts();
    let mut table = RecordTable::zeroed(layout, &counts)?;
    for (c, &n) in counts.iter().enumerate() {
        for i in 0..n {
            let (cf, fi) = (c as f64, i as f64);
            table.set(c, i, "RcvStart", int_frac(i as i64, 0.25 * cf))?;
            table.set(c, i, "RcvPos", xyz(1000.0 + fi, -2.5 * cf, 7.0e6))?;
            table.set(c, i, "SIGNAL", FieldValue::Int(1))?;
            table.set(c, i, "Gain", FieldValue::Float(cf * 100.0 + fi))?;
            table.set(c, i, "Label", FieldValue::String(format!("c{c}v{i}")))?;
        }
    }
    Ok(table)
}

pub fn ppp_table(metadata: &MetadataSummary) -> Result<RecordTable, CrsdError> {
    let layout = metadata.ppp.as_ref().ok_or_else(|| CrsdError::Metadata("no PPP layout".into()))?;
    let counts = metadata.tx_sequences.clone();
    let mut table = RecordTable::zeroed(layout, &counts)?;
    for (s, &n) in counts.iter().enumerate() {
        for p in 0..n {
            table.set(s, p, "TxTime", int_frac(p as i64, 0.5))?;
            table.set(s, p, "TxPos", xyz(s as f64, p as f64, 1.0))?;
            table.set(s, p, "FX1", FieldValue::Float(9.6e9))?;
            table.set(s, p, "Code", FieldValue::Int(-(p as i64)))?;
        }
    }
    Ok(table)
}

pub fn signal_bytes(metadata: &MetadataSummary) -> Vec<u8> {
    let size: u64 = metadata
        .channels
        .iter()
        .map(|c| {
            c.compressed_size
                .unwrap_or((c.num_vectors * c.num_samples * metadata.bytes_per_sample) as u64)
        })
        .sum();
    (0..size).map(|i| (i % 251) as u8).collect()
}

pub fn support_bytes() -> Vec<u8> {
    (0..64u8).collect()
}

/// The XML block stand-in: the metadata summary as JSON.
pub fn json_mapper(xml: &[u8], _schemas: &[PathBuf]) -> Result<MetadataSummary, CrsdError> {
    serde_json::from_slice(xml).map_err(|e| CrsdError::Metadata(e.to_string()))
}

/// Write a complete file for `crsd_type` and return its header.
pub fn write_sample_file(
    path: &Path,
    crsd_type: CrsdType,
    metadata: &MetadataSummary,
) -> Result<FileHeader, CrsdError> {
    let xml = serde_json::to_vec(metadata).map_err(|e| CrsdError::Serialization(e.to_string()))?;
    let support = support_bytes();
    let ppp = if crsd_type.has_ppp() { Some(ppp_table(metadata)?) } else { None };
    let pvp = if crsd_type.has_receive() { Some(pvp_table(metadata)?) } else { None };
    let size_of = |table: &Option<RecordTable>| -> Result<u64, CrsdError> {
        Ok(match table {
            Some(t) => t.to_bytes()?.len() as u64,
            None => 0,
        })
    };
    let signal = if crsd_type.has_receive() { signal_bytes(metadata) } else { Vec::new() };

    let mut header = FileHeader::new(crsd_type, "1.0.0", "UNCLASSIFIED", "UNRESTRICTED");
    header.set_block_sizes(
        xml.len() as u64,
        support.len() as u64,
        size_of(&ppp)?,
        size_of(&pvp)?,
        signal.len() as u64,
    )?;

    let mut writer = CrsdWriter::new(path.to_str().unwrap(), header.clone())?;
    writer.write_xml(&xml)?;
    writer.write_support(&support)?;
    if let Some(ppp) = &ppp {
        writer.write_ppp(ppp)?;
    }
    if let Some(pvp) = &pvp {
        writer.write_pvp(pvp)?;
        writer.write_signal(&signal)?;
    }
    writer.finalize()?;
    Ok(header)
}
