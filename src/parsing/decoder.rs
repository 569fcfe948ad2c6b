use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

use crate::blocks::field_format::{FieldFormat, ScalarFormat};
use crate::error::CrsdError;

/// A decoded parameter field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Int(i64),
    UInt(u64),
    Complex { re: f64, im: f64 },
    String(String),
    Composite(Vec<(String, FieldValue)>),
    /// Text field whose bytes are not valid UTF-8.
    ByteArray(Vec<u8>),
}

impl FieldValue {
    /// Numeric view of scalar values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::UInt(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Look up a member of a composite value by name.
    pub fn member(&self, name: &str) -> Option<&FieldValue> {
        match self {
            FieldValue::Composite(members) => members.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }
}

/// The all-zero value of a format, as a freshly allocated record holds it.
pub fn zero_value(format: &FieldFormat) -> FieldValue {
    match format {
        FieldFormat::Scalar(s) => match s {
            ScalarFormat::F4 | ScalarFormat::F8 => FieldValue::Float(0.0),
            ScalarFormat::I1 | ScalarFormat::I2 | ScalarFormat::I4 | ScalarFormat::I8 => FieldValue::Int(0),
            ScalarFormat::U1 | ScalarFormat::U2 | ScalarFormat::U4 | ScalarFormat::U8 => FieldValue::UInt(0),
            _ => FieldValue::Complex { re: 0.0, im: 0.0 },
        },
        FieldFormat::Text(_) => FieldValue::String(String::new()),
        FieldFormat::Composite(members) => FieldValue::Composite(
            members.iter().map(|(n, f)| (n.clone(), zero_value(f))).collect(),
        ),
    }
}

/// Decodes one field from its bytes.
///
/// `bytes` must be exactly as wide as the format. All numeric values are
/// big-endian; text is NUL padded on the right.
pub fn decode_field(bytes: &[u8], format: &FieldFormat) -> Result<FieldValue, CrsdError> {
    let width = format.width_bytes();
    if bytes.len() < width {
        return Err(CrsdError::TooShortBuffer {
            actual:   bytes.len(),
            expected: width,
            file:     file!(),
            line:     line!(),
        });
    }
    let bytes = &bytes[..width];

    let value = match format {
        FieldFormat::Scalar(scalar) => decode_scalar(bytes, *scalar),
        FieldFormat::Text(_) => {
            let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
            match std::str::from_utf8(&bytes[..end]) {
                Ok(s) => FieldValue::String(s.to_string()),
                Err(_) => FieldValue::ByteArray(bytes.to_vec()),
            }
        }
        FieldFormat::Composite(members) => {
            let mut pos = 0;
            let mut values = Vec::with_capacity(members.len());
            for (name, member) in members {
                let w = member.width_bytes();
                values.push((name.clone(), decode_field(&bytes[pos..pos + w], member)?));
                pos += w;
            }
            FieldValue::Composite(values)
        }
    };
    Ok(value)
}

fn decode_scalar(b: &[u8], scalar: ScalarFormat) -> FieldValue {
    match scalar {
        ScalarFormat::F4 => FieldValue::Float(BigEndian::read_f32(b) as f64),
        ScalarFormat::F8 => FieldValue::Float(BigEndian::read_f64(b)),
        ScalarFormat::I1 => FieldValue::Int(b[0] as i8 as i64),
        ScalarFormat::I2 => FieldValue::Int(BigEndian::read_i16(b) as i64),
        ScalarFormat::I4 => FieldValue::Int(BigEndian::read_i32(b) as i64),
        ScalarFormat::I8 => FieldValue::Int(BigEndian::read_i64(b)),
        ScalarFormat::U1 => FieldValue::UInt(b[0] as u64),
        ScalarFormat::U2 => FieldValue::UInt(BigEndian::read_u16(b) as u64),
        ScalarFormat::U4 => FieldValue::UInt(BigEndian::read_u32(b) as u64),
        ScalarFormat::U8 => FieldValue::UInt(BigEndian::read_u64(b)),
        ScalarFormat::CI2 => FieldValue::Complex { re: b[0] as i8 as f64, im: b[1] as i8 as f64 },
        ScalarFormat::CI4 => FieldValue::Complex {
            re: BigEndian::read_i16(&b[0..2]) as f64,
            im: BigEndian::read_i16(&b[2..4]) as f64,
        },
        ScalarFormat::CI8 => FieldValue::Complex {
            re: BigEndian::read_i32(&b[0..4]) as f64,
            im: BigEndian::read_i32(&b[4..8]) as f64,
        },
        ScalarFormat::CI16 => FieldValue::Complex {
            re: BigEndian::read_i64(&b[0..8]) as f64,
            im: BigEndian::read_i64(&b[8..16]) as f64,
        },
        ScalarFormat::CF8 => FieldValue::Complex {
            re: BigEndian::read_f32(&b[0..4]) as f64,
            im: BigEndian::read_f32(&b[4..8]) as f64,
        },
        ScalarFormat::CF16 => FieldValue::Complex {
            re: BigEndian::read_f64(&b[0..8]),
            im: BigEndian::read_f64(&b[8..16]),
        },
    }
}

/// Encodes one field value, appending exactly `format.width_bytes()` bytes.
///
/// Integers are accepted for either signedness as long as they fit; floats
/// only go into float formats.
pub fn encode_field(
    value: &FieldValue,
    format: &FieldFormat,
    field: &str,
    out: &mut Vec<u8>,
) -> Result<(), CrsdError> {
    let mismatch = || CrsdError::ValueMismatch {
        field: field.to_string(),
        format: format.to_string(),
    };

    match (format, value) {
        (FieldFormat::Scalar(scalar), _) => encode_scalar(value, *scalar, out).ok_or_else(mismatch)?,
        (FieldFormat::Text(n), FieldValue::String(s)) => {
            if s.len() > *n {
                return Err(mismatch());
            }
            out.extend_from_slice(s.as_bytes());
            out.resize(out.len() + n - s.len(), 0);
        }
        (FieldFormat::Text(n), FieldValue::ByteArray(b)) => {
            if b.len() > *n {
                return Err(mismatch());
            }
            out.extend_from_slice(b);
            out.resize(out.len() + n - b.len(), 0);
        }
        (FieldFormat::Composite(members), FieldValue::Composite(values)) => {
            if members.len() != values.len() {
                return Err(mismatch());
            }
            for ((name, member), (value_name, member_value)) in members.iter().zip(values) {
                if name != value_name {
                    return Err(mismatch());
                }
                encode_field(member_value, member, field, out)?;
            }
        }
        _ => return Err(mismatch()),
    }
    Ok(())
}

fn encode_scalar(value: &FieldValue, scalar: ScalarFormat, out: &mut Vec<u8>) -> Option<()> {
    let as_i64 = || match value {
        FieldValue::Int(v) => Some(*v),
        FieldValue::UInt(v) => i64::try_from(*v).ok(),
        _ => None,
    };
    let as_u64 = || match value {
        FieldValue::UInt(v) => Some(*v),
        FieldValue::Int(v) => u64::try_from(*v).ok(),
        _ => None,
    };
    let complex = || match value {
        FieldValue::Complex { re, im } => Some((*re, *im)),
        _ => None,
    };

    // Writes into a Vec cannot fail.
    match scalar {
        ScalarFormat::F4 => match value {
            FieldValue::Float(v) => out.write_f32::<BigEndian>(*v as f32).ok()?,
            _ => return None,
        },
        ScalarFormat::F8 => match value {
            FieldValue::Float(v) => out.write_f64::<BigEndian>(*v).ok()?,
            _ => return None,
        },
        ScalarFormat::I1 => out.write_i8(i8::try_from(as_i64()?).ok()?).ok()?,
        ScalarFormat::I2 => out.write_i16::<BigEndian>(i16::try_from(as_i64()?).ok()?).ok()?,
        ScalarFormat::I4 => out.write_i32::<BigEndian>(i32::try_from(as_i64()?).ok()?).ok()?,
        ScalarFormat::I8 => out.write_i64::<BigEndian>(as_i64()?).ok()?,
        ScalarFormat::U1 => out.write_u8(u8::try_from(as_u64()?).ok()?).ok()?,
        ScalarFormat::U2 => out.write_u16::<BigEndian>(u16::try_from(as_u64()?).ok()?).ok()?,
        ScalarFormat::U4 => out.write_u32::<BigEndian>(u32::try_from(as_u64()?).ok()?).ok()?,
        ScalarFormat::U8 => out.write_u64::<BigEndian>(as_u64()?).ok()?,
        ScalarFormat::CI2 => {
            let (re, im) = complex()?;
            out.write_i8(re as i8).ok()?;
            out.write_i8(im as i8).ok()?;
        }
        ScalarFormat::CI4 => {
            let (re, im) = complex()?;
            out.write_i16::<BigEndian>(re as i16).ok()?;
            out.write_i16::<BigEndian>(im as i16).ok()?;
        }
        ScalarFormat::CI8 => {
            let (re, im) = complex()?;
            out.write_i32::<BigEndian>(re as i32).ok()?;
            out.write_i32::<BigEndian>(im as i32).ok()?;
        }
        ScalarFormat::CI16 => {
            let (re, im) = complex()?;
            out.write_i64::<BigEndian>(re as i64).ok()?;
            out.write_i64::<BigEndian>(im as i64).ok()?;
        }
        ScalarFormat::CF8 => {
            let (re, im) = complex()?;
            out.write_f32::<BigEndian>(re as f32).ok()?;
            out.write_f32::<BigEndian>(im as f32).ok()?;
        }
        ScalarFormat::CF16 => {
            let (re, im) = complex()?;
            out.write_f64::<BigEndian>(re).ok()?;
            out.write_f64::<BigEndian>(im).ok()?;
        }
    }
    Some(())
}
