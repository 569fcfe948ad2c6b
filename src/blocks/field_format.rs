//! Element format tags used by parameter fields.
//!
//! Tags are written in the XML metadata as plain text: scalar tags such as
//! `F8` or `U8`, fixed-width strings `S<n>`, and composites such as
//! `X=F8;Y=F8;Z=F8;`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CrsdError;

/// Fixed-width numeric element types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarFormat {
    F4,
    F8,
    I1,
    I2,
    I4,
    I8,
    U1,
    U2,
    U4,
    U8,
    /// Complex with 1-byte signed integer parts.
    CI2,
    CI4,
    CI8,
    CI16,
    /// Complex with 4-byte float parts.
    CF8,
    CF16,
}

impl ScalarFormat {
    const ALL: [ScalarFormat; 16] = [
        ScalarFormat::F4,
        ScalarFormat::F8,
        ScalarFormat::I1,
        ScalarFormat::I2,
        ScalarFormat::I4,
        ScalarFormat::I8,
        ScalarFormat::U1,
        ScalarFormat::U2,
        ScalarFormat::U4,
        ScalarFormat::U8,
        ScalarFormat::CI2,
        ScalarFormat::CI4,
        ScalarFormat::CI8,
        ScalarFormat::CI16,
        ScalarFormat::CF8,
        ScalarFormat::CF16,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            ScalarFormat::F4 => "F4",
            ScalarFormat::F8 => "F8",
            ScalarFormat::I1 => "I1",
            ScalarFormat::I2 => "I2",
            ScalarFormat::I4 => "I4",
            ScalarFormat::I8 => "I8",
            ScalarFormat::U1 => "U1",
            ScalarFormat::U2 => "U2",
            ScalarFormat::U4 => "U4",
            ScalarFormat::U8 => "U8",
            ScalarFormat::CI2 => "CI2",
            ScalarFormat::CI4 => "CI4",
            ScalarFormat::CI8 => "CI8",
            ScalarFormat::CI16 => "CI16",
            ScalarFormat::CF8 => "CF8",
            ScalarFormat::CF16 => "CF16",
        }
    }

    pub fn width_bytes(self) -> usize {
        match self {
            ScalarFormat::I1 | ScalarFormat::U1 => 1,
            ScalarFormat::I2 | ScalarFormat::U2 | ScalarFormat::CI2 => 2,
            ScalarFormat::F4 | ScalarFormat::I4 | ScalarFormat::U4 | ScalarFormat::CI4 => 4,
            ScalarFormat::F8 | ScalarFormat::I8 | ScalarFormat::U8 | ScalarFormat::CI8 | ScalarFormat::CF8 => 8,
            ScalarFormat::CI16 | ScalarFormat::CF16 => 16,
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.tag() == tag)
    }
}

/// Format of one parameter field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldFormat {
    Scalar(ScalarFormat),
    /// Fixed-width text of `n` bytes, NUL padded.
    Text(usize),
    /// Named members packed back to back, e.g. `X=F8;Y=F8;Z=F8;`.
    Composite(Vec<(String, FieldFormat)>),
}

impl FieldFormat {
    /// `X=F8;Y=F8;Z=F8;`, used for positions, velocities and unit vectors.
    pub fn xyz() -> Self {
        Self::composite(&["X", "Y", "Z"], ScalarFormat::F8)
    }

    /// `Int=I8;Frac=F8;`, a time or phase split into whole and fractional parts.
    pub fn int_frac() -> Self {
        FieldFormat::Composite(vec![
            ("Int".to_string(), FieldFormat::Scalar(ScalarFormat::I8)),
            ("Frac".to_string(), FieldFormat::Scalar(ScalarFormat::F8)),
        ])
    }

    /// `DCX=F8;DCY=F8;`, electrical boresight direction cosines.
    pub fn dcx_dcy() -> Self {
        Self::composite(&["DCX", "DCY"], ScalarFormat::F8)
    }

    fn composite(names: &[&str], member: ScalarFormat) -> Self {
        FieldFormat::Composite(
            names
                .iter()
                .map(|n| (n.to_string(), FieldFormat::Scalar(member)))
                .collect(),
        )
    }

    /// Number of bytes an element of this format occupies.
    pub fn width_bytes(&self) -> usize {
        match self {
            FieldFormat::Scalar(s) => s.width_bytes(),
            FieldFormat::Text(n) => *n,
            FieldFormat::Composite(members) => members.iter().map(|(_, f)| f.width_bytes()).sum(),
        }
    }

    /// Fail unless the format fills exactly `size_words` 8-byte words.
    pub fn check_size(&self, field: &str, size_words: usize) -> Result<(), CrsdError> {
        let width = self.width_bytes();
        if width != size_words * 8 {
            return Err(CrsdError::LayoutInconsistency {
                field: field.to_string(),
                reason: format!(
                    "format {self} is {width} bytes but the field declares {size_words} words ({} bytes)",
                    size_words * 8
                ),
            });
        }
        Ok(())
    }

    fn parse_element(tag: &str) -> Result<Self, CrsdError> {
        if let Some(scalar) = ScalarFormat::from_tag(tag) {
            return Ok(FieldFormat::Scalar(scalar));
        }
        if let Some(width) = tag.strip_prefix('S') {
            if let Ok(n) = width.parse::<usize>() {
                if n > 0 {
                    return Ok(FieldFormat::Text(n));
                }
            }
        }
        Err(CrsdError::LayoutInconsistency {
            field: String::new(),
            reason: format!("unrecognized format tag {tag:?}"),
        })
    }
}

impl FromStr for FieldFormat {
    type Err = CrsdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if !s.contains('=') {
            return Self::parse_element(s);
        }

        let mut members = Vec::new();
        for part in s.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, tag) = part.split_once('=').ok_or_else(|| CrsdError::LayoutInconsistency {
                field: String::new(),
                reason: format!("composite member {part:?} in {s:?} has no '='"),
            })?;
            let name = name.trim();
            if name.is_empty() || members.iter().any(|(n, _): &(String, FieldFormat)| n == name) {
                return Err(CrsdError::LayoutInconsistency {
                    field: String::new(),
                    reason: format!("composite {s:?} has an empty or repeated member name"),
                });
            }
            members.push((name.to_string(), Self::parse_element(tag.trim())?));
        }
        if members.is_empty() {
            return Err(CrsdError::LayoutInconsistency {
                field: String::new(),
                reason: format!("composite {s:?} has no members"),
            });
        }
        Ok(FieldFormat::Composite(members))
    }
}

impl fmt::Display for FieldFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldFormat::Scalar(s) => f.write_str(s.tag()),
            FieldFormat::Text(n) => write!(f, "S{n}"),
            FieldFormat::Composite(members) => {
                for (name, member) in members {
                    write!(f, "{name}={member};")?;
                }
                Ok(())
            }
        }
    }
}

impl Serialize for FieldFormat {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FieldFormat {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        tag.parse().map_err(serde::de::Error::custom)
    }
}
