//! Byte layout of a fixed-size parameter record.
//!
//! A [`FieldLayout`] assigns every field of a PVP or PPP record an offset
//! and a size, both counted in 8-byte words. Fields are either one of the
//! [`FixedField`]s of the record kind or custom parameters added under a
//! caller-chosen name.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::blocks::field_format::FieldFormat;
use crate::blocks::parameters::{FixedField, PppField, PvpField};
use crate::error::CrsdError;

/// Bytes in one layout word.
pub const WORD_SIZE: usize = 8;

pub type PvpLayout = FieldLayout<PvpField>;
pub type PppLayout = FieldLayout<PppField>;

/// Position of a fixed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSlot {
    pub offset_words: usize,
    pub size_words: usize,
}

/// A caller-defined parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomParameter {
    pub offset_words: usize,
    pub size_words: usize,
    pub format: FieldFormat,
}

/// Flat description of one field, as carried by the XML metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub offset_words: usize,
    pub size_words: usize,
    pub format: FieldFormat,
    /// `true` for custom parameters, `false` for fixed fields.
    pub custom: bool,
}

impl FieldDescriptor {
    pub fn offset_bytes(&self) -> usize {
        self.offset_words * WORD_SIZE
    }

    pub fn size_bytes(&self) -> usize {
        self.size_words * WORD_SIZE
    }
}

/// Offsets of the fields in one parameter record.
///
/// [`append`](FieldLayout::append) places a field at the write cursor and
/// advances it, so call order decides the record layout.
/// [`set`](FieldLayout::set) and
/// [`set_custom_parameter`](FieldLayout::set_custom_parameter) place a field
/// at an explicit offset, which is how a layout read from metadata is
/// rebuilt. Explicit placement never overlaps another field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    bound = "F: FixedField",
    try_from = "Vec<FieldDescriptor>",
    into = "Vec<FieldDescriptor>"
)]
pub struct FieldLayout<F: FixedField> {
    fixed: BTreeMap<F, FieldSlot>,
    custom: BTreeMap<String, CustomParameter>,
    cursor_words: usize,
}

impl<F: FixedField> Default for FieldLayout<F> {
    fn default() -> Self {
        Self {
            fixed: BTreeMap::new(),
            custom: BTreeMap::new(),
            cursor_words: 0,
        }
    }
}

impl<F: FixedField> FieldLayout<F> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a fixed field at the write cursor.
    ///
    /// Returns the field's byte offset. Appending a field that is already
    /// registered moves it to the cursor.
    pub fn append(&mut self, field: F) -> usize {
        self.fixed.remove(&field);
        let offset_words = self.cursor_words;
        self.fixed.insert(
            field,
            FieldSlot {
                offset_words,
                size_words: field.size_words(),
            },
        );
        self.cursor_words += field.size_words();
        offset_words * WORD_SIZE
    }

    /// Place a fixed field at an explicit word offset.
    pub fn set(&mut self, field: F, offset_words: usize) -> Result<(), CrsdError> {
        let size_words = field.size_words();
        self.check_overlap(field.name(), offset_words, size_words)?;
        self.fixed.insert(field, FieldSlot { offset_words, size_words });
        self.cursor_words = self.cursor_words.max(offset_words + size_words);
        Ok(())
    }

    /// Add a custom parameter at the write cursor.
    ///
    /// Returns the byte offset. Re-using a name replaces the earlier entry,
    /// which keeps only the newest offset, size and format.
    pub fn append_custom_parameter(
        &mut self,
        size_words: usize,
        format: &str,
        name: &str,
    ) -> Result<usize, CrsdError> {
        let format = self.validate_custom(size_words, format, name)?;
        let offset_words = self.cursor_words;
        self.custom.insert(
            name.to_string(),
            CustomParameter {
                offset_words,
                size_words,
                format,
            },
        );
        self.cursor_words += size_words;
        Ok(offset_words * WORD_SIZE)
    }

    /// Add a custom parameter at an explicit word offset.
    ///
    /// # Errors
    /// [`CrsdError::LayoutInconsistency`] if the range overlaps a different
    /// field, if the format width does not fill `size_words` exactly, or if
    /// the name belongs to a fixed field.
    pub fn set_custom_parameter(
        &mut self,
        size_words: usize,
        offset_words: usize,
        format: &str,
        name: &str,
    ) -> Result<(), CrsdError> {
        let format = self.validate_custom(size_words, format, name)?;
        self.check_overlap(name, offset_words, size_words)?;
        self.custom.insert(
            name.to_string(),
            CustomParameter {
                offset_words,
                size_words,
                format,
            },
        );
        self.cursor_words = self.cursor_words.max(offset_words + size_words);
        Ok(())
    }

    fn validate_custom(&self, size_words: usize, format: &str, name: &str) -> Result<FieldFormat, CrsdError> {
        if name.is_empty() {
            return Err(CrsdError::LayoutInconsistency {
                field: String::new(),
                reason: "custom parameter name is empty".to_string(),
            });
        }
        if F::from_name(name).is_some() {
            return Err(CrsdError::LayoutInconsistency {
                field: name.to_string(),
                reason: "name is reserved for a fixed parameter".to_string(),
            });
        }
        if size_words == 0 {
            return Err(CrsdError::LayoutInconsistency {
                field: name.to_string(),
                reason: "size must be at least one word".to_string(),
            });
        }
        let format: FieldFormat = format.parse().map_err(|e| match e {
            CrsdError::LayoutInconsistency { reason, .. } => CrsdError::LayoutInconsistency {
                field: name.to_string(),
                reason,
            },
            other => other,
        })?;
        format.check_size(name, size_words)?;
        Ok(format)
    }

    fn check_overlap(&self, name: &str, offset_words: usize, size_words: usize) -> Result<(), CrsdError> {
        let end = offset_words + size_words;
        let clash = self
            .entries()
            .find(|(other, off, size, _)| *other != name && offset_words < off + size && *off < end);
        match clash {
            Some((other, off, size, _)) => Err(CrsdError::LayoutInconsistency {
                field: name.to_string(),
                reason: format!(
                    "words {offset_words}..{end} overlap {other:?} at words {off}..{}",
                    off + size
                ),
            }),
            None => Ok(()),
        }
    }

    /// Every registered field as (name, offset words, size words, is custom).
    fn entries(&self) -> impl Iterator<Item = (&str, usize, usize, bool)> + '_ {
        let fixed = self
            .fixed
            .iter()
            .map(|(f, slot)| (f.name(), slot.offset_words, slot.size_words, false));
        let custom = self
            .custom
            .iter()
            .map(|(n, p)| (n.as_str(), p.offset_words, p.size_words, true));
        fixed.chain(custom)
    }

    /// Slot of a fixed field, if it has been placed.
    pub fn slot(&self, field: F) -> Option<FieldSlot> {
        self.fixed.get(&field).copied()
    }

    pub fn custom_parameter(&self, name: &str) -> Option<&CustomParameter> {
        self.custom.get(name)
    }

    pub fn custom_parameters(&self) -> &BTreeMap<String, CustomParameter> {
        &self.custom
    }

    /// Look up any registered field by name.
    pub fn field(&self, name: &str) -> Option<FieldDescriptor> {
        if let Some(field) = F::from_name(name) {
            return self.slot(field).map(|slot| FieldDescriptor {
                name: name.to_string(),
                offset_words: slot.offset_words,
                size_words: slot.size_words,
                format: field.format(),
                custom: false,
            });
        }
        self.custom.get(name).map(|p| FieldDescriptor {
            name: name.to_string(),
            offset_words: p.offset_words,
            size_words: p.size_words,
            format: p.format.clone(),
            custom: true,
        })
    }

    /// All registered fields ordered by offset.
    pub fn descriptors(&self) -> Vec<FieldDescriptor> {
        let mut descriptors: Vec<FieldDescriptor> = self
            .fixed
            .iter()
            .map(|(field, slot)| FieldDescriptor {
                name: field.name().to_string(),
                offset_words: slot.offset_words,
                size_words: slot.size_words,
                format: field.format(),
                custom: false,
            })
            .chain(self.custom.iter().map(|(name, p)| FieldDescriptor {
                name: name.clone(),
                offset_words: p.offset_words,
                size_words: p.size_words,
                format: p.format.clone(),
                custom: true,
            }))
            .collect();
        descriptors.sort_by_key(|d| d.offset_words);
        descriptors
    }

    /// Rebuild a layout from descriptors with explicit placement.
    ///
    /// Fixed descriptors must agree with the field's declared size and
    /// format.
    pub fn from_descriptors(descriptors: &[FieldDescriptor]) -> Result<Self, CrsdError> {
        let mut layout = Self::new();
        for d in descriptors {
            if d.custom {
                layout.set_custom_parameter(d.size_words, d.offset_words, &d.format.to_string(), &d.name)?;
                continue;
            }
            let field = F::from_name(&d.name).ok_or_else(|| CrsdError::LayoutInconsistency {
                field: d.name.clone(),
                reason: "not a fixed parameter of this record kind".to_string(),
            })?;
            if d.size_words != field.size_words() || d.format != field.format() {
                return Err(CrsdError::LayoutInconsistency {
                    field: d.name.clone(),
                    reason: format!(
                        "declared {} words of {} but the parameter is {} words of {}",
                        d.size_words,
                        d.format,
                        field.size_words(),
                        field.format()
                    ),
                });
            }
            layout.set(field, d.offset_words)?;
        }
        Ok(layout)
    }

    pub fn total_size_words(&self) -> usize {
        self.cursor_words
    }

    /// Size of one record in bytes.
    pub fn total_size_bytes(&self) -> usize {
        self.cursor_words * WORD_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.fixed.is_empty() && self.custom.is_empty()
    }
}

impl<F: FixedField> PartialEq for FieldLayout<F> {
    /// Layouts are equal when they place the same fields at the same
    /// offsets, however they were built.
    fn eq(&self, other: &Self) -> bool {
        self.fixed == other.fixed && self.custom == other.custom
    }
}

impl<F: FixedField> Eq for FieldLayout<F> {}

impl<F: FixedField> fmt::Display for FieldLayout<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for d in self.descriptors() {
            writeln!(
                f,
                "{}: offset={}, size={}, format={}",
                d.name, d.offset_words, d.size_words, d.format
            )?;
        }
        Ok(())
    }
}

impl<F: FixedField> From<FieldLayout<F>> for Vec<FieldDescriptor> {
    fn from(layout: FieldLayout<F>) -> Self {
        layout.descriptors()
    }
}

impl<F: FixedField> TryFrom<Vec<FieldDescriptor>> for FieldLayout<F> {
    type Error = CrsdError;

    fn try_from(descriptors: Vec<FieldDescriptor>) -> Result<Self, Self::Error> {
        Self::from_descriptors(&descriptors)
    }
}
