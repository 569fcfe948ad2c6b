//! Fixed per-vector (PVP) and per-pulse (PPP) parameters.

use std::fmt::Debug;
use std::hash::Hash;

use crate::blocks::field_format::{FieldFormat, ScalarFormat};

/// A parameter every layout of a given kind knows by name.
pub trait FixedField: Copy + Eq + Ord + Hash + Debug + Send + Sync + 'static {
    /// Every field of this kind, in declaration order.
    const ALL: &'static [Self];

    /// Name used in the XML metadata.
    fn name(self) -> &'static str;

    /// Size in 8-byte words.
    fn size_words(self) -> usize;

    fn format(self) -> FieldFormat;

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }
}

const F8: FieldFormat = FieldFormat::Scalar(ScalarFormat::F8);
const I8: FieldFormat = FieldFormat::Scalar(ScalarFormat::I8);

/// Per-vector receive parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PvpField {
    RcvStart,
    RcvPos,
    RcvVel,
    Frcv1,
    Frcv2,
    RefPhi0,
    RefFreq,
    Dfic0,
    FicRate,
    RcvAcx,
    RcvAcy,
    RcvEb,
    Signal,
    AmpSf,
    Dgrgc,
    TxPulseIndex,
}

impl FixedField for PvpField {
    const ALL: &'static [Self] = &[
        PvpField::RcvStart,
        PvpField::RcvPos,
        PvpField::RcvVel,
        PvpField::Frcv1,
        PvpField::Frcv2,
        PvpField::RefPhi0,
        PvpField::RefFreq,
        PvpField::Dfic0,
        PvpField::FicRate,
        PvpField::RcvAcx,
        PvpField::RcvAcy,
        PvpField::RcvEb,
        PvpField::Signal,
        PvpField::AmpSf,
        PvpField::Dgrgc,
        PvpField::TxPulseIndex,
    ];

    fn name(self) -> &'static str {
        match self {
            PvpField::RcvStart => "RcvStart",
            PvpField::RcvPos => "RcvPos",
            PvpField::RcvVel => "RcvVel",
            PvpField::Frcv1 => "FRCV1",
            PvpField::Frcv2 => "FRCV2",
            PvpField::RefPhi0 => "RefPhi0",
            PvpField::RefFreq => "RefFreq",
            PvpField::Dfic0 => "DFIC0",
            PvpField::FicRate => "FICRate",
            PvpField::RcvAcx => "RcvACX",
            PvpField::RcvAcy => "RcvACY",
            PvpField::RcvEb => "RcvEB",
            PvpField::Signal => "SIGNAL",
            PvpField::AmpSf => "AmpSF",
            PvpField::Dgrgc => "DGRGC",
            PvpField::TxPulseIndex => "TxPulseIndex",
        }
    }

    fn size_words(self) -> usize {
        match self {
            PvpField::RcvPos | PvpField::RcvVel | PvpField::RcvAcx | PvpField::RcvAcy => 3,
            PvpField::RcvStart | PvpField::RefPhi0 | PvpField::RcvEb => 2,
            _ => 1,
        }
    }

    fn format(self) -> FieldFormat {
        match self {
            PvpField::RcvPos | PvpField::RcvVel | PvpField::RcvAcx | PvpField::RcvAcy => FieldFormat::xyz(),
            PvpField::RcvStart | PvpField::RefPhi0 => FieldFormat::int_frac(),
            PvpField::RcvEb => FieldFormat::dcx_dcy(),
            PvpField::Signal | PvpField::TxPulseIndex => I8,
            _ => F8,
        }
    }
}

/// Per-pulse transmit parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PppField {
    TxTime,
    TxPos,
    TxVel,
    Fx1,
    Fx2,
    TxMt,
    PhiX0,
    FxFreq0,
    FxRate,
    TxRadInt,
    TxAcx,
    TxAcy,
    TxEb,
    FxResponseIndex,
    XmIndex,
}

impl FixedField for PppField {
    const ALL: &'static [Self] = &[
        PppField::TxTime,
        PppField::TxPos,
        PppField::TxVel,
        PppField::Fx1,
        PppField::Fx2,
        PppField::TxMt,
        PppField::PhiX0,
        PppField::FxFreq0,
        PppField::FxRate,
        PppField::TxRadInt,
        PppField::TxAcx,
        PppField::TxAcy,
        PppField::TxEb,
        PppField::FxResponseIndex,
        PppField::XmIndex,
    ];

    fn name(self) -> &'static str {
        match self {
            PppField::TxTime => "TxTime",
            PppField::TxPos => "TxPos",
            PppField::TxVel => "TxVel",
            PppField::Fx1 => "FX1",
            PppField::Fx2 => "FX2",
            PppField::TxMt => "TXmt",
            PppField::PhiX0 => "PhiX0",
            PppField::FxFreq0 => "FxFreq0",
            PppField::FxRate => "FxRate",
            PppField::TxRadInt => "TxRadInt",
            PppField::TxAcx => "TxACX",
            PppField::TxAcy => "TxACY",
            PppField::TxEb => "TxEB",
            PppField::FxResponseIndex => "FxResponseIndex",
            PppField::XmIndex => "XMIndex",
        }
    }

    fn size_words(self) -> usize {
        match self {
            PppField::TxPos | PppField::TxVel | PppField::TxAcx | PppField::TxAcy => 3,
            PppField::TxTime | PppField::PhiX0 | PppField::TxEb => 2,
            _ => 1,
        }
    }

    fn format(self) -> FieldFormat {
        match self {
            PppField::TxPos | PppField::TxVel | PppField::TxAcx | PppField::TxAcy => FieldFormat::xyz(),
            PppField::TxTime | PppField::PhiX0 => FieldFormat::int_frac(),
            PppField::TxEb => FieldFormat::dcx_dcy(),
            PppField::FxResponseIndex | PppField::XmIndex => I8,
            _ => F8,
        }
    }
}
