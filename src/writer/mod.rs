//! CRSD writer module for crsd-rs
//!
//! This module writes the header, XML and binary blocks of a CRSD file at
//! the offsets recorded in its [`FileHeader`](crate::blocks::file_header::FileHeader),
//! zero-padding the gaps between blocks.

pub mod crsd_writer;
pub use crsd_writer::CrsdWriter;
