// src/blocks/mod.rs
pub mod addressing;
pub mod field_format;
pub mod field_layout;
pub mod file_header;
pub mod parameters;
