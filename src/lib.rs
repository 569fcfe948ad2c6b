pub mod blocks;
pub mod error;
pub mod index;
pub mod writer;

pub mod parsing {
    pub mod decoder;
    pub mod partition;
    pub mod record_table;
    pub mod source;
}

pub mod api {
    pub mod crsd;
    pub mod metadata;
}
