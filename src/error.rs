use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrsdError {
    #[error("Buffer too small at {file}:{line}: need at least {expected} bytes, got {actual}")]
    TooShortBuffer {
        actual:   usize,
        expected: usize,
        file:     &'static str,
        line:     u32,
    },

    #[error(r#"Not a CRSD file: expected "CRSDsar", "CRSDtx" or "CRSDrcv", found {0:?}"#)]
    NotCrsd(String),

    #[error("Malformed file header: {0}")]
    MalformedHeader(String),

    #[error("Header field {key} is {reason}")]
    MissingField {
        key: String,
        reason: &'static str,
    },

    #[error("Invalid version string: {0}")]
    InvalidVersionString(String),

    #[error("Inconsistent field layout for {field:?}: {reason}")]
    LayoutInconsistency {
        field: String,
        reason: String,
    },

    #[error("{what} index {index} out of range (limit {limit})")]
    OutOfRange {
        what: &'static str,
        index: usize,
        limit: usize,
    },

    #[error("No support array with id {0:?}")]
    UnknownSupportArray(String),

    #[error("Channel {channel} is compressed; per-sample addressing is undefined")]
    CompressedAddressing { channel: usize },

    #[error("Truncated stream in {block} block at byte offset {offset}: need {expected} bytes, {actual} available")]
    TruncatedStream {
        block:    &'static str,
        offset:   u64,
        expected: u64,
        actual:   u64,
    },

    #[error("Value for field {field:?} does not match format {format}")]
    ValueMismatch {
        field: String,
        format: String,
    },

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Worker pool error: {0}")]
    ThreadPool(String),

    #[error("Invalid file handling")]
    IOError(#[from] std::io::Error),
}
