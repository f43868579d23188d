use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unexpected end of data at offset {offset} (wanted {wanted} more bytes)")]
    UnexpectedEnd { offset: usize, wanted: usize },

    #[error("reserved field at offset {offset} is not zero")]
    ReservedFieldViolation { offset: usize },

    #[error("invalid utf-8 in string at offset {offset}: {message}")]
    InvalidString { offset: usize, message: String },

    #[error("string set index {index} out of range (len={len})")]
    InvalidStringIndex { index: usize, len: usize },

    #[error("osage bone range {start}..{end} exceeds pool of {len} bones")]
    InvalidOsageRange {
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("offset {offset:#x} does not fit in a 32-bit pointer")]
    PointerOverflow { offset: u64 },
}
