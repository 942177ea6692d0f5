use std::io;
use thiserror::Error;

/// Everything a storage-engine operation can fail with. Nothing is
/// retried; failures surface to the caller as-is.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("illegal argument: {0}")]
    Misuse(&'static str),

    #[error("invalid page number {0}")]
    BadPageNo(u32),

    #[error("invalid cell number {0}")]
    BadCellNo(u16),

    #[error("file has no header")]
    NoHeader,

    #[error("corrupt header")]
    CorruptHeader,

    #[error("key {0} already exists")]
    Duplicate(u32),

    #[error("key {0} not found")]
    NotFound(u32),

    #[error("could not allocate memory")]
    OutOfMemory,

    #[error("record of {0} bytes does not fit in a page")]
    TooLarge(usize),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;
