use std::io;
use thiserror::Error;

/// Main error type for the MP4 atom library.
#[derive(Error, Debug)]
pub enum Mp4Error {
    /// An I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The requested file does not exist
    #[error("File not found: {0}")]
    NotFound(String),
    /// The atom layout is broken (sizes, boundaries, table cross-checks)
    #[error("Format error: {0}")]
    Format(String),
    /// A field holds a value the library cannot accept
    #[error("Invalid data: {0}")]
    InvalidData(String),
    /// An index or offset is outside the valid range
    #[error("Out of range: {0}")]
    OutOfRange(String),
    /// The operation is not supported for this atom or file
    #[error("Not supported: {0}")]
    NotSupported(String),
    /// The operation is invalid in the current load state
    #[error("Illegal state: {0}")]
    IllegalState(String),
    /// A write was attempted on a read-only context
    #[error("Read-only: {0}")]
    ReadOnly(String),
    /// The data does not fit in the target byte range
    #[error("Not enough space: {0}")]
    NotEnoughSpace(String),
    /// A buffer could not be allocated
    #[error("Out of memory: {0}")]
    OutOfMemory(String),
    /// An internal invariant was broken
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Mp4Error {
    /// Numeric result code, compatible with the legacy C result codes.
    pub fn code(&self) -> i32 {
        match self {
            Mp4Error::Io(_) => -12,
            Mp4Error::NotFound(_) => -30,
            Mp4Error::Format(_) => -13,
            Mp4Error::InvalidData(_) => -14,
            Mp4Error::OutOfRange(_) => -15,
            Mp4Error::NotSupported(_) => -10,
            Mp4Error::IllegalState(_) => -10001,
            Mp4Error::ReadOnly(_) => -18,
            Mp4Error::NotEnoughSpace(_) => -31,
            Mp4Error::OutOfMemory(_) => -5,
            Mp4Error::Internal(_) => -2,
        }
    }
}

/// A specialized `Result` type for MP4 atom operations.
pub type Result<T> = std::result::Result<T, Mp4Error>;
