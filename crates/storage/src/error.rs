//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Named store does not exist
    #[display("store not found: {_0}")]
    StoreNotFound(#[error(not(source))] String),
    /// Store name contains characters that cannot be used as a store name
    #[display("invalid store name: {_0:?}")]
    InvalidStoreName(#[error(not(source))] String),
    /// The origin's storage quota would be exceeded by this write. Evict
    /// something first, or drop the write.
    #[display("storage quota exceeded writing {_0} bytes")]
    QuotaExceeded(#[error(not(source))] u64),
    /// Store exists but cannot currently be accessed
    #[display("store unavailable: {_0}")]
    Unavailable(#[error(not(source))] String),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// A persisted record could not be encoded or decoded
    #[display("corrupt record: {_0}")]
    CorruptRecord(#[error(not(source))] String),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Unavailable(_))
    }

    /// Returns `true` if the write failed because the storage quota ran out.
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExceeded(_))
    }
}
