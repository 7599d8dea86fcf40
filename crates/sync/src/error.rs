//! Sync Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A sync error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for sync and push operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The platform lacks the capability; fall back to manual flushing
    #[display("not supported on this platform")]
    Unsupported,
    /// The user refused notification permission
    #[display("permission denied")]
    PermissionDenied,
    /// The persisted queue could not be read or written
    #[display("sync queue persistence failed ({_0})")]
    Persistence(#[error(not(source))] String),
    /// The platform's push service rejected the request
    #[display("push service error ({_0})")]
    Push(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::Push(_))
    }
}
