//! Worker Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A worker error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for worker operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The configuration is unusable
    #[display("invalid configuration")]
    Config,
    /// Nothing could answer the request: show the offline page
    #[display("no response available for {_0}")]
    NoResponse(#[error(not(source))] String),
    /// The request failed and has been queued for background sync; tell the
    /// user it will be sent later
    #[display("request to {_0} queued for background sync")]
    Queued(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NoResponse(_))
    }
}
