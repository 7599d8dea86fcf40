//! Hint Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A hint error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for hint operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Hints were issued without a document to put them in. This is a
    /// wiring mistake, not a runtime condition.
    #[display("no document available for resource hints")]
    NoDocument,
    /// The href could not be resolved to an http(s) URL
    #[display("invalid hint href: {_0:?}")]
    InvalidHref(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
