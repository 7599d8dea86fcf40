//! Fetch Error Types

use derive_more::{Display, Error};

/// A fetch error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for network operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// A response with a non-2xx status is **not** an error at this level; it's
/// a [`Response`](crate::Response) the caller has to judge.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The platform has no connectivity at all
    #[display("offline")]
    Offline,
    /// The request could not be completed (DNS, connection reset, ...)
    #[display("network error fetching {_0}")]
    Network(#[error(not(source))] String),
    /// The request itself is malformed
    #[display("invalid request: {_0}")]
    InvalidRequest(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Offline | Self::Network(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_retryable() {
        assert!(ErrorKind::Offline.is_retryable());
        assert!(ErrorKind::Network("/api/cart".to_string()).is_retryable());
        assert!(!ErrorKind::InvalidRequest("empty url".to_string()).is_retryable());
    }
}
