//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use crate::ResourceHandle;
use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Handle was never acquired from this backend, or was already released.
    #[display("resource not found: {_0}")]
    NotFound(#[error(not(source))] ResourceHandle),
    /// Access denied to the backing file.
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Backend root is not usable (relative, or not a directory).
    #[display("invalid path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// Backend-specific error
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::BackendError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let handle = ResourceHandle::mint("memory", 7);
        assert_eq!(ErrorKind::NotFound(handle).to_string(), "resource not found: blob:memory/7");
    }

    #[test]
    fn test_retryable() {
        assert!(!ErrorKind::NotFound(ResourceHandle::mint("memory", 1)).is_retryable());
        assert!(ErrorKind::BackendError("busy".to_string()).is_retryable());
        assert!(ErrorKind::from(IoError::other("disk")).is_retryable());
    }
}
