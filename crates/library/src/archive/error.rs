//! Error types for the [`archive`](super) module.

use derive_more::{Display, Error};

/// An archive error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// One artifact could not be fetched or added. Recovered by skipping it.
    #[display("archive entry {_0} skipped")]
    ArchiveItem(#[error(not(source))] String),
    /// The ZIP container itself could not be written.
    #[display("archive could not be written")]
    Write,
    /// The blocking packaging task panicked or was cancelled by the runtime.
    #[display("archive task did not complete")]
    Task,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ArchiveItem(_) | Self::Task)
    }
}
