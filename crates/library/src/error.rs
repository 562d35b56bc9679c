//! Library Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Each operational module keeps its
//! own error kinds ([`convert`](crate::convert::error),
//! [`archive`](crate::archive::error)); they are raised into an
//! [`ErrorKind`] here when they leave the [`Session`](crate::Session).

use crate::FileKey;
use crate::archive::error::Error as ArchiveError;
use crate::convert::error::{Error as ConvertError, ErrorKind as ConvertErrorKind};
use derive_more::{Display, Error};
use std::path::PathBuf;

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Converting a single file failed; the inner kind says why.
    #[display("{_0}")]
    Convert(ConvertErrorKind),
    /// The archive itself could not be produced.
    #[display("archive could not be packaged")]
    Archive,
    /// No artifact exists for the requested file.
    #[display("no conversion available for {_0}")]
    NotConverted(#[error(not(source))] FileKey),
    /// The bytes behind an artifact's handle could not be read.
    #[display("converted image could not be read back")]
    Resource,
    /// A source file could not be read from disk.
    #[display("source file could not be read: {}", _0.display())]
    Source(#[error(not(source))] PathBuf),
    /// The configured resource backend could not be opened.
    #[display("session could not be configured")]
    Config,
}

impl ErrorKind {
    /// Convert a conversion error into a library error, preserving the
    /// converter's `Exn` frame as a child in its own error tree.
    #[track_caller]
    pub fn convert(err: ConvertError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Convert(inner))
    }

    #[track_caller]
    pub fn archive(err: ArchiveError) -> Error {
        err.raise(ErrorKind::Archive)
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Convert(inner) => inner.is_retryable(),
            Self::Resource => true,
            _ => false,
        }
    }
}
