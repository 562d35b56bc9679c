//! Error types for the [`convert`](super) module.

use derive_more::{Display, Error};
use recast_codec::error::{Error as CodecError, ErrorKind as CodecErrorKind};

/// A conversion error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for conversion operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of a conversion failure.
///
/// ### Recorded on the session
/// - [`ErrorKind::Codec`]
/// - [`ErrorKind::Resource`]
/// - [`ErrorKind::Task`]
///
/// ### Silent
/// - [`ErrorKind::Aborted`]
/// - [`ErrorKind::SourceRemoved`]
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Decoding or encoding failed; displays exactly as the codec error.
    #[display("{_0}")]
    Codec(CodecErrorKind),
    /// The encoded bytes could not be handed to the resource backend.
    #[display("converted image could not be stored")]
    Resource,
    /// The blocking encode task panicked or was cancelled by the runtime.
    #[display("conversion task did not complete")]
    Task,
    /// A newer batch, a cancellation or a clear superseded this conversion.
    #[display("conversion was superseded")]
    Aborted,
    /// The source file was removed while it was being converted.
    #[display("source file was removed during conversion")]
    SourceRemoved,
}

impl ErrorKind {
    /// Convert a codec error into a conversion error, preserving the codec
    /// crate's `Exn` frame as a child in its own error tree.
    #[track_caller]
    pub fn codec(err: CodecError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Codec(inner))
    }

    /// Whether the failure belongs in the session's `last_error`. Superseded
    /// work is dropped without a trace.
    pub fn is_recorded(&self) -> bool {
        !matches!(self, Self::Aborted | Self::SourceRemoved)
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Codec(inner) => inner.is_retryable(),
            Self::Resource | Self::Task => true,
            Self::Aborted | Self::SourceRemoved => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_display_passthrough() {
        let err = ErrorKind::codec(exn::Exn::from(CodecErrorKind::Decode));
        assert_eq!(*err, ErrorKind::Codec(CodecErrorKind::Decode));
        assert_eq!((*err).to_string(), CodecErrorKind::Decode.to_string());
    }

    #[test]
    fn test_recorded() {
        assert!(ErrorKind::Codec(CodecErrorKind::Encode("webp")).is_recorded());
        assert!(ErrorKind::Resource.is_recorded());
        assert!(!ErrorKind::Aborted.is_recorded());
        assert!(!ErrorKind::SourceRemoved.is_recorded());
    }
}
