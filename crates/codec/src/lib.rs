//! Image decoding and re-encoding with MIME-based format detection.
//!
//! This crate wraps the [`image`] codecs behind a unified [`Format`] enum,
//! providing:
//!
//! - **Format detection** from declared MIME types ([`Format::from_mime`]) or
//!   user-facing names ([`FromStr`](std::str::FromStr))
//! - **Decoding** of PNG, JPEG and WebP bytes into a [`Surface`] ([`decode`])
//! - **Encoding** of a [`Surface`] into any [`Format`] ([`Format::encode`]),
//!   with a normalized-pixel fallback when the native layout is rejected
//!
//! Pixel dimensions are always preserved; there is no resizing or cropping.
//! Both directions are synchronous and CPU-bound, so async callers should run
//! them on a blocking thread.

mod construct;
pub mod error;
mod ops;
mod util;

pub use crate::ops::{DEFAULT_QUALITY, Encoded, Surface, decode};

/// A supported image format, used both to describe source files and as the
/// conversion target.
///
/// Defaults to [`Webp`](Self::Webp).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Format {
    /// WebP (.webp), encoded lossily at the requested quality.
    #[default]
    Webp,
    /// Portable Network Graphics (.png)
    Png,
    /// JPEG (.jpg)
    #[cfg_attr(feature = "serde", serde(alias = "jpeg"))]
    Jpg,
}
