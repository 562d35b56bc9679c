use crate::Format;
use std::fmt::{Display, Formatter, Result as FmtResult};

impl Display for Format {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl AsRef<str> for Format {
    fn as_ref(&self) -> &'static str {
        self.as_str()
    }
}

impl Format {
    /// Returns the file extension for this format, without the leading dot.
    #[inline]
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Webp => "webp",
            Format::Png => "png",
            Format::Jpg => "jpg",
        }
    }

    /// Returns the canonical MIME type produced when encoding to this format.
    #[inline]
    #[must_use]
    pub fn mime(&self) -> &'static str {
        match self {
            Format::Webp => "image/webp",
            Format::Png => "image/png",
            Format::Jpg => "image/jpeg",
        }
    }

    /// Returns the short name for configuration (for displaying to user)
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        self.extension()
    }

    /// Whether the encoder for this format makes use of a quality setting.
    ///
    /// PNG is always lossless; WebP and JPEG honour it.
    #[inline]
    #[must_use]
    pub fn uses_quality(&self) -> bool {
        matches!(self, Format::Webp | Format::Jpg)
    }

    pub(crate) fn image_format(&self) -> image::ImageFormat {
        match self {
            Format::Webp => image::ImageFormat::WebP,
            Format::Png => image::ImageFormat::Png,
            Format::Jpg => image::ImageFormat::Jpeg,
        }
    }
}
