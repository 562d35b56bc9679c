use crate::Format;
use crate::error::{Error, ErrorKind, Result};
use regex::Regex;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;

/// Declared media types accepted as conversion input.
static ACCEPTED_MIME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^image/(png|jpe?g|webp)$").unwrap());

impl FromStr for Format {
    type Err = Error;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "webp" => Ok(Format::Webp),
            "png" => Ok(Format::Png),
            "jpg" | "jpeg" => Ok(Format::Jpg),
            _ => exn::bail!(ErrorKind::UnsupportedFormat(s.to_string())),
        }
    }
}

impl Format {
    /// Match a declared media type against the accepted input set
    /// (`image/png`, `image/jpeg`, `image/jpg`, `image/webp`), ignoring case.
    ///
    /// # Errors
    /// Returns [`ErrorKind::UnsupportedFormat`] carrying the declared type
    /// verbatim for anything else.
    pub fn from_mime(mime: &str) -> Result<Self> {
        let Some(captures) = ACCEPTED_MIME.captures(mime.trim()) else {
            exn::bail!(ErrorKind::UnsupportedFormat(mime.to_string()));
        };
        match captures[1].to_lowercase().as_str() {
            "png" => Ok(Format::Png),
            "webp" => Ok(Format::Webp),
            _ => Ok(Format::Jpg),
        }
    }

    /// Guess a format from a file extension. Used when a caller only has a
    /// path and no declared media type.
    #[must_use]
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        path.as_ref().extension().and_then(|ext| ext.to_str()).and_then(|ext| ext.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use crate::Format;
    use crate::error::ErrorKind;
    use rstest::rstest;

    #[rstest]
    #[case("webp", Format::Webp)]
    #[case("WEBP", Format::Webp)]
    #[case("png", Format::Png)]
    #[case("jpg", Format::Jpg)]
    #[case("jpeg", Format::Jpg)]
    #[case(" Jpeg ", Format::Jpg)]
    fn test_from_str(#[case] test: &str, #[case] expected: Format) {
        assert_eq!(test.parse::<Format>().unwrap(), expected);
    }

    #[rstest]
    #[case("gif")]
    #[case("")]
    #[case("image/png")]
    fn test_from_str_invalid(#[case] test: &str) {
        assert!(test.parse::<Format>().is_err());
    }

    #[rstest]
    #[case("image/png", Format::Png)]
    #[case("image/PNG", Format::Png)]
    #[case("image/jpeg", Format::Jpg)]
    #[case("image/jpg", Format::Jpg)]
    #[case("IMAGE/JPEG", Format::Jpg)]
    #[case("image/webp", Format::Webp)]
    fn test_from_mime(#[case] mime: &str, #[case] expected: Format) {
        assert_eq!(Format::from_mime(mime).unwrap(), expected);
    }

    #[rstest]
    #[case("image/gif")]
    #[case("image/svg+xml")]
    #[case("image/pngx")]
    #[case("text/png")]
    #[case("")]
    fn test_from_mime_rejected(#[case] mime: &str) {
        let err = Format::from_mime(mime).unwrap_err();
        assert_eq!(*err, ErrorKind::UnsupportedFormat(mime.to_string()));
    }

    #[rstest]
    #[case("photo.png", Some(Format::Png))]
    #[case("dir/photo.JPEG", Some(Format::Jpg))]
    #[case("photo.webp", Some(Format::Webp))]
    #[case("photo.gif", None)]
    #[case("photo", None)]
    fn test_from_path(#[case] path: &str, #[case] expected: Option<Format>) {
        assert_eq!(Format::from_path(path), expected);
    }
}
