//! Codec Operations

use crate::Format;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ImageResult};
use tracing::instrument;

/// Quality used when the caller does not specify one (or specifies `NaN`).
pub const DEFAULT_QUALITY: f32 = 0.9;

/// A decoded raster image, ready to be re-encoded.
///
/// Holds the pixels in whatever layout the source decoder produced (8- or
/// 16-bit, with or without alpha); [`Format::encode`] deals with layouts a
/// target encoder cannot accept.
#[derive(Debug, Clone)]
pub struct Surface {
    image: DynamicImage,
    source: Format,
}
impl Surface {
    #[cfg(test)]
    pub(crate) fn new(image: DynamicImage, source: Format) -> Self {
        Self { image, source }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    #[cfg(test)]
    pub(crate) fn source_format(&self) -> Format {
        self.source
    }
}

/// The output of [`Format::encode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub format: Format,
}
impl Encoded {
    pub fn mime(&self) -> &'static str {
        self.format.mime()
    }

    pub fn size(&self) -> u64 {
        // Infallible: a usize (either 32- or 64-bit) will always fit in a u64.
        u64::try_from(self.bytes.len()).unwrap_or(u64::MAX)
    }
}

/// Decode `bytes` as an image of the `declared` media type.
///
/// The declared type is authoritative: PNG bytes declared as `image/jpeg` fail
/// to decode rather than being sniffed and accepted.
///
/// # Errors
/// - [`ErrorKind::UnsupportedFormat`] if `declared` is not PNG, JPEG or WebP.
/// - [`ErrorKind::Decode`] for corrupt, truncated or mismatched data.
///
/// # Examples
///
/// ```
/// use recast_codec::decode;
/// use recast_codec::error::ErrorKind;
///
/// let err = decode(b"not an image", "image/png").unwrap_err();
/// assert_eq!(*err, ErrorKind::Decode);
/// assert!(decode(b"GIF89a", "image/gif").is_err());
/// ```
#[instrument(skip(bytes), fields(input_size = bytes.len(), width, height))]
pub fn decode(bytes: &[u8], declared: &str) -> Result<Surface> {
    let source = Format::from_mime(declared)?;
    let image = image::load_from_memory_with_format(bytes, source.image_format()).or_raise(|| ErrorKind::Decode)?;
    let span = tracing::Span::current();
    span.record("width", image.width());
    span.record("height", image.height());
    Ok(Surface { image, source })
}

impl Format {
    /// Encode a [`Surface`] into this format at its original dimensions.
    ///
    /// `quality` is clamped to `[0, 1]` and affects WebP and JPEG output; PNG
    /// ignores it.
    ///
    /// WebP is encoded lossily through libwebp at `quality * 100`. Should that
    /// fail, the lossless `image` encoder takes over. For the other formats the
    /// surface is first encoded in its native pixel layout; if the encoder
    /// rejects that layout (alpha for JPEG, 16-bit channels, ...) the pixels
    /// are normalized to 8-bit RGB(A) and encoding is attempted once more.
    ///
    /// # Errors
    /// Returns [`ErrorKind::Encode`] only when every attempt fails or produces
    /// no bytes.
    #[instrument(skip(surface), fields(format = %self, source = %surface.source, width = surface.width(), height = surface.height(), output_size))]
    pub fn encode(&self, surface: &Surface, quality: f32) -> Result<Encoded> {
        let quality = clamp_quality(quality);
        let lossy = match self {
            Format::Webp => webp_lossy(&surface.image, quality),
            Format::Png | Format::Jpg => None,
        };
        let bytes = match lossy {
            Some(bytes) => bytes,
            None => self.encode_with_image(surface, quality)?,
        };
        tracing::Span::current().record("output_size", bytes.len());
        Ok(Encoded { bytes, format: *self })
    }

    /// Encode through the `image` codecs, normalizing the pixel layout once if
    /// the native one is rejected.
    fn encode_with_image(&self, surface: &Surface, quality: f32) -> Result<Vec<u8>> {
        let bytes = match self.encode_image(&surface.image, quality) {
            Ok(bytes) if !bytes.is_empty() => bytes,
            first => {
                if let Err(e) = &first {
                    tracing::debug!(error = %e, color = ?surface.image.color(), "Encoder rejected native pixel layout; normalizing");
                }
                let normalized = self.normalize(&surface.image);
                self.encode_image(&normalized, quality).or_raise(|| ErrorKind::Encode(self.as_str()))?
            },
        };
        if bytes.is_empty() {
            exn::bail!(ErrorKind::Encode(self.as_str()));
        }
        Ok(bytes)
    }

    fn encode_image(&self, image: &DynamicImage, quality: f32) -> ImageResult<Vec<u8>> {
        let mut output = Vec::new();
        match self {
            Format::Webp => image.write_with_encoder(WebPEncoder::new_lossless(&mut output))?,
            Format::Png => image.write_with_encoder(PngEncoder::new(&mut output))?,
            Format::Jpg => {
                image.write_with_encoder(JpegEncoder::new_with_quality(&mut output, jpeg_quality(quality)))?
            },
        }
        Ok(output)
    }

    /// The secondary encode strategy: 8-bit RGB for JPEG (which has no alpha
    /// channel), 8-bit RGBA for everything else.
    fn normalize(&self, image: &DynamicImage) -> DynamicImage {
        match self {
            Format::Jpg => DynamicImage::ImageRgb8(image.to_rgb8()),
            Format::Webp | Format::Png => DynamicImage::ImageRgba8(image.to_rgba8()),
        }
    }
}

fn clamp_quality(quality: f32) -> f32 {
    if quality.is_nan() { DEFAULT_QUALITY } else { quality.clamp(0.0, 1.0) }
}

/// Lossy WebP through libwebp, which takes quality on a `0..=100` scale.
/// Returns `None` when libwebp refuses the surface or produces nothing.
fn webp_lossy(image: &DynamicImage, quality: f32) -> Option<Vec<u8>> {
    let rgba = image.to_rgba8();
    match webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height()).encode_simple(false, quality * 100.0) {
        Ok(encoded) if !encoded.is_empty() => Some(encoded.to_vec()),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(error = ?e, "libwebp rejected the surface; falling back to lossless");
            None
        },
    }
}

/// Map `[0, 1]` onto the JPEG encoder's `1..=100` scale.
fn jpeg_quality(quality: f32) -> u8 {
    // Truncation is fine: the clamped input keeps the product within 0..=100.
    ((quality * 100.0).round() as u8).max(1)
}
