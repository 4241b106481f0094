//! Upload validation and image decoding.
//!
//! Everything that can be wrong with the bytes a caller sent is rejected
//! here as `INVALID_INPUT`, before any backend work starts. Decode failures
//! are never reported as internal faults.

use image::{DynamicImage, ImageFormat};
use tracing::debug;

use crate::error::DispatchError;

/// Encodings the pipeline accepts. Sniffed from content, not from the
/// declared content type.
const ACCEPTED_FORMATS: [ImageFormat; 6] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Gif,
    ImageFormat::Bmp,
    ImageFormat::Tiff,
    ImageFormat::WebP,
];

/// A decoded, validated image. Owned by exactly one request; dimensions are
/// always non-zero.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    image: DynamicImage,
    format: ImageFormat,
}

impl DecodedImage {
    pub(crate) fn new(image: DynamicImage, format: ImageFormat) -> Self {
        debug_assert!(image.width() > 0 && image.height() > 0);
        Self { image, format }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Encoding the upload arrived in.
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn into_image(self) -> DynamicImage {
        self.image
    }
}

/// Validate an upload and decode it.
///
/// Rejections: empty payload, payload over `max_bytes`, unrecognized or
/// unsupported encoding, corrupt image data, zero-dimension images.
pub fn decode_upload(
    bytes: &[u8],
    declared_mime: Option<&str>,
    max_bytes: usize,
) -> Result<DecodedImage, DispatchError> {
    if bytes.is_empty() {
        return Err(DispatchError::InvalidInput("empty image payload".into()));
    }
    if bytes.len() > max_bytes {
        return Err(DispatchError::InvalidInput(format!(
            "image is {} bytes, the limit is {} bytes",
            bytes.len(),
            max_bytes
        )));
    }

    let format = image::guess_format(bytes).map_err(|_| {
        DispatchError::InvalidInput("payload is not a recognized image encoding".into())
    })?;
    if !ACCEPTED_FORMATS.contains(&format) {
        return Err(DispatchError::InvalidInput(format!(
            "unsupported image format: {:?}",
            format
        )));
    }

    if let Some(declared) = declared_mime {
        if declared != format.to_mime_type() {
            debug!(declared, sniffed = ?format, "declared content type differs from sniffed format");
        }
    }

    let image = image::load_from_memory_with_format(bytes, format).map_err(|e| {
        DispatchError::InvalidInput(format!("could not decode image: {}", e))
    })?;

    if image.width() == 0 || image.height() == 0 {
        return Err(DispatchError::InvalidInput("image has zero dimensions".into()));
    }

    Ok(DecodedImage::new(image, format))
}
