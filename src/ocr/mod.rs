//! Modular recognition backend abstraction.
//!
//! Defines the [`OcrBackend`] trait and unified types so the two recognition
//! engines (local Tesseract, cloud Textract) can be swapped per request via
//! the upload's backend selector.

pub mod tesseract;
pub mod textract;

use std::fmt;
use std::io::Cursor;
use std::time::Instant;

use image::ImageOutputFormat;

use crate::error::DispatchError;
use crate::validator::DecodedImage;

/// Backend selector carried by each upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Local,
    Cloud,
}

impl BackendKind {
    /// Parse the request selector. The engine names are accepted as aliases
    /// for their backend; anything else is unrecognized, never defaulted.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "tesseract" => Some(Self::Local),
            "cloud" | "textract" => Some(Self::Cloud),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Cloud => "cloud",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw engine output, before timing metadata is attached.
#[derive(Debug, Clone)]
pub struct Extracted {
    pub text: String,
    /// Confidence as reported by the engine (Textract: percent). Absent for
    /// engines that do not report one.
    pub confidence: Option<f32>,
}

/// Unified recognition result returned by every backend. `text` is always a
/// real string, possibly empty.
#[derive(Debug, Clone)]
pub struct Recognition {
    pub text: String,
    pub backend: BackendKind,
    pub elapsed_ms: u64,
    pub confidence: Option<f32>,
}

/// Async capability contract implemented by each recognition backend.
#[async_trait::async_trait]
pub trait OcrBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Cheap diagnostic probe: engine binary resolvable, credentials
    /// resolved. Never invokes the engine.
    fn is_available(&self) -> bool;

    async fn extract_text(&self, image: &DecodedImage) -> Result<Extracted, DispatchError>;

    /// Run the engine and stamp backend and timing metadata.
    async fn recognize(&self, image: &DecodedImage) -> Result<Recognition, DispatchError> {
        let started = Instant::now();
        let extracted = self.extract_text(image).await?;
        Ok(Recognition {
            text: extracted.text,
            backend: self.kind(),
            elapsed_ms: started.elapsed().as_millis() as u64,
            confidence: extracted.confidence,
        })
    }
}

/// Re-encode the prepared image as PNG for engine transport. Encoding is CPU
/// work, so it runs on the blocking pool.
pub(crate) async fn encode_png(image: &DecodedImage) -> Result<Vec<u8>, DispatchError> {
    let dynamic = image.image().clone();
    tokio::task::spawn_blocking(move || {
        let mut out = Vec::new();
        dynamic
            .write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Png)
            .map_err(|e| DispatchError::internal_with("failed to encode image for recognition", e))?;
        Ok(out)
    })
    .await
    .map_err(|e| DispatchError::internal_with("image encoding task failed", e))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

    #[test]
    fn test_parse_canonical_selectors() {
        assert_eq!(BackendKind::parse("local"), Some(BackendKind::Local));
        assert_eq!(BackendKind::parse("cloud"), Some(BackendKind::Cloud));
    }

    #[test]
    fn test_parse_engine_name_aliases() {
        assert_eq!(BackendKind::parse("tesseract"), Some(BackendKind::Local));
        assert_eq!(BackendKind::parse("textract"), Some(BackendKind::Cloud));
        assert_eq!(BackendKind::parse(" Cloud "), Some(BackendKind::Cloud));
    }

    #[test]
    fn test_parse_rejects_unknown_selectors() {
        assert_eq!(BackendKind::parse(""), None);
        assert_eq!(BackendKind::parse("sideways"), None);
        assert_eq!(BackendKind::parse("localhost"), None);
    }

    struct FixedBackend;

    #[async_trait::async_trait]
    impl OcrBackend for FixedBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Local
        }

        fn is_available(&self) -> bool {
            true
        }

        async fn extract_text(&self, _image: &DecodedImage) -> Result<Extracted, DispatchError> {
            Ok(Extracted {
                text: "fixed".into(),
                confidence: Some(88.5),
            })
        }
    }

    fn test_image() -> DecodedImage {
        let img = RgbImage::from_pixel(4, 4, Rgb([255, 255, 255]));
        DecodedImage::new(DynamicImage::ImageRgb8(img), ImageFormat::Png)
    }

    #[tokio::test]
    async fn test_recognize_stamps_backend_and_timing() {
        let recognition = FixedBackend.recognize(&test_image()).await.unwrap();
        assert_eq!(recognition.text, "fixed");
        assert_eq!(recognition.backend, BackendKind::Local);
        assert_eq!(recognition.confidence, Some(88.5));
    }

    #[tokio::test]
    async fn test_encode_png_produces_png() {
        let bytes = encode_png(&test_image()).await.unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);
    }
}
