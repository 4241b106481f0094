//! Local Tesseract engine adapter.
//!
//! Runs the `tesseract` CLI with the image piped over stdin and the text read
//! from stdout, so nothing touches the filesystem. A missing binary is a
//! clean `ENGINE_UNAVAILABLE`, at startup probe time and at call time alike;
//! it never takes the process down.

use std::io::ErrorKind;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{encode_png, BackendKind, Extracted, OcrBackend};
use crate::error::DispatchError;
use crate::validator::DecodedImage;

pub struct TesseractBackend {
    cmd: String,
    lang: String,
}

impl TesseractBackend {
    pub fn new(cmd: &str, lang: &str) -> Self {
        Self {
            cmd: cmd.to_string(),
            lang: lang.to_string(),
        }
    }

    /// Log whether the engine resolves on PATH. Requests report their own
    /// availability failures, so this only warns.
    pub fn probe(&self) {
        match which::which(&self.cmd) {
            Ok(path) => debug!(engine = %path.display(), lang = %self.lang, "tesseract resolved"),
            Err(_) => warn!(
                cmd = %self.cmd,
                "tesseract not found on PATH, local recognition will be unavailable until it is installed"
            ),
        }
    }
}

#[async_trait]
impl OcrBackend for TesseractBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn is_available(&self) -> bool {
        which::which(&self.cmd).is_ok()
    }

    async fn extract_text(&self, image: &DecodedImage) -> Result<Extracted, DispatchError> {
        let png = encode_png(image).await?;

        // kill_on_drop ties the child's lifetime to this future, so a
        // dispatcher timeout also stops the engine.
        let mut child = Command::new(&self.cmd)
            .arg("stdin")
            .arg("stdout")
            .args(["-l", &self.lang])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied => DispatchError::EngineUnavailable(
                    format!("local OCR engine '{}' is not installed or not executable", self.cmd),
                ),
                _ => DispatchError::internal_with("failed to start the local OCR engine", e),
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| DispatchError::internal("local OCR engine stdin was not captured"))?;
        let write_result = stdin.write_all(&png).await;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| DispatchError::internal_with("local OCR engine did not complete", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(status = ?output.status.code(), stderr = %stderr, "tesseract exited with failure");
            return Err(DispatchError::internal_with(
                "local OCR engine failed to process the image",
                stderr,
            ));
        }
        // An early engine exit can break the pipe before the image is fully
        // written; only report that when the exit status was clean.
        write_result
            .map_err(|e| DispatchError::internal_with("failed to stream image to the local OCR engine", e))?;

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!(chars = text.len(), "tesseract produced text");
        Ok(Extracted {
            text,
            confidence: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

    fn test_image() -> DecodedImage {
        let img = RgbImage::from_pixel(10, 10, Rgb([255, 255, 255]));
        DecodedImage::new(DynamicImage::ImageRgb8(img), ImageFormat::Png)
    }

    #[test]
    fn test_missing_binary_is_not_available() {
        let backend = TesseractBackend::new("tesseract-binary-that-does-not-exist", "eng");
        assert!(!backend.is_available());
    }

    #[tokio::test]
    async fn test_missing_binary_classified_engine_unavailable() {
        let backend = TesseractBackend::new("tesseract-binary-that-does-not-exist", "eng");
        let err = backend.extract_text(&test_image()).await.unwrap_err();
        assert!(matches!(err, DispatchError::EngineUnavailable(_)));
        assert_eq!(err.kind(), "ENGINE_UNAVAILABLE");
    }
}
