//! Image normalization applied before recognition, uniformly for both
//! backends.
//!
//! The pipeline is deterministic and idempotent: grayscale conversion maps
//! luma input to itself, and denoising binarizes, so an image that is already
//! pure black/white passes through untouched. Running `prepare` on its own
//! output returns that output unchanged.

use image::{DynamicImage, GrayImage};
use imageproc::contrast::{otsu_level, threshold};
use imageproc::filter::median_filter;
use tracing::debug;

use crate::validator::DecodedImage;

/// Recognized preprocessing switches. Denoising works on the luma plane, so
/// enabling it implies grayscale conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreprocessOptions {
    pub grayscale: bool,
    pub denoise: bool,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            grayscale: true,
            denoise: true,
        }
    }
}

/// Smallest dimension the despeckle window can cover.
const MIN_DENOISE_DIM: u32 = 3;

/// Normalize an image for recognition.
///
/// Never fails and never changes dimensions: inputs the pipeline cannot
/// improve (tiny images, already-binary scans) pass through as-is.
pub fn prepare(image: DecodedImage, opts: &PreprocessOptions) -> DecodedImage {
    if !opts.grayscale && !opts.denoise {
        return image;
    }

    let format = image.format();
    let gray = image.into_image().into_luma8();
    let processed = if opts.denoise { denoise(gray) } else { gray };
    DecodedImage::new(DynamicImage::ImageLuma8(processed), format)
}

/// Median despeckle followed by Otsu binarization.
fn denoise(gray: GrayImage) -> GrayImage {
    if gray.width() < MIN_DENOISE_DIM || gray.height() < MIN_DENOISE_DIM {
        debug!(
            width = gray.width(),
            height = gray.height(),
            "image too small to despeckle, skipping denoise"
        );
        return gray;
    }
    if is_binary(&gray) {
        // Pure black/white input is already in this pass's output form.
        return gray;
    }

    let despeckled = median_filter(&gray, 1, 1);
    let level = otsu_level(&despeckled);
    threshold(&despeckled, level)
}

fn is_binary(gray: &GrayImage) -> bool {
    gray.pixels().all(|p| p[0] == 0 || p[0] == u8::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};

    fn textured_image(width: u32, height: u32) -> DecodedImage {
        let img = RgbImage::from_fn(width, height, |x, y| {
            let v = ((x * 7 + y * 13) % 256) as u8;
            Rgb([v, v.wrapping_add(40), v.wrapping_add(90)])
        });
        DecodedImage::new(DynamicImage::ImageRgb8(img), ImageFormat::Png)
    }

    fn raw_pixels(image: &DecodedImage) -> Vec<u8> {
        image.image().as_bytes().to_vec()
    }

    const ALL_OPTS: [PreprocessOptions; 4] = [
        PreprocessOptions { grayscale: false, denoise: false },
        PreprocessOptions { grayscale: true, denoise: false },
        PreprocessOptions { grayscale: false, denoise: true },
        PreprocessOptions { grayscale: true, denoise: true },
    ];

    #[test]
    fn test_prepare_is_idempotent_for_every_option_combination() {
        for opts in ALL_OPTS {
            let once = prepare(textured_image(32, 24), &opts);
            let twice = prepare(once.clone(), &opts);
            assert_eq!(raw_pixels(&once), raw_pixels(&twice), "opts: {:?}", opts);
            assert_eq!(once.image().color(), twice.image().color(), "opts: {:?}", opts);
        }
    }

    #[test]
    fn test_prepare_is_deterministic() {
        let opts = PreprocessOptions::default();
        let a = prepare(textured_image(32, 24), &opts);
        let b = prepare(textured_image(32, 24), &opts);
        assert_eq!(raw_pixels(&a), raw_pixels(&b));
    }

    #[test]
    fn test_dimensions_are_preserved() {
        for opts in ALL_OPTS {
            let prepared = prepare(textured_image(33, 17), &opts);
            assert_eq!(prepared.width(), 33, "opts: {:?}", opts);
            assert_eq!(prepared.height(), 17, "opts: {:?}", opts);
        }
    }

    #[test]
    fn test_disabled_options_pass_through_unchanged() {
        let original = textured_image(16, 16);
        let before = raw_pixels(&original);
        let opts = PreprocessOptions { grayscale: false, denoise: false };
        let prepared = prepare(original, &opts);
        assert_eq!(raw_pixels(&prepared), before);
    }

    #[test]
    fn test_denoise_output_is_binary() {
        let opts = PreprocessOptions { grayscale: true, denoise: true };
        let prepared = prepare(textured_image(32, 32), &opts);
        let gray = prepared.into_image().into_luma8();
        assert!(is_binary(&gray));
    }

    #[test]
    fn test_tiny_image_degrades_gracefully() {
        let opts = PreprocessOptions { grayscale: true, denoise: true };
        let prepared = prepare(textured_image(2, 2), &opts);
        assert_eq!(prepared.width(), 2);
        assert_eq!(prepared.height(), 2);
        // Despeckle is skipped; grayscale still applies.
        assert_eq!(prepared.image().color(), image::ColorType::L8);
    }

    #[test]
    fn test_blank_white_image_stays_blank() {
        let img = RgbImage::from_pixel(10, 10, Rgb([255, 255, 255]));
        let decoded = DecodedImage::new(DynamicImage::ImageRgb8(img), ImageFormat::Png);
        let prepared = prepare(decoded, &PreprocessOptions::default());
        let gray = prepared.into_image().into_luma8();
        assert!(gray.pixels().all(|p| p[0] == u8::MAX));
    }
}
