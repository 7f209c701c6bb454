use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage};

use super::OcrConfig;
use crate::config::RelativeRect;

/// Converts image to binary by keeping only bright pixels.
///
/// Pixels where R > threshold AND G > threshold AND B > threshold become black (text).
/// All other pixels become white (background).
///
/// HUD text is white on a dark or translucent backdrop, so this also inverts
/// it into the dark-on-light form Tesseract reads best.
pub fn threshold_bright_pixels(img: &RgbImage, threshold: u8) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let pixel = img.get_pixel(x, y);
        if pixel.0.iter().all(|&channel| channel > threshold) {
            Luma([0u8])
        } else {
            Luma([255u8])
        }
    })
}

/// Crops a sub-region from an image using relative coordinates.
///
/// Converts the relative rect (0.0–1.0) to absolute pixel coordinates,
/// clamps to image bounds, and returns the cropped sub-image.
pub fn crop_region(img: &RgbImage, region: &RelativeRect) -> RgbImage {
    let (x0, y0, rw, rh) = region.to_pixels(img.width(), img.height());
    imageops::crop_imm(img, x0, y0, rw, rh).to_image()
}

/// Enlarges small glyphs before recognition. Factors at or below 1.0 are a no-op.
pub fn upscale(img: &GrayImage, factor: f32) -> GrayImage {
    if factor <= 1.0 || img.width() == 0 || img.height() == 0 {
        return img.clone();
    }
    let width = (img.width() as f32 * factor).round() as u32;
    let height = (img.height() as f32 * factor).round() as u32;
    imageops::resize(img, width, height, FilterType::CatmullRom)
}

/// Full preprocessing chain for a HUD text region: threshold, then upscale.
pub fn preprocess_for_ocr(img: &RgbImage, config: &OcrConfig) -> GrayImage {
    let binary = threshold_bright_pixels(img, config.text_threshold);
    upscale(&binary, config.scale)
}
