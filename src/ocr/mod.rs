pub mod engine;
pub mod preprocess;
pub mod setup;

pub use engine::TesseractRecognizer;
pub use preprocess::{crop_region, preprocess_for_ocr, threshold_bright_pixels};

use anyhow::Result;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A single recognized word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrWord {
    pub text: String,
    /// 0.0 to 1.0
    pub confidence: f32,
    /// `(left, top, width, height)` in the recognized image
    pub bounds: (u32, u32, u32, u32),
}

/// Text recognized from one image. Lines are separated by `\n`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrResult {
    pub text: String,
    /// Mean word confidence, 0.0 to 1.0
    pub confidence: f32,
    pub words: Vec<OcrWord>,
}

impl OcrResult {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Non-empty trimmed lines.
    pub fn lines(&self) -> Vec<&str> {
        self.text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect()
    }
}

/// Text recognition backend.
pub trait Recognizer {
    /// False when the backend cannot run at all (e.g. no executable).
    fn is_available(&self) -> bool;

    /// Recognizes text in a cropped screen region.
    fn recognize(&self, image: &RgbImage) -> Result<OcrResult>;
}

/// Recognizer that is never available. Text-driven detection abstains.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRecognizer;

impl Recognizer for NullRecognizer {
    fn is_available(&self) -> bool {
        false
    }

    fn recognize(&self, _image: &RgbImage) -> Result<OcrResult> {
        Ok(OcrResult::default())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Explicit Tesseract executable; searched for when unset
    pub tesseract_path: Option<PathBuf>,
    /// Explicit tessdata directory; Tesseract's own default when unset
    pub tessdata_dir: Option<PathBuf>,
    pub language: String,
    /// Tesseract page segmentation mode
    pub page_segmentation_mode: u8,
    /// Upscale factor applied before recognition
    pub scale: f32,
    /// Pixels with R, G and B all above this are treated as text
    pub text_threshold: u8,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_path: None,
            tessdata_dir: None,
            language: "eng".to_string(),
            // Single uniform block of text
            page_segmentation_mode: 6,
            scale: 2.0,
            text_threshold: 170,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_recognizer() {
        let recognizer = NullRecognizer;
        assert!(!recognizer.is_available());
        let result = recognizer.recognize(&RgbImage::new(4, 4)).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_result_lines() {
        let result = OcrResult {
            text: "  MISSION PASSED \n\n +$25,000".to_string(),
            ..Default::default()
        };
        assert_eq!(result.lines(), vec!["MISSION PASSED", "+$25,000"]);
    }
}
