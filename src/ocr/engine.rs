use anyhow::{anyhow, Context, Result};
use image::{GrayImage, RgbImage};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::preprocess::preprocess_for_ocr;
use super::setup::{find_tessdata_dir, find_tesseract_executable};
use super::{OcrConfig, OcrResult, OcrWord, Recognizer};

/// Runs the `tesseract` executable in TSV mode on preprocessed regions.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    executable: Option<PathBuf>,
    tessdata: Option<PathBuf>,
    config: OcrConfig,
}

impl TesseractRecognizer {
    /// Locates Tesseract once. When it cannot be found the recognizer is
    /// constructed anyway and reports itself unavailable.
    pub fn new(config: OcrConfig) -> Self {
        let executable = match find_tesseract_executable(config.tesseract_path.as_deref()) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("{}. Text recognition disabled.", e);
                None
            }
        };
        let tessdata = find_tessdata_dir(config.tessdata_dir.as_deref(), &config.language);

        Self {
            executable,
            tessdata,
            config,
        }
    }

    /// Runs Tesseract on an already preprocessed grayscale image.
    pub fn recognize_gray(&self, img: &GrayImage) -> Result<OcrResult> {
        let tesseract_exe = self
            .executable
            .as_ref()
            .ok_or_else(|| anyhow!("Tesseract is not available"))?;

        // Save image to temporary file
        let temp_input = NamedTempFile::with_suffix(".png")?;
        img.save(temp_input.path())
            .context("Failed to write OCR input image")?;

        // Tesseract appends .tsv to the output base
        let temp_output = NamedTempFile::new()?;
        let output_base = temp_output.path().to_string_lossy().to_string();

        let mut command = Command::new(tesseract_exe);
        command.arg(temp_input.path()).arg(&output_base);
        if let Some(tessdata) = &self.tessdata {
            command.arg("--tessdata-dir").arg(tessdata);
        }
        let output = command
            .arg("-l")
            .arg(&self.config.language)
            .arg("--psm")
            .arg(self.config.page_segmentation_mode.to_string())
            .arg("tsv")
            .output()
            .with_context(|| format!("Failed to run {}", tesseract_exe.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("Tesseract failed: {}", stderr.trim()));
        }

        let tsv_path = format!("{}.tsv", output_base);
        let tsv_content = std::fs::read_to_string(&tsv_path)
            .with_context(|| format!("Failed to read Tesseract output {}", tsv_path))?;
        remove_output(Path::new(&tsv_path));

        let result = parse_tsv_output(&tsv_content);
        debug!(
            "OCR: {:?} ({:.0}%)",
            result.text.replace('\n', " | "),
            result.confidence * 100.0
        );
        Ok(result)
    }
}

impl Recognizer for TesseractRecognizer {
    fn is_available(&self) -> bool {
        self.executable.is_some()
    }

    fn recognize(&self, image: &RgbImage) -> Result<OcrResult> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(OcrResult::default());
        }
        let preprocessed = preprocess_for_ocr(image, &self.config);
        self.recognize_gray(&preprocessed)
    }
}

/// Deletes a Tesseract output file; a failure only leaves a stray temp file.
fn remove_output(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        debug!("Failed to remove Tesseract output {}: {}", path.display(), e);
    }
}

/// Parses Tesseract TSV output.
///
/// Word rows (level 5) are grouped into lines by block, paragraph and line
/// number. Confidence is rescaled from Tesseract's 0-100 to 0.0-1.0.
pub(crate) fn parse_tsv_output(tsv: &str) -> OcrResult {
    let mut lines: Vec<Vec<&str>> = Vec::new();
    let mut words: Vec<OcrWord> = Vec::new();
    let mut current_line: Option<(u32, u32, u32)> = None;

    // Skip header
    for row in tsv.lines().skip(1) {
        // TSV fields: level, page_num, block_num, par_num, line_num, word_num,
        //             left, top, width, height, conf, text
        let fields: Vec<&str> = row.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }

        let number = |i: usize| fields[i].trim().parse::<u32>().unwrap_or(0);
        let level: i32 = fields[0].trim().parse().unwrap_or(-1);
        let conf: f32 = fields[10].trim().parse().unwrap_or(-1.0);
        let text = fields[11].trim();

        if level != 5 || text.is_empty() || conf < 0.0 {
            continue;
        }

        let line_key = (number(2), number(3), number(4));
        if current_line != Some(line_key) {
            lines.push(Vec::new());
            current_line = Some(line_key);
        }
        if let Some(line) = lines.last_mut() {
            line.push(text);
        }

        words.push(OcrWord {
            text: text.to_string(),
            confidence: (conf / 100.0).clamp(0.0, 1.0),
            bounds: (number(6), number(7), number(8), number(9)),
        });
    }

    let confidence = if words.is_empty() {
        0.0
    } else {
        words.iter().map(|w| w.confidence).sum::<f32>() / words.len() as f32
    };

    let text = lines
        .iter()
        .map(|line| line.join(" "))
        .collect::<Vec<_>>()
        .join("\n");

    OcrResult {
        text,
        confidence,
        words,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    #[test]
    fn test_parse_tsv_groups_lines() {
        let tsv = format!(
            "{}\n\
             1\t1\t0\t0\t0\t0\t0\t0\t400\t100\t-1\t\n\
             5\t1\t1\t1\t1\t1\t10\t5\t80\t20\t96.5\tMISSION\n\
             5\t1\t1\t1\t1\t2\t95\t5\t70\t20\t91.0\tPASSED\n\
             5\t1\t1\t1\t2\t1\t10\t40\t90\t20\t88.0\t+$25,000\n",
            HEADER
        );

        let result = parse_tsv_output(&tsv);
        assert_eq!(result.text, "MISSION PASSED\n+$25,000");
        assert_eq!(result.words.len(), 3);
        assert_eq!(result.words[0].bounds, (10, 5, 80, 20));
        assert!((result.words[1].confidence - 0.91).abs() < 1e-4);
        assert!((result.confidence - (0.965 + 0.91 + 0.88) / 3.0).abs() < 1e-4);
    }

    #[test]
    fn test_parse_tsv_skips_empty_and_negative_rows() {
        let tsv = format!(
            "{}\n\
             5\t1\t1\t1\t1\t1\t0\t0\t10\t10\t-1\tghost\n\
             5\t1\t1\t1\t1\t2\t0\t0\t10\t10\t80\t \n\
             short\trow\n",
            HEADER
        );
        let result = parse_tsv_output(&tsv);
        assert!(result.is_empty());
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_remove_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.tsv");
        std::fs::write(&path, HEADER).unwrap();

        remove_output(&path);
        assert!(!path.exists());
        // Already gone: logged, not fatal
        remove_output(&path);
    }

    #[test]
    fn test_unavailable_recognizer_errors() {
        let recognizer = TesseractRecognizer {
            executable: None,
            tessdata: None,
            config: OcrConfig::default(),
        };
        assert!(!recognizer.is_available());
        assert!(recognizer.recognize(&RgbImage::new(8, 8)).is_err());
        assert!(recognizer.recognize(&RgbImage::new(0, 0)).unwrap().is_empty());
    }
}
