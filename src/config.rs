//! Engine configuration.
//!
//! Loads settings from config.json. Every section falls back to defaults
//! independently, so a partial file only overrides what it names.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::detection::{ClassifierConfig, TemplateConfig};
use crate::game::MachineConfig;
use crate::ocr::OcrConfig;
use crate::parsers::MoneyLimits;
use crate::pipeline::PipelineConfig;

/// A rectangle in relative coordinates (0.0 to 1.0).
/// Used for defining screen regions that scale with capture resolution.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelativeRect {
    /// X position of top-left corner (0.0 = left edge, 1.0 = right edge)
    pub x: f32,
    /// Y position of top-left corner (0.0 = top edge, 1.0 = bottom edge)
    pub y: f32,
    /// Width as fraction of image width
    pub width: f32,
    /// Height as fraction of image height
    pub height: f32,
}

impl RelativeRect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Converts to absolute `(x, y, width, height)` clamped to the image.
    pub fn to_pixels(&self, image_width: u32, image_height: u32) -> (u32, u32, u32, u32) {
        let (w, h) = (image_width as f32, image_height as f32);
        let x0 = ((self.x.max(0.0) * w) as u32).min(image_width);
        let y0 = ((self.y.max(0.0) * h) as u32).min(image_height);
        let rw = ((self.width.max(0.0) * w) as u32).min(image_width - x0);
        let rh = ((self.height.max(0.0) * h) as u32).min(image_height - y0);
        (x0, y0, rw, rh)
    }
}

impl Default for RelativeRect {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.1, 0.1)
    }
}

/// Screen regions read each cycle, laid out for a 16:9 HUD.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenRegions {
    /// Money display (top right)
    pub money: RelativeRect,
    /// Mission objective strip (top center)
    pub mission_text: RelativeRect,
    /// Center prompts and banners
    pub center_prompt: RelativeRect,
    /// Mission timer (bottom right)
    pub timer: RelativeRect,
    pub business_stock: RelativeRect,
    pub business_supplies: RelativeRect,
    pub business_value: RelativeRect,
}

impl Default for ScreenRegions {
    fn default() -> Self {
        Self {
            money: RelativeRect::new(0.78, 0.015, 0.21, 0.045),
            mission_text: RelativeRect::new(0.25, 0.02, 0.5, 0.08),
            center_prompt: RelativeRect::new(0.25, 0.45, 0.5, 0.15),
            timer: RelativeRect::new(0.85, 0.90, 0.14, 0.06),
            business_stock: RelativeRect::new(0.55, 0.35, 0.25, 0.08),
            business_supplies: RelativeRect::new(0.55, 0.45, 0.25, 0.08),
            business_value: RelativeRect::new(0.55, 0.55, 0.25, 0.08),
        }
    }
}

impl ScreenRegions {
    /// Business screen regions in reading order.
    pub fn business(&self) -> [(&'static str, RelativeRect); 3] {
        [
            ("stock", self.business_stock),
            ("supplies", self.business_supplies),
            ("value", self.business_value),
        ]
    }
}

/// Complete engine configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub regions: ScreenRegions,
    pub classifier: ClassifierConfig,
    pub money: MoneyLimits,
    pub machine: MachineConfig,
    pub ocr: OcrConfig,
    pub templates: TemplateConfig,
    pub pipeline: PipelineConfig,
}

impl EngineConfig {
    /// Reads and parses a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// Loads the config at `path`, or defaults when it is missing or invalid.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Self::default();
        }

        match Self::load(path) {
            Ok(config) => {
                info!("Config loaded from {}", path.display());
                config
            }
            Err(e) => {
                warn!("{:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Writes the config as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_to_pixels() {
        let rect = RelativeRect::new(0.1, 0.25, 0.5, 0.1);
        assert_eq!(rect.to_pixels(100, 200), (10, 50, 50, 20));
    }

    #[test]
    fn test_to_pixels_clamps() {
        let rect = RelativeRect::new(0.9, 0.9, 0.5, 0.5);
        assert_eq!(rect.to_pixels(100, 100), (90, 90, 10, 10));

        let outside = RelativeRect::new(1.5, 1.5, 0.5, 0.5);
        assert_eq!(outside.to_pixels(100, 100), (100, 100, 0, 0));
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "money": { "min_value": 500 }, "machine": { "max_history": 5 } }"#)
            .unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.money.min_value, 500);
        assert_eq!(config.money.max_value, MoneyLimits::default().max_value);
        assert_eq!(config.machine.max_history, 5);
        assert_eq!(config.regions.money, ScreenRegions::default().money);
    }

    #[test]
    fn test_missing_or_invalid_config_falls_back() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.json");
        assert_eq!(EngineConfig::load_or_default(&missing).machine.max_history, 100);

        let invalid = dir.path().join("bad.json");
        fs::write(&invalid, "{ not json").unwrap();
        assert!(EngineConfig::load(&invalid).is_err());
        assert_eq!(EngineConfig::load_or_default(&invalid).machine.max_history, 100);
    }

    #[test]
    fn test_save_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = EngineConfig::default();
        config.pipeline.transition_min_confidence = 0.75;
        config.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded.pipeline.transition_min_confidence, 0.75);
    }
}
