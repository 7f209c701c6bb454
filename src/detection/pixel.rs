//! Pixel-statistics layer.
//!
//! Cheap whole-frame heuristics: overall darkness, letterbox bars, banner
//! colors and the brightness of known HUD areas.

use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use super::result::{DetectionSource, StateDetectionResult};
use crate::game::GameState;

/// Thresholds and confidences for the pixel layer. Brightness values are
/// 0-255 luma.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PixelConfig {
    pub loading_max_brightness: f64,
    pub loading_confidence: f32,
    pub letterbox_max_brightness: f64,
    pub cutscene_min_center_brightness: f64,
    pub cutscene_confidence: f32,
    /// Fraction of the top band that must be banner gold
    pub gold_min_ratio: f64,
    pub mission_passed_confidence: f32,
    /// Fraction of the frame that must be saturated red
    pub red_min_ratio: f64,
    pub mission_failed_confidence: f32,
    pub menu_max_brightness: f64,
    pub menu_max_std_dev: f64,
    pub menu_confidence: f32,
    pub phone_min_brightness: f64,
    pub phone_confidence: f32,
    /// Luma above which a pixel counts as HUD white
    pub white_level: f64,
    pub timer_min_white_ratio: f64,
    pub mission_strip_min_brightness: f64,
    pub mission_active_confidence: f32,
    pub hud_min_white_ratio: f64,
    pub idle_confidence: f32,
}

impl Default for PixelConfig {
    fn default() -> Self {
        Self {
            loading_max_brightness: 15.0,
            loading_confidence: 0.9,
            letterbox_max_brightness: 10.0,
            cutscene_min_center_brightness: 20.0,
            cutscene_confidence: 0.75,
            gold_min_ratio: 0.03,
            mission_passed_confidence: 0.8,
            red_min_ratio: 0.02,
            mission_failed_confidence: 0.7,
            menu_max_brightness: 60.0,
            menu_max_std_dev: 40.0,
            menu_confidence: 0.7,
            phone_min_brightness: 100.0,
            phone_confidence: 0.6,
            white_level: 200.0,
            timer_min_white_ratio: 0.02,
            mission_strip_min_brightness: 80.0,
            mission_active_confidence: 0.6,
            hud_min_white_ratio: 0.05,
            idle_confidence: 0.5,
        }
    }
}

/// Rectangle in absolute pixel coordinates, end-exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Area {
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
}

impl Area {
    /// Area from fractional bounds, truncating toward zero.
    fn fraction(img: &RgbImage, top: f64, bottom: f64, left: f64, right: f64) -> Self {
        let (w, h) = (img.width() as f64, img.height() as f64);
        let clamp = |v: f64, max: u32| (v.max(0.0) as u32).min(max);
        Self {
            x0: clamp(left * w, img.width()),
            y0: clamp(top * h, img.height()),
            x1: clamp(right * w, img.width()),
            y1: clamp(bottom * h, img.height()),
        }
    }

    fn pixels<'a>(self, img: &'a RgbImage) -> impl Iterator<Item = &'a Rgb<u8>> + 'a {
        (self.y0..self.y1).flat_map(move |y| (self.x0..self.x1).map(move |x| img.get_pixel(x, y)))
    }
}

/// ITU-R BT.601 luma, 0.0 to 255.0.
pub fn luma(pixel: &Rgb<u8>) -> f64 {
    0.299 * pixel[0] as f64 + 0.587 * pixel[1] as f64 + 0.114 * pixel[2] as f64
}

/// HSV in the 8-bit convention: hue 0-180, saturation and value 0-255.
pub fn to_hsv(pixel: &Rgb<u8>) -> (f64, f64, f64) {
    let (r, g, b) = (pixel[0] as f64, pixel[1] as f64, pixel[2] as f64);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let saturation = if max > 0.0 { delta * 255.0 / max } else { 0.0 };

    let mut hue = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / delta
    } else if max == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if hue < 0.0 {
        hue += 360.0;
    }

    ((hue / 2.0).round(), saturation.round(), max)
}

fn is_banner_gold(pixel: &Rgb<u8>) -> bool {
    let (h, s, v) = to_hsv(pixel);
    (18.0..=35.0).contains(&h) && s >= 80.0 && v >= 150.0
}

fn is_alert_red(pixel: &Rgb<u8>) -> bool {
    let (h, s, v) = to_hsv(pixel);
    (h <= 10.0 || (170.0..=180.0).contains(&h)) && s >= 100.0 && v >= 100.0
}

/// Mean and standard deviation of luma over an area; zero when empty.
fn luma_stats(img: &RgbImage, area: Area) -> (f64, f64) {
    let (mut sum, mut sum_sq, mut count) = (0.0, 0.0, 0usize);
    for pixel in area.pixels(img) {
        let y = luma(pixel);
        sum += y;
        sum_sq += y * y;
        count += 1;
    }
    if count == 0 {
        return (0.0, 0.0);
    }
    let mean = sum / count as f64;
    let variance = (sum_sq / count as f64 - mean * mean).max(0.0);
    (mean, variance.sqrt())
}

/// Fraction of pixels in an area matching `predicate`; zero when empty.
fn ratio(img: &RgbImage, area: Area, predicate: impl Fn(&Rgb<u8>) -> bool) -> f64 {
    let (mut hits, mut count) = (0usize, 0usize);
    for pixel in area.pixels(img) {
        if predicate(pixel) {
            hits += 1;
        }
        count += 1;
    }
    if count == 0 { 0.0 } else { hits as f64 / count as f64 }
}

/// Measurements the pixel layer decides on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PixelStats {
    pub center_brightness: f64,
    pub center_std_dev: f64,
    pub top_bar_brightness: f64,
    pub bottom_bar_brightness: f64,
    pub gold_ratio: f64,
    pub red_ratio: f64,
    pub phone_brightness: f64,
    pub mission_strip_brightness: f64,
    pub timer_white_ratio: f64,
    pub hud_white_ratio: f64,
}

impl PixelStats {
    /// Measures a frame. `None` for an empty image.
    pub fn measure(img: &RgbImage, config: &PixelConfig) -> Option<Self> {
        if img.width() == 0 || img.height() == 0 {
            return None;
        }
        let white = |p: &Rgb<u8>| luma(p) > config.white_level;

        let (center_brightness, center_std_dev) =
            luma_stats(img, Area::fraction(img, 0.25, 0.75, 0.25, 0.75));

        Some(Self {
            center_brightness,
            center_std_dev,
            top_bar_brightness: luma_stats(img, Area::fraction(img, 0.0, 0.1, 0.0, 1.0)).0,
            bottom_bar_brightness: luma_stats(img, Area::fraction(img, 0.9, 1.0, 0.0, 1.0)).0,
            gold_ratio: ratio(img, Area::fraction(img, 0.0, 0.2, 0.0, 1.0), is_banner_gold),
            red_ratio: ratio(img, Area::fraction(img, 0.0, 1.0, 0.0, 1.0), is_alert_red),
            phone_brightness: luma_stats(img, Area::fraction(img, 0.2, 0.8, 0.65, 1.0)).0,
            mission_strip_brightness: luma_stats(img, Area::fraction(img, 0.02, 0.12, 0.25, 0.75)).0,
            timer_white_ratio: ratio(img, Area::fraction(img, 0.85, 1.0, 0.8, 1.0), white),
            hud_white_ratio: ratio(img, Area::fraction(img, 0.01, 0.06, 0.78, 1.0), white),
        })
    }

    /// Money display shows HUD-white text.
    pub fn hud_visible(&self, config: &PixelConfig) -> bool {
        self.hud_white_ratio > config.hud_min_white_ratio
    }
}

/// First matching heuristic wins; `None` means the layer abstains.
pub fn classify(stats: &PixelStats, config: &PixelConfig) -> Option<StateDetectionResult> {
    let hud_visible = stats.hud_visible(config);
    let verdict = |state, confidence, reason: String| {
        StateDetectionResult::new(state, confidence, reason, DetectionSource::Pixel)
    };

    if stats.center_brightness < config.loading_max_brightness {
        return Some(
            verdict(
                GameState::Loading,
                config.loading_confidence,
                "Screen mostly black - loading".to_string(),
            )
            .with_hud(false),
        );
    }

    if stats.top_bar_brightness < config.letterbox_max_brightness
        && stats.bottom_bar_brightness < config.letterbox_max_brightness
        && stats.center_brightness > config.cutscene_min_center_brightness
    {
        return Some(
            verdict(
                GameState::Cutscene,
                config.cutscene_confidence,
                "Black bars detected - cutscene".to_string(),
            )
            .with_hud(false),
        );
    }

    if stats.gold_ratio > config.gold_min_ratio {
        return Some(
            verdict(
                GameState::MissionComplete,
                config.mission_passed_confidence,
                format!("Yellow banner detected ({:.1}%)", stats.gold_ratio * 100.0),
            )
            .with_hud(hud_visible),
        );
    }

    if stats.red_ratio > config.red_min_ratio {
        return Some(
            verdict(
                GameState::MissionFailed,
                config.mission_failed_confidence,
                format!("Red elements detected ({:.1}%)", stats.red_ratio * 100.0),
            )
            .with_hud(hud_visible),
        );
    }

    if stats.center_brightness < config.menu_max_brightness
        && stats.center_std_dev < config.menu_max_std_dev
    {
        return Some(
            verdict(
                GameState::Menu,
                config.menu_confidence,
                "Menu overlay detected".to_string(),
            )
            .with_hud(false),
        );
    }

    if stats.phone_brightness > config.phone_min_brightness && !hud_visible {
        return Some(
            verdict(
                GameState::Phone,
                config.phone_confidence,
                "Phone UI detected".to_string(),
            )
            .with_hud(false),
        );
    }

    let timer_visible = stats.timer_white_ratio > config.timer_min_white_ratio;
    if timer_visible || stats.mission_strip_brightness > config.mission_strip_min_brightness {
        let mut result = verdict(
            GameState::MissionActive,
            config.mission_active_confidence,
            "Mission indicators visible".to_string(),
        )
        .with_hud(hud_visible);
        result.timer_visible = timer_visible;
        return Some(result);
    }

    if hud_visible {
        return Some(verdict(
            GameState::Idle,
            config.idle_confidence,
            "HUD visible, no mission indicators".to_string(),
        ));
    }

    None
}
