//! Template layer: normalized cross-correlation against UI reference images.
//!
//! Scores follow the zero-mean normalized correlation coefficient
//! (`TM_CCOEFF_NORMED`), computed on grayscale. Frames and templates can be
//! downscaled together to keep the search cheap; reported locations are in
//! full-resolution frame coordinates. Searches too large to score every
//! placement run coarse-to-fine over an image pyramid.

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// Directory of `<name>.png` templates; none loaded when unset
    pub dir: Option<PathBuf>,
    pub recursive: bool,
    pub default_threshold: f32,
    /// Scale applied to frames and templates before matching (1.0 = off)
    pub match_scale: f32,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            dir: None,
            recursive: false,
            default_threshold: 0.8,
            match_scale: 0.5,
        }
    }
}

/// Outcome of matching one template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub matched: bool,
    pub confidence: f32,
    /// `(x, y)` of the top-left corner in frame coordinates
    pub location: (u32, u32),
    pub template_name: String,
}

/// A set of named templates the classifier can search for.
pub trait TemplateLibrary {
    /// Best match above threshold among `names`, if any.
    fn match_any(&self, image: &RgbImage, names: &[&str], threshold: Option<f32>)
        -> Option<MatchResult>;

    fn is_empty(&self) -> bool;
}

/// Placements times template pixels above which the search goes coarse-to-fine.
const MAX_DIRECT_WORK: u64 = 4_000_000;
/// Pyramid levels stop before the template's short side drops below this.
const MIN_PYRAMID_SIDE: u32 = 8;
/// Neighbourhood searched around an upsampled candidate at each finer level.
const REFINE_RADIUS: u32 = 2;
/// Coarse peaks followed down the pyramid when looking for the best placement.
const BEST_SEEDS: usize = 4;
/// Cap on coarse peaks followed when collecting every placement.
const MAX_SEEDS: usize = 64;
/// Coarse scores this far below the threshold still seed a refinement.
const COARSE_SLACK: f32 = 0.25;

/// Correlation scores for every placement of a template.
struct ScoreMap {
    width: u32,
    scores: Vec<f32>,
}

impl ScoreMap {
    fn coords(&self, i: usize) -> (u32, u32) {
        ((i as u32) % self.width, (i as u32) / self.width)
    }

    fn best(&self) -> Option<(u32, u32, f32)> {
        self.scores
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f32)>, (i, &score)| match best {
                Some((_, s)) if s >= score => best,
                _ => Some((i, score)),
            })
            .map(|(i, score)| {
                let (x, y) = self.coords(i);
                (x, y, score)
            })
    }

    /// Highest-scoring placements at or above `floor`, at most `limit`,
    /// skipping any within the refine radius of one already taken.
    fn peaks(&self, limit: usize, floor: f32) -> Vec<(u32, u32)> {
        let mut order: Vec<usize> = (0..self.scores.len())
            .filter(|&i| self.scores[i] >= floor)
            .collect();
        order.sort_by(|&a, &b| self.scores[b].total_cmp(&self.scores[a]));

        let mut picked: Vec<(u32, u32)> = Vec::new();
        for i in order {
            if picked.len() >= limit {
                break;
            }
            let (x, y) = self.coords(i);
            let near = picked
                .iter()
                .any(|&(px, py)| px.abs_diff(x) <= REFINE_RADIUS && py.abs_diff(y) <= REFINE_RADIUS);
            if !near {
                picked.push((x, y));
            }
        }
        picked
    }
}

/// Summed-area tables of pixel values and squared values.
struct IntegralImage {
    width: usize,
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
}

impl IntegralImage {
    fn new(img: &GrayImage) -> Self {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let stride = w + 1;
        let mut sum = vec![0.0; stride * (h + 1)];
        let mut sum_sq = vec![0.0; stride * (h + 1)];

        for (y, row_pixels) in img.as_raw().chunks_exact(w.max(1)).take(h).enumerate() {
            let (mut row, mut row_sq) = (0.0, 0.0);
            for (x, &p) in row_pixels.iter().enumerate() {
                let v = p as f64;
                row += v;
                row_sq += v * v;
                let idx = (y + 1) * stride + (x + 1);
                sum[idx] = sum[idx - stride] + row;
                sum_sq[idx] = sum_sq[idx - stride] + row_sq;
            }
        }

        Self { width: stride, sum, sum_sq }
    }

    /// Sum and squared sum over `[x, x+w) x [y, y+h)`.
    fn window(&self, x: usize, y: usize, w: usize, h: usize) -> (f64, f64) {
        let s = self.width;
        let at = |table: &[f64]| {
            table[(y + h) * s + (x + w)] - table[y * s + (x + w)] - table[(y + h) * s + x]
                + table[y * s + x]
        };
        (at(&self.sum), at(&self.sum_sq))
    }
}

/// One template scored against one frame at any placement.
struct Correlator<'a> {
    image: &'a GrayImage,
    integral: IntegralImage,
    t_zero: Vec<f64>,
    t_var: f64,
    n: f64,
    tw: u32,
    th: u32,
    out_w: u32,
    out_h: u32,
}

impl<'a> Correlator<'a> {
    fn new(image: &'a GrayImage, template: &GrayImage) -> Option<Self> {
        let (iw, ih) = image.dimensions();
        let (tw, th) = template.dimensions();
        if tw == 0 || th == 0 || tw > iw || th > ih {
            return None;
        }

        let n = (tw * th) as f64;
        let t_mean = template.pixels().map(|p| p[0] as f64).sum::<f64>() / n;
        let t_zero: Vec<f64> = template.pixels().map(|p| p[0] as f64 - t_mean).collect();
        let t_var = t_zero.iter().map(|v| v * v).sum();

        Some(Self {
            image,
            integral: IntegralImage::new(image),
            t_zero,
            t_var,
            n,
            tw,
            th,
            out_w: iw - tw + 1,
            out_h: ih - th + 1,
        })
    }

    fn score(&self, x: u32, y: u32) -> f32 {
        let (tw, th) = (self.tw as usize, self.th as usize);
        let (x, y) = (x as usize, y as usize);
        let (sum, sum_sq) = self.integral.window(x, y, tw, th);
        let i_var = sum_sq - sum * sum / self.n;
        let denom = (self.t_var * i_var).sqrt();
        if self.t_var <= f64::EPSILON || i_var <= f64::EPSILON || !denom.is_finite() {
            return 0.0;
        }

        let raw = self.image.as_raw();
        let iw = self.image.width() as usize;
        let numerator: f64 = self
            .t_zero
            .chunks_exact(tw)
            .enumerate()
            .map(|(ty, t_row)| {
                let start = (y + ty) * iw + x;
                raw[start..start + tw]
                    .iter()
                    .zip(t_row)
                    .map(|(&p, &t)| p as f64 * t)
                    .sum::<f64>()
            })
            .sum();

        (numerator / denom).clamp(-1.0, 1.0) as f32
    }

    fn scores(&self) -> ScoreMap {
        let mut scores = Vec::with_capacity((self.out_w * self.out_h) as usize);
        for y in 0..self.out_h {
            for x in 0..self.out_w {
                scores.push(self.score(x, y));
            }
        }
        ScoreMap { width: self.out_w, scores }
    }

    /// Best placement within `radius` of `(x, y)`, and how many were scored.
    fn best_near(&self, x: u32, y: u32, radius: u32) -> ((u32, u32, f32), usize) {
        let (x, y) = (x.min(self.out_w - 1), y.min(self.out_h - 1));
        let (x0, x1) = (x.saturating_sub(radius), (x + radius).min(self.out_w - 1));
        let (y0, y1) = (y.saturating_sub(radius), (y + radius).min(self.out_h - 1));

        let mut best = (x, y, f32::NEG_INFINITY);
        let mut evaluated = 0;
        for cy in y0..=y1 {
            for cx in x0..=x1 {
                let score = self.score(cx, cy);
                evaluated += 1;
                if score > best.2 {
                    best = (cx, cy, score);
                }
            }
        }
        (best, evaluated)
    }
}

fn direct_work(frame: (u32, u32), template: (u32, u32)) -> u64 {
    if template.0 > frame.0 || template.1 > frame.1 {
        return 0;
    }
    let placements = (frame.0 - template.0 + 1) as u64 * (frame.1 - template.1 + 1) as u64;
    placements * template.0 as u64 * template.1 as u64
}

fn halve(img: &GrayImage) -> GrayImage {
    let (w, h) = ((img.width() / 2).max(1), (img.height() / 2).max(1));
    imageops::resize(img, w, h, FilterType::Triangle)
}

/// Halved frame/template pairs, finest first, until the direct search at
/// the coarsest level is within budget or the template gets too small.
fn pyramid(image: &GrayImage, template: &GrayImage) -> Vec<(GrayImage, GrayImage)> {
    let mut levels: Vec<(GrayImage, GrayImage)> = Vec::new();
    loop {
        let (frame, tpl) = levels
            .last()
            .map(|(f, t)| (f, t))
            .unwrap_or((image, template));
        let too_costly = direct_work(frame.dimensions(), tpl.dimensions()) > MAX_DIRECT_WORK;
        if !too_costly || tpl.width().min(tpl.height()) / 2 < MIN_PYRAMID_SIDE {
            break;
        }
        let next = (halve(frame), halve(tpl));
        levels.push(next);
    }
    levels
}

/// Outcome of [`search`].
struct Search {
    /// Full-resolution placements
    placements: Vec<(u32, u32, f32)>,
    /// Placements scored across every level
    evaluated: usize,
}

/// Finds the best placement (`floor` unset) or every placement scoring at
/// least `floor`. Small searches score every placement; larger ones score
/// the coarsest pyramid level fully and refine its peaks level by level.
fn search(image: &GrayImage, template: &GrayImage, floor: Option<f32>) -> Option<Search> {
    let coarser = pyramid(image, template);
    let levels: Vec<Correlator> = std::iter::once(Correlator::new(image, template))
        .chain(coarser.iter().map(|(f, t)| Correlator::new(f, t)))
        .collect::<Option<Vec<_>>>()?;
    let coarsest = levels.last()?;

    let scores = coarsest.scores();
    let mut evaluated = scores.scores.len();

    if levels.len() == 1 {
        let placements = match floor {
            None => scores.best().into_iter().collect(),
            Some(threshold) => scores
                .scores
                .iter()
                .enumerate()
                .filter(|(_, score)| **score >= threshold)
                .map(|(i, &score)| {
                    let (x, y) = scores.coords(i);
                    (x, y, score)
                })
                .collect(),
        };
        return Some(Search { placements, evaluated });
    }

    let seeds = match floor {
        None => scores.peaks(BEST_SEEDS, f32::NEG_INFINITY),
        Some(threshold) => scores.peaks(MAX_SEEDS, threshold - COARSE_SLACK),
    };

    let mut placements: Vec<(u32, u32, f32)> = Vec::new();
    for (x, y) in seeds {
        let mut found = (x, y, f32::NEG_INFINITY);
        for level in levels[..levels.len() - 1].iter().rev() {
            let (best, count) = level.best_near(found.0 * 2, found.1 * 2, REFINE_RADIUS);
            evaluated += count;
            found = best;
        }
        let duplicate = placements.iter().any(|p| (p.0, p.1) == (found.0, found.1));
        let passes = floor.is_none_or(|threshold| found.2 >= threshold);
        if passes && !duplicate {
            placements.push(found);
        }
    }

    if floor.is_none() {
        placements = placements
            .into_iter()
            .max_by(|a, b| a.2.total_cmp(&b.2))
            .into_iter()
            .collect();
    }
    Some(Search { placements, evaluated })
}

/// Named grayscale templates, stored pre-scaled by `match_scale`.
#[derive(Debug, Clone)]
pub struct TemplateMatcher {
    templates: HashMap<String, GrayImage>,
    default_threshold: f32,
    match_scale: f32,
}

impl Default for TemplateMatcher {
    fn default() -> Self {
        Self::new(&TemplateConfig::default())
    }
}

impl TemplateMatcher {
    pub fn new(config: &TemplateConfig) -> Self {
        let match_scale = if config.match_scale > 0.0 && config.match_scale < 1.0 {
            config.match_scale
        } else {
            1.0
        };
        Self {
            templates: HashMap::new(),
            default_threshold: config.default_threshold.clamp(0.0, 1.0),
            match_scale,
        }
    }

    /// Builds a matcher and loads the configured directory, if any.
    pub fn from_config(config: &TemplateConfig) -> Result<Self> {
        let mut matcher = Self::new(config);
        if let Some(dir) = &config.dir {
            matcher.load_templates_from_dir(dir, config.recursive)?;
        }
        Ok(matcher)
    }

    fn scaled(&self, img: GrayImage) -> GrayImage {
        if self.match_scale >= 1.0 {
            return img;
        }
        let w = ((img.width() as f32 * self.match_scale).round() as u32).max(1);
        let h = ((img.height() as f32 * self.match_scale).round() as u32).max(1);
        imageops::resize(&img, w, h, FilterType::Triangle)
    }

    fn prepare_frame(&self, image: &RgbImage) -> GrayImage {
        self.scaled(imageops::grayscale(image))
    }

    /// Adds an in-memory template under `name`, replacing any existing one.
    pub fn insert_template(&mut self, name: impl Into<String>, template: &RgbImage) {
        let scaled = self.scaled(imageops::grayscale(template));
        self.templates.insert(name.into(), scaled);
    }

    pub fn load_template(&mut self, name: &str, path: &Path) -> Result<()> {
        let template = image::open(path)
            .with_context(|| format!("Failed to load template {}", path.display()))?
            .to_rgb8();
        self.insert_template(name, &template);
        debug!("Loaded template '{}' from {}", name, path.display());
        Ok(())
    }

    /// Loads every `*.png` in `dir`, named by file stem. Unreadable files
    /// are skipped with a warning. Returns the number loaded.
    pub fn load_templates_from_dir(&mut self, dir: &Path, recursive: bool) -> Result<usize> {
        if !dir.is_dir() {
            return Err(anyhow!("Template directory not found: {}", dir.display()));
        }

        let max_depth = if recursive { usize::MAX } else { 1 };
        let mut count = 0;

        for entry in WalkDir::new(dir).max_depth(max_depth).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Error walking template directory: {}", e);
                    continue;
                }
            };
            let path = entry.path();
            let is_png = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
            if !entry.file_type().is_file() || !is_png {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };

            match self.load_template(name, path) {
                Ok(()) => count += 1,
                Err(e) => warn!("{:#}", e),
            }
        }

        info!("Loaded {} templates from {}", count, dir.display());
        Ok(count)
    }

    pub fn set_default_threshold(&mut self, threshold: f32) {
        self.default_threshold = threshold.clamp(0.0, 1.0);
    }

    pub fn default_threshold(&self) -> f32 {
        self.default_threshold
    }

    pub fn loaded_templates(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn to_frame_coords(&self, x: u32, y: u32) -> (u32, u32) {
        (
            (x as f32 / self.match_scale).round() as u32,
            (y as f32 / self.match_scale).round() as u32,
        )
    }

    fn match_prepared(&self, frame: &GrayImage, name: &str, threshold: f32) -> MatchResult {
        let best = self
            .templates
            .get(name)
            .and_then(|template| search(frame, template, None))
            .and_then(|found| {
                debug!("Template '{}': scored {} placements", name, found.evaluated);
                found.placements.first().copied()
            });

        match best {
            Some((x, y, score)) => MatchResult {
                matched: score >= threshold,
                confidence: score,
                location: self.to_frame_coords(x, y),
                template_name: name.to_string(),
            },
            None => MatchResult {
                matched: false,
                confidence: 0.0,
                location: (0, 0),
                template_name: name.to_string(),
            },
        }
    }

    /// Best placement of one template. Unknown names never match.
    pub fn match_template(&self, image: &RgbImage, name: &str, threshold: Option<f32>) -> MatchResult {
        let threshold = threshold.unwrap_or(self.default_threshold);
        self.match_prepared(&self.prepare_frame(image), name, threshold)
    }

    /// Every placement scoring at or above the threshold, in row-major order.
    pub fn match_all(&self, image: &RgbImage, name: &str, threshold: Option<f32>) -> Vec<MatchResult> {
        let threshold = threshold.unwrap_or(self.default_threshold);
        let Some(template) = self.templates.get(name) else {
            return Vec::new();
        };
        let frame = self.prepare_frame(image);
        let Some(mut found) = search(&frame, template, Some(threshold)) else {
            return Vec::new();
        };
        found.placements.sort_by_key(|&(x, y, _)| (y, x));

        found
            .placements
            .into_iter()
            .map(|(x, y, score)| MatchResult {
                matched: true,
                confidence: score,
                location: self.to_frame_coords(x, y),
                template_name: name.to_string(),
            })
            .collect()
    }
}

impl TemplateLibrary for TemplateMatcher {
    fn match_any(
        &self,
        image: &RgbImage,
        names: &[&str],
        threshold: Option<f32>,
    ) -> Option<MatchResult> {
        if self.templates.is_empty() {
            return None;
        }
        let threshold = threshold.unwrap_or(self.default_threshold);
        let frame = self.prepare_frame(image);

        let mut best: Option<MatchResult> = None;
        for name in names {
            let result = self.match_prepared(&frame, name, threshold);
            let better = best
                .as_ref()
                .is_none_or(|b| result.confidence > b.confidence);
            if result.matched && better {
                best = Some(result);
            }
        }
        best
    }

    fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
