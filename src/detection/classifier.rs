use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use super::keywords::{classify_text, KeywordConfig};
use super::pixel::{self, PixelConfig, PixelStats};
use super::result::{DetectionContext, DetectionSource, StateDetectionResult};
use super::template::{TemplateConfig, TemplateLibrary, TemplateMatcher};
use crate::game::GameState;
use crate::ocr::{NullRecognizer, Recognizer};

const MISSION_BANNER_TEMPLATES: &[&str] = &["mission_banner", "mission_passed", "mission_failed"];
const BUSINESS_TEMPLATES: &[&str] = &[
    "business_laptop",
    "business_computer",
    "mc_laptop",
    "bunker_laptop",
];

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub pixel: PixelConfig,
    pub keywords: KeywordConfig,
    /// Keyword results above this win over higher-scoring pixel results
    pub keyword_preferred_above: f32,
    /// Template results above this win over everything
    pub template_override_above: f32,
    pub template_threshold: f32,
    /// An Idle verdict below this does not end an active mission
    pub hysteresis_max_idle_confidence: f32,
    pub hysteresis_confidence: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            pixel: PixelConfig::default(),
            keywords: KeywordConfig::default(),
            keyword_preferred_above: 0.7,
            template_override_above: 0.85,
            template_threshold: 0.8,
            hysteresis_max_idle_confidence: 0.7,
            hysteresis_confidence: 0.6,
        }
    }
}

/// Multi-layer game state detector.
///
/// Each frame runs the pixel layer, the keyword layer (when text regions are
/// supplied and a recognizer is available) and the template layer, then
/// combines their candidates. The detection context is updated once per call.
pub struct StateClassifier {
    config: ClassifierConfig,
    recognizer: Arc<dyn Recognizer + Send + Sync>,
    templates: Box<dyn TemplateLibrary + Send>,
    context: DetectionContext,
}

impl Default for StateClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

impl StateClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            recognizer: Arc::new(NullRecognizer),
            templates: Box::new(TemplateMatcher::new(&TemplateConfig::default())),
            context: DetectionContext::default(),
        }
    }

    pub fn with_recognizer(mut self, recognizer: Arc<dyn Recognizer + Send + Sync>) -> Self {
        self.recognizer = recognizer;
        self
    }

    pub fn with_templates(mut self, templates: Box<dyn TemplateLibrary + Send>) -> Self {
        self.templates = templates;
        self
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Detects the state of a full frame. The optional crops are the mission
    /// strip and center prompt regions, recognized for the keyword layer.
    pub fn detect(
        &mut self,
        image: &RgbImage,
        mission_region: Option<&RgbImage>,
        center_region: Option<&RgbImage>,
    ) -> StateDetectionResult {
        let keyword = if mission_region.is_some() || center_region.is_some() {
            self.recognize_regions(mission_region, center_region)
                .and_then(|(mission, center)| {
                    classify_text(&mission, &center, &self.config.keywords)
                })
        } else {
            None
        };
        self.finish(image, keyword)
    }

    /// Like [`detect`](Self::detect), for callers that already hold the
    /// recognized text of the two regions.
    pub fn detect_with_text(
        &mut self,
        image: &RgbImage,
        mission_text: Option<&str>,
        center_text: Option<&str>,
    ) -> StateDetectionResult {
        let keyword = if mission_text.is_some() || center_text.is_some() {
            classify_text(
                mission_text.unwrap_or_default(),
                center_text.unwrap_or_default(),
                &self.config.keywords,
            )
        } else {
            None
        };
        self.finish(image, keyword)
    }

    pub fn context(&self) -> &DetectionContext {
        &self.context
    }

    pub fn reset_context(&mut self) {
        self.context = DetectionContext::default();
    }

    /// Text of both regions, or `None` when recognition is unavailable or
    /// fails for either one.
    fn recognize_regions(
        &self,
        mission_region: Option<&RgbImage>,
        center_region: Option<&RgbImage>,
    ) -> Option<(String, String)> {
        if !self.recognizer.is_available() {
            return None;
        }

        let recognize = |region: Option<&RgbImage>| -> Option<String> {
            let Some(region) = region else {
                return Some(String::new());
            };
            match self.recognizer.recognize(region) {
                Ok(result) => Some(result.text),
                Err(e) => {
                    warn!("Text recognition failed: {:#}", e);
                    None
                }
            }
        };

        Some((recognize(mission_region)?, recognize(center_region)?))
    }

    fn finish(&mut self, image: &RgbImage, keyword: Option<StateDetectionResult>) -> StateDetectionResult {
        let stats = PixelStats::measure(image, &self.config.pixel);
        let pixel = stats
            .as_ref()
            .and_then(|stats| pixel::classify(stats, &self.config.pixel));
        let hud_visible = stats.is_some_and(|stats| stats.hud_visible(&self.config.pixel));
        let template = self.check_templates(image);

        let result = self.combine(pixel, keyword, template, hud_visible);
        debug!(
            "Detected {} ({:.2}, {:?}): {}",
            result.state, result.confidence, result.source, result.reason
        );

        self.context.update(&result);
        result
    }

    fn check_templates(&self, image: &RgbImage) -> Option<StateDetectionResult> {
        if self.templates.is_empty() {
            return None;
        }
        let threshold = Some(self.config.template_threshold);

        if let Some(found) = self
            .templates
            .match_any(image, MISSION_BANNER_TEMPLATES, threshold)
        {
            let state = if found.template_name.contains("passed") {
                GameState::MissionComplete
            } else if found.template_name.contains("failed") {
                GameState::MissionFailed
            } else {
                GameState::MissionActive
            };
            return Some(StateDetectionResult::new(
                state,
                found.confidence,
                format!("Matched template: {}", found.template_name),
                DetectionSource::Template,
            ));
        }

        self.templates
            .match_any(image, BUSINESS_TEMPLATES, threshold)
            .map(|found| {
                StateDetectionResult::new(
                    GameState::BusinessComputer,
                    found.confidence,
                    format!("Matched template: {}", found.template_name),
                    DetectionSource::Template,
                )
            })
    }

    fn combine(
        &self,
        pixel: Option<StateDetectionResult>,
        keyword: Option<StateDetectionResult>,
        template: Option<StateDetectionResult>,
        hud_visible: bool,
    ) -> StateDetectionResult {
        let config = &self.config;

        let mut candidates: Vec<&StateDetectionResult> =
            [&pixel, &keyword, &template].into_iter().flatten().collect();
        // Stable: equal confidences keep pixel, keyword, template order
        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let Some(mut best) = candidates.first().copied() else {
            return StateDetectionResult::new(
                GameState::Unknown,
                0.0,
                "No clear indicators",
                DetectionSource::None,
            )
            .with_hud(hud_visible);
        };

        if let Some(keyword) = keyword.as_ref().filter(|k| k.confidence > config.keyword_preferred_above) {
            best = keyword;
        }
        if let Some(template) = template.as_ref().filter(|t| t.confidence > config.template_override_above) {
            best = template;
        }

        if self.context.last_state == GameState::MissionActive
            && best.state == GameState::Idle
            && best.confidence < config.hysteresis_max_idle_confidence
        {
            return StateDetectionResult::new(
                GameState::MissionActive,
                config.hysteresis_confidence,
                "Maintaining mission state",
                DetectionSource::Hysteresis,
            )
            .with_mission_text(best.mission_text.clone())
            .with_hud(best.hud_visible);
        }

        best.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::pixel::tests::idle_frame;
    use crate::detection::template::MatchResult;
    use crate::game::GameStateMachine;
    use crate::ocr::OcrResult;
    use anyhow::{bail, Result};
    use image::Rgb;

    struct ScriptedRecognizer(&'static str);

    impl Recognizer for ScriptedRecognizer {
        fn is_available(&self) -> bool {
            true
        }

        fn recognize(&self, _image: &RgbImage) -> Result<OcrResult> {
            Ok(OcrResult {
                text: self.0.to_string(),
                confidence: 0.9,
                words: Vec::new(),
            })
        }
    }

    struct BrokenRecognizer;

    impl Recognizer for BrokenRecognizer {
        fn is_available(&self) -> bool {
            true
        }

        fn recognize(&self, _image: &RgbImage) -> Result<OcrResult> {
            bail!("tesseract exited with status 1")
        }
    }

    /// Library that always reports one fixed match.
    struct FixedTemplates(&'static str, f32);

    impl TemplateLibrary for FixedTemplates {
        fn match_any(
            &self,
            _image: &RgbImage,
            names: &[&str],
            _threshold: Option<f32>,
        ) -> Option<MatchResult> {
            names.contains(&self.0).then(|| MatchResult {
                matched: true,
                confidence: self.1,
                location: (0, 0),
                template_name: self.0.to_string(),
            })
        }

        fn is_empty(&self) -> bool {
            false
        }
    }

    fn blank_frame() -> RgbImage {
        RgbImage::from_pixel(100, 100, Rgb([70, 70, 70]))
    }

    #[test]
    fn test_no_candidates_is_unknown() {
        let mut classifier = StateClassifier::default();
        let result = classifier.detect(&blank_frame(), None, None);
        assert_eq!(result.state, GameState::Unknown);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.reason, "No clear indicators");
        assert_eq!(result.source, DetectionSource::None);
        assert!(!result.hud_visible);
        assert_eq!(classifier.context().last_state, GameState::Unknown);
    }

    #[test]
    fn test_pixel_only() {
        let mut classifier = StateClassifier::default();
        let result = classifier.detect(&idle_frame(), None, None);
        assert_eq!(result.state, GameState::Idle);
        assert_eq!(result.source, DetectionSource::Pixel);
    }

    #[test]
    fn test_keyword_preferred_over_pixel() {
        let mut classifier = StateClassifier::default();
        let result = classifier.detect_with_text(&idle_frame(), Some("deliver the product"), None);
        assert_eq!(result.state, GameState::Selling);
        assert_eq!(result.source, DetectionSource::Keyword);
    }

    #[test]
    fn test_hysteresis_holds_mission() {
        let mut classifier = StateClassifier::default();
        let first = classifier.detect_with_text(&idle_frame(), Some("go to the marker"), None);
        assert_eq!(first.state, GameState::MissionActive);
        assert_eq!(classifier.context().last_state, GameState::MissionActive);

        let held = classifier.detect(&idle_frame(), None, None);
        assert_eq!(held.state, GameState::MissionActive);
        assert_eq!(held.confidence, 0.6);
        assert_eq!(held.reason, "Maintaining mission state");
        assert_eq!(held.source, DetectionSource::Hysteresis);
        assert!(held.hud_visible);
        assert_eq!(classifier.context().consecutive_same_state, 1);

        classifier.reset_context();
        let released = classifier.detect(&idle_frame(), None, None);
        assert_eq!(released.state, GameState::Idle);
    }

    #[test]
    fn test_recognizer_text_feeds_keywords() {
        let mut classifier = StateClassifier::default()
            .with_recognizer(Arc::new(ScriptedRecognizer("MISSION PASSED")));
        let crop = RgbImage::new(20, 5);
        let result = classifier.detect(&idle_frame(), Some(&crop), None);
        assert_eq!(result.state, GameState::MissionComplete);
        assert_eq!(result.confidence, 0.85);
    }

    #[test]
    fn test_recognizer_failure_abstains() {
        let mut classifier =
            StateClassifier::default().with_recognizer(Arc::new(BrokenRecognizer));
        let crop = RgbImage::new(20, 5);
        let result = classifier.detect(&idle_frame(), Some(&crop), Some(&crop));
        assert_eq!(result.state, GameState::Idle);
        assert_eq!(result.source, DetectionSource::Pixel);
    }

    #[test]
    fn test_unavailable_recognizer_abstains() {
        let mut classifier = StateClassifier::default();
        let crop = RgbImage::new(20, 5);
        let result = classifier.detect(&idle_frame(), Some(&crop), None);
        assert_eq!(result.source, DetectionSource::Pixel);
    }

    #[test]
    fn test_strong_template_overrides_keyword() {
        let mut classifier = StateClassifier::default()
            .with_templates(Box::new(FixedTemplates("mission_failed", 0.93)));
        let result = classifier.detect_with_text(&idle_frame(), Some("deliver the product"), None);
        assert_eq!(result.state, GameState::MissionFailed);
        assert_eq!(result.source, DetectionSource::Template);
        assert!(result.reason.contains("mission_failed"));
    }

    #[test]
    fn test_weak_template_loses_to_keyword() {
        let mut classifier = StateClassifier::default()
            .with_templates(Box::new(FixedTemplates("mc_laptop", 0.82)));
        let result = classifier.detect_with_text(&idle_frame(), Some("deliver the product"), None);
        assert_eq!(result.state, GameState::Selling);

        // Without text the template outranks the idle pixel verdict
        let result = classifier.detect(&idle_frame(), None, None);
        assert_eq!(result.state, GameState::BusinessComputer);
        assert_eq!(result.confidence, 0.82);
    }

    #[test]
    fn test_banner_template_states() {
        let mut classifier = StateClassifier::default()
            .with_templates(Box::new(FixedTemplates("mission_banner", 0.9)));
        let result = classifier.detect(&blank_frame(), None, None);
        assert_eq!(result.state, GameState::MissionActive);
    }

    #[test]
    fn test_real_matcher_finds_banner() {
        let banner = RgbImage::from_fn(10, 6, |x, y| {
            if (x + y) % 3 == 0 {
                Rgb([250, 250, 250])
            } else {
                Rgb([10, 10, 10])
            }
        });
        let mut matcher = TemplateMatcher::new(&TemplateConfig {
            match_scale: 1.0,
            ..TemplateConfig::default()
        });
        matcher.insert_template("mission_passed", &banner);

        let mut frame = blank_frame();
        image::imageops::replace(&mut frame, &banner, 40, 45);

        let mut classifier = StateClassifier::default().with_templates(Box::new(matcher));
        let result = classifier.detect(&frame, None, None);
        assert_eq!(result.state, GameState::MissionComplete);
        assert_eq!(result.source, DetectionSource::Template);
    }

    #[test]
    fn test_detection_drives_state_machine() {
        let mut classifier = StateClassifier::default();
        let mut machine = GameStateMachine::default();

        let idle = classifier.detect(&idle_frame(), None, None);
        machine.transition_to(idle.state, idle.reason.clone());
        assert_eq!(machine.state(), GameState::Idle);

        let selling = classifier.detect_with_text(&idle_frame(), Some("deliver the product"), None);
        machine.transition_to(selling.state, selling.reason.clone());

        assert_eq!(machine.state(), GameState::Selling);
        let last = &machine.get_recent_transitions(1)[0];
        assert_eq!(last.from_state, GameState::Idle);
        assert_eq!(last.to_state, GameState::Selling);
        assert!(last.trigger.contains("deliver the product"));
    }
}
