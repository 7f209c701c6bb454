//! One detection cycle per captured frame.
//!
//! The pipeline owns the classifier, the state machine and the value parsers
//! and runs them in the order a live capture loop would: detect, transition,
//! then read whatever values the current state makes visible.

pub mod queue;
pub mod worker;

pub use queue::{create_work_queue, queue_frames, FrameWorkItem};
pub use worker::{run_detection_worker, WorkerSummary};

use anyhow::Result;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, RelativeRect, ScreenRegions};
use crate::detection::{StateClassifier, StateDetectionResult, TemplateLibrary, TemplateMatcher};
use crate::game::{GameState, GameStateMachine, StateTransition};
use crate::ocr::{crop_region, Recognizer, TesseractRecognizer};
use crate::parsers::{
    BusinessParser, BusinessReading, MissionParser, MissionReading, MoneyParser, MoneyReading,
    TimerParser, TimerReading,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Detections at or below this never move the state machine
    pub transition_min_confidence: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            transition_min_confidence: 0.6,
        }
    }
}

/// Everything learned from one frame.
#[derive(Debug, Clone, Serialize)]
pub struct FrameReport {
    pub detection: StateDetectionResult,
    /// Machine state after this frame
    pub state: GameState,
    pub transition: Option<StateTransition>,
    pub money: Option<MoneyReading>,
    /// Difference from the previous accepted money reading
    pub money_change: i64,
    pub timer: Option<TimerReading>,
    pub mission: Option<MissionReading>,
    pub business: Option<BusinessReading>,
}

pub struct Pipeline {
    config: PipelineConfig,
    regions: ScreenRegions,
    recognizer: Arc<dyn Recognizer + Send + Sync>,
    classifier: StateClassifier,
    machine: GameStateMachine,
    money: MoneyParser,
    timer: TimerParser,
    mission: MissionParser,
    business: BusinessParser,
    current_money: Option<i64>,
}

impl Pipeline {
    pub fn new(
        config: &EngineConfig,
        recognizer: Arc<dyn Recognizer + Send + Sync>,
        templates: Box<dyn TemplateLibrary + Send>,
    ) -> Self {
        let classifier = StateClassifier::new(config.classifier.clone())
            .with_recognizer(Arc::clone(&recognizer))
            .with_templates(templates);

        Self {
            config: config.pipeline.clone(),
            regions: config.regions.clone(),
            recognizer,
            classifier,
            machine: GameStateMachine::new(config.machine.clone()),
            money: MoneyParser::new(config.money.clone()),
            timer: TimerParser::new(),
            mission: MissionParser::new(),
            business: BusinessParser::new(),
            current_money: None,
        }
    }

    /// Builds the Tesseract recognizer and loads the configured templates.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let recognizer = TesseractRecognizer::new(config.ocr.clone());
        if !recognizer.is_available() {
            warn!("Running without text recognition; only pixel and template layers are active");
        }
        let templates = TemplateMatcher::from_config(&config.templates)?;
        Ok(Self::new(config, Arc::new(recognizer), Box::new(templates)))
    }

    pub fn machine(&self) -> &GameStateMachine {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut GameStateMachine {
        &mut self.machine
    }

    pub fn classifier(&self) -> &StateClassifier {
        &self.classifier
    }

    pub fn business_parser(&self) -> &BusinessParser {
        &self.business
    }

    pub fn current_money(&self) -> Option<i64> {
        self.current_money
    }

    fn read_region(&self, frame: &RgbImage, region: &RelativeRect) -> Option<String> {
        if !self.recognizer.is_available() {
            return None;
        }
        let crop = crop_region(frame, region);
        if crop.width() == 0 || crop.height() == 0 {
            return None;
        }
        match self.recognizer.recognize(&crop) {
            Ok(result) => Some(result.text),
            Err(e) => {
                warn!("Text recognition failed: {:#}", e);
                None
            }
        }
    }

    pub fn process_frame(&mut self, frame: &RgbImage) -> FrameReport {
        let mission_crop = crop_region(frame, &self.regions.mission_text);
        let center_crop = crop_region(frame, &self.regions.center_prompt);
        let detection = self
            .classifier
            .detect(frame, Some(&mission_crop), Some(&center_crop));

        let transition = if detection.confidence > self.config.transition_min_confidence
            && detection.state != self.machine.state()
        {
            self.machine
                .transition_to(detection.state, detection.reason.clone());
            self.machine
                .get_recent_transitions(1)
                .into_iter()
                .next()
                .cloned()
        } else {
            None
        };

        let (money, money_change) = match self.read_money(frame) {
            Some((reading, change)) => (Some(reading), change),
            None => (None, 0),
        };

        let timer = if matches!(detection.state, GameState::MissionActive | GameState::Selling) {
            self.read_region(frame, &self.regions.timer)
                .map(|text| self.timer.parse(&text))
                .filter(TimerReading::has_value)
        } else {
            None
        };

        let mission = self.read_mission(&detection);
        let business = if detection.state == GameState::BusinessComputer {
            self.read_business(frame)
        } else {
            None
        };

        let activity_started = transition.as_ref().is_some_and(|t| t.to_state.is_activity());
        if let (true, Some(amount)) = (activity_started, self.current_money) {
            self.machine.set_money_at_start(amount);
        }

        FrameReport {
            detection,
            state: self.machine.state(),
            transition,
            money,
            money_change,
            timer,
            mission,
            business,
        }
    }

    fn read_money(&mut self, frame: &RgbImage) -> Option<(MoneyReading, i64)> {
        let text = self.read_region(frame, &self.regions.money)?;
        let reading = self.money.parse(&text);
        if !reading.has_value() || !self.money.validate_reading(&reading) {
            return None;
        }

        let value = reading.display_value();
        let change = match self.current_money.replace(value) {
            Some(previous) => {
                let change = value - previous;
                if change != 0 {
                    info!("Money change: ${} -> ${} ({:+})", previous, value, change);
                }
                change
            }
            None => {
                info!("Starting money: ${}", value);
                0
            }
        };
        Some((reading, change))
    }

    fn read_mission(&mut self, detection: &StateDetectionResult) -> Option<MissionReading> {
        if detection.mission_text.trim().is_empty() {
            return None;
        }
        let reading = self.mission.parse(&detection.mission_text);
        if !reading.has_mission() {
            return None;
        }

        if self.machine.state().is_activity() && self.machine.context().mission_name.is_none() {
            let name = if reading.mission_name.is_empty() {
                reading.mission_type.to_string()
            } else {
                reading.mission_name.clone()
            };
            self.machine.set_mission_name(name);
        }
        Some(reading)
    }

    fn read_business(&mut self, frame: &RgbImage) -> Option<BusinessReading> {
        let parts: Vec<String> = self
            .regions
            .business()
            .iter()
            .filter_map(|(_, region)| self.read_region(frame, region))
            .filter(|text| !text.trim().is_empty())
            .collect();
        if parts.is_empty() {
            return None;
        }

        let reading = self.business.parse(&parts.join(" "), None);
        if !reading.has_data() {
            debug!("Business screen without readable data");
            return None;
        }
        info!(
            "Business {}: stock {:?}%, supplies {:?}%, value {:?}",
            reading.business_type, reading.stock_level, reading.supply_level, reading.stock_value
        );
        self.machine.set_business_type(reading.business_type);
        Some(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::pixel::tests::idle_frame;
    use crate::ocr::{NullRecognizer, OcrResult};
    use crate::parsers::BusinessType;
    use image::Rgb;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const WIDTH: u32 = 400;
    const HEIGHT: u32 = 300;

    /// Answers by crop size, which identifies the screen region.
    #[derive(Default)]
    struct RegionRecognizer {
        texts: Mutex<HashMap<(u32, u32), String>>,
    }

    impl RegionRecognizer {
        fn set(&self, region: &RelativeRect, text: &str) {
            let (_, _, w, h) = region.to_pixels(WIDTH, HEIGHT);
            self.texts.lock().unwrap().insert((w, h), text.to_string());
        }
    }

    impl Recognizer for RegionRecognizer {
        fn is_available(&self) -> bool {
            true
        }

        fn recognize(&self, image: &RgbImage) -> Result<OcrResult> {
            let text = self
                .texts
                .lock()
                .unwrap()
                .get(&image.dimensions())
                .cloned()
                .unwrap_or_default();
            Ok(OcrResult {
                text,
                ..OcrResult::default()
            })
        }
    }

    fn frame() -> RgbImage {
        RgbImage::from_pixel(WIDTH, HEIGHT, Rgb([70, 70, 70]))
    }

    fn pipeline(recognizer: Arc<RegionRecognizer>) -> Pipeline {
        Pipeline::new(
            &EngineConfig::default(),
            recognizer,
            Box::new(TemplateMatcher::default()),
        )
    }

    #[test]
    fn test_sell_mission_cycle() {
        let regions = ScreenRegions::default();
        let recognizer = Arc::new(RegionRecognizer::default());
        recognizer.set(&regions.mission_text, "Deliver the product");
        recognizer.set(&regions.money, "$1,250,000");
        recognizer.set(&regions.timer, "05:30");

        let mut pipeline = pipeline(Arc::clone(&recognizer));
        let report = pipeline.process_frame(&frame());

        assert_eq!(report.detection.state, GameState::Selling);
        assert_eq!(report.state, GameState::Selling);
        let transition = report.transition.unwrap();
        assert_eq!(transition.from_state, GameState::Unknown);
        assert_eq!(transition.to_state, GameState::Selling);

        assert_eq!(report.money.unwrap().display_value(), 1_250_000);
        assert_eq!(report.money_change, 0);
        assert_eq!(report.timer.unwrap().total_seconds, 330);
        assert!(report.mission.is_some());
        assert!(report.business.is_none());

        let context = pipeline.machine().context();
        assert_eq!(context.money_at_start, Some(1_250_000));
        assert!(context.mission_name.is_some());
    }

    #[test]
    fn test_money_change_between_frames() {
        let regions = ScreenRegions::default();
        let recognizer = Arc::new(RegionRecognizer::default());
        recognizer.set(&regions.money, "$1,000,000");

        let mut pipeline = pipeline(Arc::clone(&recognizer));
        pipeline.process_frame(&frame());

        recognizer.set(&regions.money, "$1,025,000");
        let report = pipeline.process_frame(&frame());
        assert_eq!(report.money_change, 25_000);
        assert_eq!(pipeline.current_money(), Some(1_025_000));

        // Implausible jump is rejected and does not move the baseline
        recognizer.set(&regions.money, "$900,000,000");
        let report = pipeline.process_frame(&frame());
        assert!(report.money.is_none());
        assert_eq!(report.money_change, 0);
        assert_eq!(pipeline.current_money(), Some(1_025_000));
    }

    #[test]
    fn test_business_screen_cycle() {
        let regions = ScreenRegions::default();
        let recognizer = Arc::new(RegionRecognizer::default());
        recognizer.set(&regions.center_prompt, "Cocaine Lockup");
        // All three business regions share a size and read the same text
        recognizer.set(&regions.business_stock, "Cocaine Lockup Stock: 60% Supplies: 40%");

        let mut pipeline = pipeline(Arc::clone(&recognizer));
        let report = pipeline.process_frame(&frame());

        assert_eq!(report.state, GameState::BusinessComputer);
        let business = report.business.unwrap();
        assert_eq!(business.business_type, BusinessType::Cocaine);
        assert_eq!(business.stock_level, Some(60));
        assert_eq!(business.supply_level, Some(40));
        assert!(report.timer.is_none());
        assert!(pipeline.business_parser().last_reading(BusinessType::Cocaine).is_some());
        assert_eq!(
            pipeline.machine().context().business_type,
            Some(BusinessType::Cocaine)
        );
    }

    #[test]
    fn test_low_confidence_does_not_transition() {
        let mut pipeline = Pipeline::new(
            &EngineConfig::default(),
            Arc::new(NullRecognizer),
            Box::new(TemplateMatcher::default()),
        );
        let report = pipeline.process_frame(&idle_frame());

        assert_eq!(report.detection.state, GameState::Idle);
        assert!(report.transition.is_none());
        assert_eq!(report.state, GameState::Unknown);
        assert!(report.money.is_none());
    }

    #[test]
    fn test_same_state_is_not_repeated() {
        let regions = ScreenRegions::default();
        let recognizer = Arc::new(RegionRecognizer::default());
        recognizer.set(&regions.mission_text, "Deliver the product");

        let mut pipeline = pipeline(Arc::clone(&recognizer));
        assert!(pipeline.process_frame(&frame()).transition.is_some());
        assert!(pipeline.process_frame(&frame()).transition.is_none());
        assert_eq!(pipeline.machine().get_recent_transitions(10).len(), 1);
    }
}
