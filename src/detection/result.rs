use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::game::GameState;

/// Which layer produced a detection result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    Pixel,
    Keyword,
    Template,
    /// Synthesized by the combiner to hold the previous mission state
    Hysteresis,
    /// No layer produced a candidate
    None,
}

/// One detection verdict for a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDetectionResult {
    pub state: GameState,
    /// 0.0 to 1.0
    pub confidence: f32,
    pub reason: String,
    pub source: DetectionSource,
    pub mission_text: String,
    pub objective_text: String,
    pub timer_visible: bool,
    pub hud_visible: bool,
}

impl StateDetectionResult {
    pub fn new(
        state: GameState,
        confidence: f32,
        reason: impl Into<String>,
        source: DetectionSource,
    ) -> Self {
        Self {
            state,
            confidence: confidence.clamp(0.0, 1.0),
            reason: reason.into(),
            source,
            mission_text: String::new(),
            objective_text: String::new(),
            timer_visible: false,
            hud_visible: true,
        }
    }

    pub fn with_hud(mut self, hud_visible: bool) -> Self {
        self.hud_visible = hud_visible;
        self
    }

    pub fn with_mission_text(mut self, text: impl Into<String>) -> Self {
        self.mission_text = text.into();
        self
    }

    pub fn with_objective_text(mut self, text: impl Into<String>) -> Self {
        self.objective_text = text.into();
        self
    }
}

/// Rolling memory the classifier keeps between frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionContext {
    pub last_state: GameState,
    pub last_state_time: DateTime<Utc>,
    /// Frames in a row (after the first) that produced `last_state`
    pub consecutive_same_state: u32,
    pub last_mission_text: String,
    pub in_mission_since: Option<DateTime<Utc>>,
}

impl Default for DetectionContext {
    fn default() -> Self {
        Self {
            last_state: GameState::Unknown,
            last_state_time: Utc::now(),
            consecutive_same_state: 0,
            last_mission_text: String::new(),
            in_mission_since: None,
        }
    }
}

impl DetectionContext {
    /// Folds one final verdict into the context.
    pub fn update(&mut self, result: &StateDetectionResult) {
        let now = Utc::now();

        if result.state == self.last_state {
            self.consecutive_same_state = self.consecutive_same_state.saturating_add(1);
        } else {
            self.consecutive_same_state = 0;

            if result.state == GameState::MissionActive {
                self.in_mission_since = Some(now);
            } else if !matches!(
                result.state,
                GameState::Loading | GameState::Cutscene
            ) {
                self.in_mission_since = None;
            }
        }

        self.last_state = result.state;
        self.last_state_time = now;

        if !result.mission_text.is_empty() {
            self.last_mission_text = result.mission_text.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(state: GameState) -> StateDetectionResult {
        StateDetectionResult::new(state, 0.8, "test", DetectionSource::Pixel)
    }

    #[test]
    fn test_confidence_is_clamped() {
        let result = StateDetectionResult::new(GameState::Idle, 1.7, "x", DetectionSource::Pixel);
        assert_eq!(result.confidence, 1.0);
        assert!(result.hud_visible);
    }

    #[test]
    fn test_consecutive_counter() {
        let mut context = DetectionContext::default();
        context.update(&verdict(GameState::Idle));
        assert_eq!(context.consecutive_same_state, 0);
        context.update(&verdict(GameState::Idle));
        context.update(&verdict(GameState::Idle));
        assert_eq!(context.consecutive_same_state, 2);
        context.update(&verdict(GameState::Menu));
        assert_eq!(context.consecutive_same_state, 0);
        assert_eq!(context.last_state, GameState::Menu);
    }

    #[test]
    fn test_consecutive_counter_saturates() {
        let mut context = DetectionContext::default();
        context.update(&verdict(GameState::Idle));
        context.consecutive_same_state = u32::MAX;
        context.update(&verdict(GameState::Idle));
        assert_eq!(context.consecutive_same_state, u32::MAX);
    }

    #[test]
    fn test_mission_start_survives_loading() {
        let mut context = DetectionContext::default();
        context.update(&verdict(GameState::MissionActive));
        let started = context.in_mission_since;
        assert!(started.is_some());

        context.update(&verdict(GameState::Loading));
        context.update(&verdict(GameState::Cutscene));
        assert_eq!(context.in_mission_since, started);

        context.update(&verdict(GameState::Idle));
        assert!(context.in_mission_since.is_none());
    }

    #[test]
    fn test_mission_text_only_overwritten_when_present() {
        let mut context = DetectionContext::default();
        context.update(&verdict(GameState::MissionActive).with_mission_text("go to the dock"));
        context.update(&verdict(GameState::MissionActive));
        assert_eq!(context.last_mission_text, "go to the dock");
    }
}
