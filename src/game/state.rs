//! Game states and the records the state machine keeps about them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::parsers::BusinessType;

/// Discrete game states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameState {
    /// State cannot be determined
    #[default]
    Unknown,
    /// Free roam, no active mission
    Idle,
    /// Loading screen
    Loading,
    /// Mission lobby or intro
    MissionStarting,
    /// Mission in progress
    MissionActive,
    /// Mission passed screen
    MissionComplete,
    /// Mission failed screen
    MissionFailed,
    /// Business laptop or computer open
    BusinessComputer,
    /// Sell mission in progress
    Selling,
    HeistPrep,
    HeistFinale,
    /// Pause menu
    Menu,
    Phone,
    Cutscene,
    Spectating,
}

impl GameState {
    /// States whose mission, business and money context survives a transition into them.
    pub fn keeps_mission_context(self) -> bool {
        matches!(
            self,
            GameState::MissionActive
                | GameState::MissionComplete
                | GameState::MissionFailed
                | GameState::Loading
                | GameState::Cutscene
                | GameState::Selling
        )
    }

    /// States that count as a tracked activity in progress.
    pub fn is_activity(self) -> bool {
        matches!(
            self,
            GameState::MissionActive
                | GameState::Selling
                | GameState::HeistPrep
                | GameState::HeistFinale
        )
    }
}

impl std::fmt::Display for GameState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GameState::Unknown => write!(f, "Unknown"),
            GameState::Idle => write!(f, "Idle"),
            GameState::Loading => write!(f, "Loading"),
            GameState::MissionStarting => write!(f, "Mission starting"),
            GameState::MissionActive => write!(f, "Mission active"),
            GameState::MissionComplete => write!(f, "Mission complete"),
            GameState::MissionFailed => write!(f, "Mission failed"),
            GameState::BusinessComputer => write!(f, "Business computer"),
            GameState::Selling => write!(f, "Selling"),
            GameState::HeistPrep => write!(f, "Heist prep"),
            GameState::HeistFinale => write!(f, "Heist finale"),
            GameState::Menu => write!(f, "Menu"),
            GameState::Phone => write!(f, "Phone"),
            GameState::Cutscene => write!(f, "Cutscene"),
            GameState::Spectating => write!(f, "Spectating"),
        }
    }
}

/// One recorded state change. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from_state: GameState,
    pub to_state: GameState,
    pub timestamp: DateTime<Utc>,
    /// What caused the transition
    pub trigger: String,
}

/// Snapshot of the current state. The machine swaps in a new context on
/// every transition and every setter call instead of editing this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateContext {
    pub state: GameState,
    pub entered_at: DateTime<Utc>,
    pub mission_name: Option<String>,
    pub business_type: Option<BusinessType>,
    pub money_at_start: Option<i64>,
    /// Oldest first
    pub transitions: VecDeque<StateTransition>,
}

impl Default for StateContext {
    fn default() -> Self {
        Self {
            state: GameState::Unknown,
            entered_at: Utc::now(),
            mission_name: None,
            business_type: None,
            money_at_start: None,
            transitions: VecDeque::new(),
        }
    }
}

impl StateContext {
    /// Seconds since this state was entered.
    pub fn time_in_state(&self) -> f64 {
        let elapsed = Utc::now().signed_duration_since(self.entered_at);
        elapsed.num_milliseconds().max(0) as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(GameState::MissionActive.to_string(), "Mission active");
        assert_eq!(GameState::Unknown.to_string(), "Unknown");
    }

    #[test]
    fn test_mission_adjacent_states() {
        assert!(GameState::MissionComplete.keeps_mission_context());
        assert!(GameState::Selling.keeps_mission_context());
        assert!(!GameState::Idle.keeps_mission_context());
        assert!(!GameState::BusinessComputer.keeps_mission_context());
    }

    #[test]
    fn test_serializes_as_snake_case() {
        let json = serde_json::to_string(&GameState::BusinessComputer).unwrap();
        assert_eq!(json, "\"business_computer\"");
    }

    #[test]
    fn test_default_context() {
        let context = StateContext::default();
        assert_eq!(context.state, GameState::Unknown);
        assert!(context.transitions.is_empty());
        assert!(context.time_in_state() >= 0.0);
    }
}
