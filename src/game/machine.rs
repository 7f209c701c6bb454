//! Game state machine with an advisory transition table, bounded history
//! and transition listeners.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error, info, warn};

use super::state::{GameState, StateContext, StateTransition};
use crate::parsers::BusinessType;

/// Callback invoked synchronously after each transition is recorded.
pub type StateListener = Box<dyn FnMut(&StateTransition) -> anyhow::Result<()> + Send>;

/// Handle returned by [`GameStateMachine::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Maximum number of transitions kept in the history
    pub max_history: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self { max_history: 100 }
    }
}

/// Expected next states. Unknown on either side is always expected.
pub fn expected_transitions(state: GameState) -> &'static [GameState] {
    use GameState::*;
    match state {
        Unknown => &[Idle, Loading, Menu, MissionActive],
        Idle => &[
            Loading,
            MissionStarting,
            MissionActive,
            BusinessComputer,
            Menu,
            Phone,
            Selling,
            HeistPrep,
        ],
        Loading => &[Idle, MissionStarting, MissionActive, Cutscene, HeistFinale],
        MissionStarting => &[MissionActive, Loading, Idle],
        MissionActive => &[MissionComplete, MissionFailed, Loading, Cutscene, Menu],
        MissionComplete => &[Idle, Loading, MissionStarting],
        MissionFailed => &[Idle, Loading, MissionStarting],
        BusinessComputer => &[Idle, Selling, Menu],
        Selling => &[MissionComplete, MissionFailed, Idle, Loading],
        HeistPrep => &[MissionActive, MissionComplete, Idle, Loading],
        HeistFinale => &[MissionActive, MissionComplete, MissionFailed, Loading, Cutscene],
        Menu => &[Idle, MissionActive, BusinessComputer],
        Phone => &[Idle, MissionStarting],
        Cutscene => &[Idle, MissionActive, MissionComplete, Loading],
        Spectating => &[Idle, Loading],
    }
}

pub fn is_transition_expected(from: GameState, to: GameState) -> bool {
    from == GameState::Unknown
        || to == GameState::Unknown
        || expected_transitions(from).contains(&to)
}

/// Tracks the current game state.
///
/// The transition table is advisory: detection evidence is trusted over it,
/// so unexpected transitions are logged and still executed.
pub struct GameStateMachine {
    config: MachineConfig,
    context: StateContext,
    listeners: Vec<(ListenerId, StateListener)>,
    next_listener_id: u64,
}

impl Default for GameStateMachine {
    fn default() -> Self {
        Self::new(MachineConfig::default())
    }
}

impl std::fmt::Debug for GameStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameStateMachine")
            .field("state", &self.context.state)
            .field("history", &self.context.transitions.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl GameStateMachine {
    pub fn new(config: MachineConfig) -> Self {
        Self {
            config,
            context: StateContext::default(),
            listeners: Vec::new(),
            next_listener_id: 0,
        }
    }

    pub fn state(&self) -> GameState {
        self.context.state
    }

    pub fn context(&self) -> &StateContext {
        &self.context
    }

    /// Moves to `new_state`, records the transition and notifies listeners.
    ///
    /// Always returns `true`.
    pub fn transition_to(&mut self, new_state: GameState, trigger: impl Into<String>) -> bool {
        let current = self.context.state;
        let trigger = trigger.into();

        if !is_transition_expected(current, new_state) {
            warn!("Unexpected state transition: {} -> {}", current, new_state);
        }

        let now = Utc::now();
        let transition = StateTransition {
            from_state: current,
            to_state: new_state,
            timestamp: now,
            trigger,
        };

        let old = std::mem::take(&mut self.context);
        let mut transitions = old.transitions;
        transitions.push_back(transition.clone());
        while transitions.len() > self.config.max_history {
            transitions.pop_front();
        }

        let keep = new_state.keeps_mission_context();
        self.context = StateContext {
            state: new_state,
            entered_at: now,
            mission_name: old.mission_name.filter(|_| keep),
            business_type: old.business_type.filter(|_| keep),
            money_at_start: old.money_at_start.filter(|_| keep),
            transitions,
        };

        info!(
            "State transition: {} -> {} ({})",
            current, new_state, transition.trigger
        );

        self.notify(&transition);
        true
    }

    fn notify(&mut self, transition: &StateTransition) {
        for (id, listener) in self.listeners.iter_mut() {
            match catch_unwind(AssertUnwindSafe(|| listener(transition))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("State listener {:?} failed: {:#}", id, e),
                Err(_) => error!("State listener {:?} panicked", id),
            }
        }
    }

    pub fn set_mission_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        debug!("Mission name set: {}", name);
        let old = std::mem::take(&mut self.context);
        self.context = StateContext {
            mission_name: Some(name),
            ..old
        };
    }

    pub fn set_business_type(&mut self, business: BusinessType) {
        debug!("Business type set: {}", business);
        let old = std::mem::take(&mut self.context);
        self.context = StateContext {
            business_type: Some(business),
            ..old
        };
    }

    /// Money at the start of the current activity.
    pub fn set_money_at_start(&mut self, amount: i64) {
        let old = std::mem::take(&mut self.context);
        self.context = StateContext {
            money_at_start: Some(amount),
            ..old
        };
    }

    pub fn add_listener(&mut self, listener: StateListener) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners.push((id, listener));
        id
    }

    /// Returns false if no listener has this id.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// Up to `count` most recent transitions, newest first.
    pub fn get_recent_transitions(&self, count: usize) -> Vec<&StateTransition> {
        self.context.transitions.iter().rev().take(count).collect()
    }

    pub fn is_in_activity(&self) -> bool {
        self.context.state.is_activity()
    }

    /// True when a new activity could be started from the current state.
    pub fn is_available_for_activity(&self) -> bool {
        matches!(
            self.context.state,
            GameState::Idle | GameState::BusinessComputer
        )
    }

    pub fn time_in_state(&self) -> f64 {
        self.context.time_in_state()
    }

    /// Returns to a fresh Unknown context and discards history.
    /// Listeners stay registered.
    pub fn reset(&mut self) {
        self.context = StateContext::default();
        info!("State machine reset");
    }
}
