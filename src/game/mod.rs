//! Game state tracking.

pub mod machine;
pub mod state;

pub use machine::{
    expected_transitions, is_transition_expected, GameStateMachine, ListenerId, MachineConfig,
    StateListener,
};
pub use state::{GameState, StateContext, StateTransition};
