//! Game state detection and HUD value parsing.
//!
//! Frames go through a [`detection::StateClassifier`] whose verdicts drive a
//! [`game::GameStateMachine`]; the [`parsers`] turn recognized text into
//! money, timer, mission and business readings. [`pipeline::Pipeline`] wires
//! them together for one frame at a time.

pub mod config;
pub mod detection;
pub mod game;
pub mod ocr;
pub mod parsers;
pub mod paths;
pub mod pipeline;
