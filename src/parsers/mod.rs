//! Fault-tolerant parsers for recognized screen text.
//!
//! Every parser is total: malformed or empty input yields an empty reading
//! carrying the raw text, never an error.

pub mod business;
pub mod mission;
pub mod money;
pub mod normalize;
pub mod timer;

pub use business::{BusinessParser, BusinessReading, BusinessType};
pub use mission::{MissionParser, MissionReading, MissionType};
pub use money::{MoneyLimits, MoneyParser, MoneyReading};
pub use normalize::{ConfusionTable, TextNormalizer};
pub use timer::{TimerParser, TimerReading};
