//! Keyword layer: classifies recognized on-screen text.
//!
//! Groups are checked in a fixed order and the first group with any keyword
//! contained in the text wins. Matching is plain substring containment over
//! lower-cased text.

use serde::{Deserialize, Serialize};

use super::result::{DetectionSource, StateDetectionResult};
use crate::game::GameState;

const MISSION_ACTIVE_KEYWORDS: &[&str] = &[
    "go to", "get to", "reach", "find", "locate", "steal", "take",
    "deliver", "drop off", "destroy", "eliminate", "kill", "protect",
    "defend", "escort", "wait", "survive", "escape", "hack", "collect",
    "pick up", "lose the cops", "lose wanted", "return to", "enter",
    "search", "investigate", "board", "drive", "fly", "land", "follow",
    "photograph", "source", "acquire", "intercept", "retrieve",
];

const MISSION_COMPLETE_KEYWORDS: &[&str] = &[
    "mission passed", "passed", "job complete", "completed",
    "delivered", "+rp", "+$", "reward", "success", "bonus",
    "well done", "objective complete", "contract complete",
];

const MISSION_FAILED_KEYWORDS: &[&str] = &[
    "mission failed", "failed", "wasted", "busted",
    "destroyed", "time ran out", "left the area", "abandoned",
    "product lost", "associate died", "target escaped",
];

const SELL_MISSION_KEYWORDS: &[&str] = &[
    "deliver the product", "deliver the goods", "drop off",
    "delivery vehicle", "sell mission", "product value",
    "deliver all", "remaining deliveries", "drop-off",
    "customer", "buyer", "deliveries remaining", "bonus",
];

const VIP_WORK_KEYWORDS: &[&str] = &[
    "vip work", "vip challenge", "headhunter", "sightseer",
    "hostile takeover", "executive search", "asset recovery",
    "ceo work", "special cargo", "vehicle cargo", "import",
    "export", "source vehicle", "targets remaining",
];

const HEIST_KEYWORDS: &[&str] = &[
    "heist", "finale", "setup", "prep", "scope", "cayo perico",
    "diamond casino", "doomsday", "pacific standard", "humane labs",
    "series a", "prison break", "fleeca", "apartment heist",
    "planning board", "support crew", "take", "cut",
];

const HEIST_FINALE_KEYWORDS: &[&str] = &["finale", "take", "cut"];
const HEIST_PREP_KEYWORDS: &[&str] = &["prep", "setup", "scope"];

const AGENCY_KEYWORDS: &[&str] = &[
    "security contract", "payphone hit", "dre", "short trip",
    "vip contract", "agency safe", "imani tech",
];

const AUTO_SHOP_KEYWORDS: &[&str] = &[
    "auto shop", "customer vehicle", "service", "exotic export",
    "contract", "union depository", "data", "prison",
];

const BUSINESS_KEYWORDS: &[&str] = &[
    "stock", "supplies", "product", "value", "production",
    "staff", "equipment", "security", "sell stock",
    "cocaine", "meth", "cash", "weed", "documents",
    "bunker", "nightclub", "warehouse", "acid lab",
    "popularity", "safe", "agency", "payphone",
];

/// Keyword groups in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordGroup {
    Completion,
    Failure,
    Selling,
    VipWork,
    Heist,
    Agency,
    AutoShop,
    BusinessComputer,
    MissionActive,
}

impl KeywordGroup {
    pub const ORDER: [KeywordGroup; 9] = [
        KeywordGroup::Completion,
        KeywordGroup::Failure,
        KeywordGroup::Selling,
        KeywordGroup::VipWork,
        KeywordGroup::Heist,
        KeywordGroup::Agency,
        KeywordGroup::AutoShop,
        KeywordGroup::BusinessComputer,
        KeywordGroup::MissionActive,
    ];

    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            KeywordGroup::Completion => MISSION_COMPLETE_KEYWORDS,
            KeywordGroup::Failure => MISSION_FAILED_KEYWORDS,
            KeywordGroup::Selling => SELL_MISSION_KEYWORDS,
            KeywordGroup::VipWork => VIP_WORK_KEYWORDS,
            KeywordGroup::Heist => HEIST_KEYWORDS,
            KeywordGroup::Agency => AGENCY_KEYWORDS,
            KeywordGroup::AutoShop => AUTO_SHOP_KEYWORDS,
            KeywordGroup::BusinessComputer => BUSINESS_KEYWORDS,
            KeywordGroup::MissionActive => MISSION_ACTIVE_KEYWORDS,
        }
    }

    fn description(self) -> &'static str {
        match self {
            KeywordGroup::Completion => "Mission complete",
            KeywordGroup::Failure => "Mission failed",
            KeywordGroup::Selling => "Sell mission",
            KeywordGroup::VipWork => "VIP work",
            KeywordGroup::Heist => "Heist-related",
            KeywordGroup::Agency => "Agency contract",
            KeywordGroup::AutoShop => "Auto shop contract",
            KeywordGroup::BusinessComputer => "Business UI",
            KeywordGroup::MissionActive => "Mission objective",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordConfig {
    pub completion_confidence: f32,
    pub failure_confidence: f32,
    pub selling_confidence: f32,
    pub vip_work_confidence: f32,
    pub heist_finale_confidence: f32,
    pub heist_prep_confidence: f32,
    pub heist_confidence: f32,
    pub agency_confidence: f32,
    pub auto_shop_confidence: f32,
    pub business_confidence: f32,
    pub mission_active_confidence: f32,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            completion_confidence: 0.85,
            failure_confidence: 0.85,
            selling_confidence: 0.8,
            vip_work_confidence: 0.8,
            heist_finale_confidence: 0.8,
            heist_prep_confidence: 0.8,
            heist_confidence: 0.75,
            agency_confidence: 0.8,
            auto_shop_confidence: 0.75,
            business_confidence: 0.75,
            mission_active_confidence: 0.7,
        }
    }
}

fn first_match(text: &str, keywords: &[&'static str]) -> Option<&'static str> {
    keywords.iter().copied().find(|kw| text.contains(kw))
}

/// Classifies the mission strip and center prompt text.
///
/// Returns `None` when both are blank or no group matches.
pub fn classify_text(
    mission_text: &str,
    center_text: &str,
    config: &KeywordConfig,
) -> Option<StateDetectionResult> {
    let mission_text = mission_text.trim().to_lowercase();
    let center_text = center_text.trim().to_lowercase();
    let combined = format!("{} {}", mission_text, center_text);
    if combined.trim().is_empty() {
        return None;
    }

    for group in KeywordGroup::ORDER {
        let Some(keyword) = first_match(&combined, group.keywords()) else {
            continue;
        };

        let (state, confidence, description, keyword) = match group {
            KeywordGroup::Heist => {
                if let Some(kw) = first_match(&combined, HEIST_FINALE_KEYWORDS) {
                    (GameState::HeistFinale, config.heist_finale_confidence, "Heist finale", kw)
                } else if let Some(kw) = first_match(&combined, HEIST_PREP_KEYWORDS) {
                    (GameState::HeistPrep, config.heist_prep_confidence, "Heist prep", kw)
                } else {
                    (GameState::MissionActive, config.heist_confidence, group.description(), keyword)
                }
            }
            KeywordGroup::Completion => {
                (GameState::MissionComplete, config.completion_confidence, group.description(), keyword)
            }
            KeywordGroup::Failure => {
                (GameState::MissionFailed, config.failure_confidence, group.description(), keyword)
            }
            KeywordGroup::Selling => {
                (GameState::Selling, config.selling_confidence, group.description(), keyword)
            }
            KeywordGroup::VipWork => {
                (GameState::MissionActive, config.vip_work_confidence, group.description(), keyword)
            }
            KeywordGroup::Agency => {
                (GameState::MissionActive, config.agency_confidence, group.description(), keyword)
            }
            KeywordGroup::AutoShop => {
                (GameState::MissionActive, config.auto_shop_confidence, group.description(), keyword)
            }
            KeywordGroup::BusinessComputer => (
                GameState::BusinessComputer,
                config.business_confidence,
                group.description(),
                keyword,
            ),
            KeywordGroup::MissionActive => (
                GameState::MissionActive,
                config.mission_active_confidence,
                group.description(),
                keyword,
            ),
        };

        let reason = format!("{} text detected: \"{}\"", description, keyword);
        let result =
            StateDetectionResult::new(state, confidence, reason, DetectionSource::Keyword);

        // Business screens carry no mission text; objectives are only
        // meaningful for sell missions and generic objectives
        let result = match group {
            KeywordGroup::BusinessComputer => result,
            KeywordGroup::Selling | KeywordGroup::MissionActive => result
                .with_mission_text(mission_text.clone())
                .with_objective_text(center_text.clone()),
            _ => result.with_mission_text(mission_text.clone()),
        };
        return Some(result);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(mission: &str, center: &str) -> Option<StateDetectionResult> {
        classify_text(mission, center, &KeywordConfig::default())
    }

    #[test]
    fn test_blank_text_abstains() {
        assert!(classify("", "").is_none());
        assert!(classify("   ", "\n").is_none());
    }

    #[test]
    fn test_no_keywords_abstains() {
        assert!(classify("zzz", "qqq").is_none());
    }

    #[test]
    fn test_completion_beats_everything() {
        let result = classify("MISSION PASSED", "deliver the product").unwrap();
        assert_eq!(result.state, GameState::MissionComplete);
        assert_eq!(result.confidence, 0.85);
        assert!(result.reason.contains("mission passed"));
        assert_eq!(result.source, DetectionSource::Keyword);
    }

    #[test]
    fn test_failure() {
        let result = classify("", "WASTED").unwrap();
        assert_eq!(result.state, GameState::MissionFailed);
    }

    #[test]
    fn test_selling_carries_texts() {
        let result = classify("Deliver the product", "").unwrap();
        assert_eq!(result.state, GameState::Selling);
        assert_eq!(result.confidence, 0.8);
        assert!(result.reason.contains("Sell mission"));
        assert!(result.reason.contains("deliver the product"));
        assert_eq!(result.mission_text, "deliver the product");
    }

    #[test]
    fn test_vip_work_is_mission_active() {
        let result = classify("Headhunter", "").unwrap();
        assert_eq!(result.state, GameState::MissionActive);
        assert_eq!(result.confidence, 0.8);
    }

    #[test]
    fn test_heist_sub_classification() {
        let finale = classify("Heist Finale", "").unwrap();
        assert_eq!(finale.state, GameState::HeistFinale);

        let prep = classify("Heist prep: scope the vault", "").unwrap();
        assert_eq!(prep.state, GameState::HeistPrep);

        let generic = classify("Fleeca job", "").unwrap();
        assert_eq!(generic.state, GameState::MissionActive);
        assert_eq!(generic.confidence, 0.75);
    }

    #[test]
    fn test_business_screen_has_no_mission_text() {
        let result = classify("", "Supplies 40%").unwrap();
        assert_eq!(result.state, GameState::BusinessComputer);
        assert_eq!(result.confidence, 0.75);
        assert!(result.mission_text.is_empty());
    }

    #[test]
    fn test_generic_objective() {
        let result = classify("Go to the marker", "").unwrap();
        assert_eq!(result.state, GameState::MissionActive);
        assert_eq!(result.confidence, 0.7);
        assert!(result.reason.contains("go to"));
    }
}
