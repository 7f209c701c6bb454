//! Mission text parsing: category, name and current objective.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use tracing::debug;

/// Mission and activity categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionType {
    #[default]
    Unknown,
    ContactMission,
    VipWork,
    McContract,
    SellMission,
    Resupply,
    HeistPrep,
    HeistFinale,
    SecurityContract,
    PayphoneHit,
    AutoShopDelivery,
    NightclubPromotion,
    CasinoHeist,
    CayoPerico,
    Doomsday,
    FreemodeEvent,
}

impl fmt::Display for MissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MissionType::Unknown => "Unknown",
            MissionType::ContactMission => "Contact Mission",
            MissionType::VipWork => "VIP Work",
            MissionType::McContract => "MC Contract",
            MissionType::SellMission => "Sell Mission",
            MissionType::Resupply => "Resupply",
            MissionType::HeistPrep => "Heist Prep",
            MissionType::HeistFinale => "Heist Finale",
            MissionType::SecurityContract => "Security Contract",
            MissionType::PayphoneHit => "Payphone Hit",
            MissionType::AutoShopDelivery => "Auto Shop Delivery",
            MissionType::NightclubPromotion => "Nightclub Promotion",
            MissionType::CasinoHeist => "Casino Heist",
            MissionType::CayoPerico => "Cayo Perico",
            MissionType::Doomsday => "Doomsday",
            MissionType::FreemodeEvent => "Freemode Event",
        };
        write!(f, "{}", name)
    }
}

/// Category keyword table, scanned in order. Contact missions have no
/// reliable on-screen vocabulary and are never inferred from text.
const MISSION_KEYWORDS: &[(MissionType, &[&str])] = &[
    (
        MissionType::VipWork,
        &[
            "vip work", "vip challenge", "headhunter", "sightseer",
            "hostile takeover", "asset recovery", "executive search",
        ],
    ),
    (
        MissionType::McContract,
        &[
            "mc contract", "clubhouse contract", "jailbreak", "torched",
            "fragile goods", "outrider", "gun running",
        ],
    ),
    (
        MissionType::SellMission,
        &[
            "deliver", "sell", "drop off", "drop-off", "delivery",
            "product", "goods", "stock", "merchandise",
        ],
    ),
    (
        MissionType::Resupply,
        &[
            "resupply", "supplies", "steal supplies", "supply run",
            "source", "acquire",
        ],
    ),
    (
        MissionType::HeistPrep,
        &[
            "prep", "setup", "preparation", "acquire", "steal",
            "scope out", "gather intel",
        ],
    ),
    (
        MissionType::HeistFinale,
        &[
            "finale", "the big con", "silent & sneaky", "aggressive",
            "heist", "take", "score",
        ],
    ),
    (
        MissionType::SecurityContract,
        &[
            "security contract", "recover valuables", "gang termination",
            "asset protection", "rescue operation", "vehicle recovery",
        ],
    ),
    (
        MissionType::PayphoneHit,
        &[
            "payphone hit", "payphone", "assassination", "eliminate",
            "the popstar", "the tech entrepreneur", "the cofounder",
        ],
    ),
    (
        MissionType::AutoShopDelivery,
        &[
            "auto shop", "service vehicle", "customer vehicle",
            "deliver the vehicle", "exotic exports",
        ],
    ),
    (
        MissionType::NightclubPromotion,
        &["nightclub", "popularity", "promote", "promotion", "club promotion"],
    ),
    (
        MissionType::CayoPerico,
        &[
            "cayo perico", "el rubio", "compound", "drainage tunnel",
            "kosatka", "primary target", "secondary target",
        ],
    ),
    (
        MissionType::CasinoHeist,
        &[
            "casino heist", "vault", "diamond casino", "casino",
            "big con", "silent", "aggressive approach",
        ],
    ),
    (
        MissionType::Doomsday,
        &[
            "doomsday", "act 1", "act 2", "act 3", "data breaches",
            "bogdan", "avenger", "facility",
        ],
    ),
    (
        MissionType::FreemodeEvent,
        &[
            "freemode event", "business battle", "checkpoints",
            "king of the castle", "hunt the beast",
        ],
    ),
];

/// Objective verbs in priority order. The first verb that matches wins,
/// regardless of where it appears in the text.
const OBJECTIVE_VERBS: &[&str] = &[
    "go to", "get to", "reach", "find", "locate",
    "steal", "take", "acquire", "collect", "pick up",
    "deliver", "drop off", "bring",
    "destroy", "eliminate", "kill", "take out",
    "protect", "defend", "escort",
    "wait", "survive", "escape", "lose",
    "hack", "access", "breach",
];

const COMPLETION_INDICATORS: &[&str] = &[
    "mission passed", "job complete", "passed", "success", "completed",
    "delivered", "rp", "cash", "reward", "+$",
];

const FAILURE_INDICATORS: &[&str] = &[
    "mission failed", "failed", "wasted", "busted", "destroyed", "lost",
];

const MAX_NAME_CHARS: usize = 50;

static QUOTED_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"["']([^"']+)["']"#).ok());

static NAME_PREFIXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)mission[:\s]+([^\n]+)",
        r"(?i)job[:\s]+([^\n]+)",
        r"(?i)contract[:\s]+([^\n]+)",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static OBJECTIVE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    OBJECTIVE_VERBS
        .iter()
        .filter_map(|verb| {
            Regex::new(&format!(r"({}\s+[^\n]+?)(?:[.\n]|$)", regex::escape(verb))).ok()
        })
        .collect()
});

/// Parsed mission information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissionReading {
    pub mission_type: MissionType,
    pub mission_name: String,
    pub objective: String,
    pub is_active: bool,
    pub keywords_found: Vec<String>,
    pub raw_text: String,
}

impl MissionReading {
    /// True when a category was identified or a name was found.
    pub fn has_mission(&self) -> bool {
        self.mission_type != MissionType::Unknown || !self.mission_name.is_empty()
    }
}

/// Parser for mission banners and objective lines.
#[derive(Debug, Clone, Default)]
pub struct MissionParser {
    last_reading: Option<MissionReading>,
}

impl MissionParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses mission information. Any non-blank text yields an active
    /// reading even when no category or name could be identified.
    pub fn parse(&mut self, text: &str) -> MissionReading {
        if text.trim().is_empty() {
            return MissionReading {
                raw_text: text.to_string(),
                ..MissionReading::default()
            };
        }

        let text_lower = text.to_lowercase();
        let (mission_type, keywords_found) = identify_mission_type(&text_lower);

        let reading = MissionReading {
            mission_type,
            mission_name: extract_mission_name(text),
            objective: extract_objective(text),
            is_active: true,
            keywords_found,
            raw_text: text.to_string(),
        };

        if reading.has_mission() {
            debug!(
                "Mission parsed: type={}, name={:?}",
                reading.mission_type, reading.mission_name
            );
            self.last_reading = Some(reading.clone());
        }

        reading
    }

    /// True when at least two completion indicators are present.
    pub fn is_mission_complete(&self, text: &str) -> bool {
        let text_lower = text.to_lowercase();
        COMPLETION_INDICATORS
            .iter()
            .filter(|kw| text_lower.contains(*kw))
            .count()
            >= 2
    }

    /// True when any failure indicator is present.
    pub fn is_mission_failed(&self, text: &str) -> bool {
        let text_lower = text.to_lowercase();
        FAILURE_INDICATORS.iter().any(|kw| text_lower.contains(kw))
    }

    /// The last reading that had a mission.
    pub fn last_reading(&self) -> Option<&MissionReading> {
        self.last_reading.as_ref()
    }
}

/// Scores each category by the summed length of its matched keywords.
/// Ties keep the category seen first.
fn identify_mission_type(text_lower: &str) -> (MissionType, Vec<String>) {
    let mut best = (MissionType::Unknown, Vec::new());
    let mut best_score = 0;

    for (mission_type, keywords) in MISSION_KEYWORDS {
        let matched: Vec<&str> = keywords
            .iter()
            .copied()
            .filter(|kw| text_lower.contains(kw))
            .collect();
        let score: usize = matched.iter().map(|kw| kw.len()).sum();

        if score > best_score {
            best_score = score;
            best = (*mission_type, matched.into_iter().map(String::from).collect());
        }
    }

    best
}

fn extract_mission_name(text: &str) -> String {
    if let Some(caps) = QUOTED_NAME.as_ref().and_then(|re| re.captures(text)) {
        return caps
            .get(1)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();
    }

    for pattern in NAME_PREFIXES.iter() {
        let Some(caps) = pattern.captures(text) else {
            continue;
        };
        let name = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        if !name.is_empty() && name.chars().count() < MAX_NAME_CHARS {
            return name.to_string();
        }
    }

    String::new()
}

fn extract_objective(text: &str) -> String {
    let text_lower = text.to_lowercase();

    for pattern in OBJECTIVE_PATTERNS.iter() {
        if let Some(m) = pattern.captures(&text_lower).and_then(|caps| caps.get(1)) {
            return capitalize(m.as_str().trim());
        }
    }

    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .filter(|line| {
            let len = line.chars().count();
            len > 5 && len < 100
        })
        .map(str::to_string)
        .unwrap_or_default()
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text() {
        let mut parser = MissionParser::new();
        let reading = parser.parse("");
        assert!(!reading.has_mission());
        assert!(!reading.is_active);
        assert!(parser.last_reading().is_none());
    }

    #[test]
    fn test_identifies_categories() {
        let mut parser = MissionParser::new();

        let reading = parser.parse("VIP Work: Headhunter");
        assert_eq!(reading.mission_type, MissionType::VipWork);
        assert!(reading.keywords_found.contains(&"headhunter".to_string()));

        let reading = parser.parse("Deliver the product to the buyer");
        assert_eq!(reading.mission_type, MissionType::SellMission);

        let reading = parser.parse("Steal supplies for your business");
        assert_eq!(reading.mission_type, MissionType::Resupply);

        let reading = parser.parse("Board the Kosatka and head to Cayo Perico");
        assert_eq!(reading.mission_type, MissionType::CayoPerico);
    }

    #[test]
    fn test_category_scored_by_summed_keyword_length() {
        let (mission_type, keywords) =
            identify_mission_type("silent merchandise run at the casino vault");
        // One 11-char sell keyword loses to three shorter casino keywords
        assert_eq!(mission_type, MissionType::CasinoHeist);
        assert_eq!(keywords, vec!["vault", "casino", "silent"]);

        let (mission_type, _) = identify_mission_type("steal the vault keys from the diamond casino");
        assert_eq!(mission_type, MissionType::CasinoHeist);
    }

    #[test]
    fn test_category_tie_keeps_first() {
        // "steal" and "vault" are both five characters
        let (mission_type, keywords) = identify_mission_type("steal the vault");
        assert_eq!(mission_type, MissionType::HeistPrep);
        assert_eq!(keywords, vec!["steal"]);
    }

    #[test]
    fn test_unknown_text_is_active_without_mission() {
        let mut parser = MissionParser::new();
        let reading = parser.parse("weather is nice");
        assert_eq!(reading.mission_type, MissionType::Unknown);
        assert!(reading.is_active);
        assert!(!reading.has_mission());
    }

    #[test]
    fn test_mission_name_from_quotes() {
        let mut parser = MissionParser::new();
        let reading = parser.parse("Started \"Prison Break\" now");
        assert_eq!(reading.mission_name, "Prison Break");
        assert!(reading.has_mission());
    }

    #[test]
    fn test_mission_name_from_prefix() {
        let mut parser = MissionParser::new();
        let reading = parser.parse("Contract: Data Leak\nGo to the office");
        assert_eq!(reading.mission_name, "Data Leak");

        let too_long = format!("Job: {}", "x".repeat(60));
        assert_eq!(parser.parse(&too_long).mission_name, "");
    }

    #[test]
    fn test_objective_follows_verb_order() {
        let mut parser = MissionParser::new();

        let reading = parser.parse("Go to the warehouse.");
        assert_eq!(reading.objective, "Go to the warehouse");

        // "go to" precedes "deliver" in the verb list
        let reading = parser.parse("Deliver the goods then go to the dock");
        assert_eq!(reading.objective, "Go to the dock");
    }

    #[test]
    fn test_objective_falls_back_to_first_line() {
        let mut parser = MissionParser::new();
        let reading = parser.parse("\n  Lester needs help  \nsecond");
        assert_eq!(reading.objective, "Lester needs help");

        assert_eq!(parser.parse("short").objective, "");
    }

    #[test]
    fn test_completion_needs_two_indicators() {
        let parser = MissionParser::new();
        assert!(parser.is_mission_complete("MISSION PASSED +$25,000"));
        assert!(parser.is_mission_complete("Job complete, reward collected"));
        assert!(!parser.is_mission_complete("success"));
    }

    #[test]
    fn test_failure_needs_one_indicator() {
        let parser = MissionParser::new();
        assert!(parser.is_mission_failed("WASTED"));
        assert!(parser.is_mission_failed("Mission Failed: the product was destroyed"));
        assert!(!parser.is_mission_failed("go to the marker"));
    }

    #[test]
    fn test_last_reading_only_tracks_missions() {
        let mut parser = MissionParser::new();
        parser.parse("VIP Work: Sightseer");
        parser.parse("weather is nice");
        let last = parser.last_reading().map(|r| r.mission_type);
        assert_eq!(last, Some(MissionType::VipWork));
    }
}
