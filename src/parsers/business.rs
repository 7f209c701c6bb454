//! Business computer screen parsing: stock, supplies, value and units.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;
use tracing::debug;

use super::normalize::TextNormalizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessType {
    #[default]
    Unknown,
    Cocaine,
    Meth,
    Cash,
    Weed,
    Documents,
    Bunker,
    Nightclub,
    Agency,
    AcidLab,
    Hangar,
    VehicleWarehouse,
    SpecialCargo,
    AutoShop,
}

impl fmt::Display for BusinessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BusinessType::Unknown => "Unknown",
            BusinessType::Cocaine => "Cocaine Lockup",
            BusinessType::Meth => "Meth Lab",
            BusinessType::Cash => "Counterfeit Cash",
            BusinessType::Weed => "Weed Farm",
            BusinessType::Documents => "Document Forgery",
            BusinessType::Bunker => "Bunker",
            BusinessType::Nightclub => "Nightclub",
            BusinessType::Agency => "Agency",
            BusinessType::AcidLab => "Acid Lab",
            BusinessType::Hangar => "Hangar",
            BusinessType::VehicleWarehouse => "Vehicle Warehouse",
            BusinessType::SpecialCargo => "Special Cargo",
            BusinessType::AutoShop => "Auto Shop",
        };
        write!(f, "{}", name)
    }
}

/// Identification table. The first keyword hit in table order decides.
const BUSINESS_KEYWORDS: &[(BusinessType, &[&str])] = &[
    (BusinessType::Cocaine, &["cocaine", "coke", "lockup"]),
    (BusinessType::Meth, &["meth", "methamphetamine", "lab"]),
    (BusinessType::Cash, &["cash", "counterfeit", "factory"]),
    (BusinessType::Weed, &["weed", "marijuana", "farm"]),
    (BusinessType::Documents, &["document", "forgery", "office"]),
    (BusinessType::Bunker, &["bunker", "research", "manufacturing"]),
    (BusinessType::Nightclub, &["nightclub", "club", "warehouse"]),
    (BusinessType::Agency, &["agency", "security", "contract"]),
    (BusinessType::AcidLab, &["acid", "lab"]),
    (BusinessType::Hangar, &["hangar", "air freight", "cargo"]),
    (BusinessType::VehicleWarehouse, &["vehicle", "warehouse", "import", "export"]),
    (BusinessType::SpecialCargo, &["special cargo", "crate", "warehouse"]),
    (BusinessType::AutoShop, &["auto shop", "service", "mod shop"]),
];

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

// Each list is tried in order. Patterns with a second group are `X/Y`
// fractions and are converted to a percentage.
static STOCK_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"(?i)stock[:\s]*(\d+)\s*%",
        r"(?i)stock[:\s]*(\d+)\s*/\s*(\d+)",
        r"(?i)product[:\s]*(\d+)",
        r"(?i)(\d+)\s*%\s*(?:full|stock)",
        r"(?i)(\d+)\s*/\s*(\d+)\s*(?:full|stock)",
    ])
});

static SUPPLY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"(?i)suppl(?:y|ies)[:\s]*(\d+)\s*%",
        r"(?i)suppl(?:y|ies)[:\s]*(\d+)\s*/\s*(\d+)",
        r"(?i)(\d+)\s*%\s*suppl",
        r"(?i)(\d+)\s*/\s*(\d+)\s*suppl",
    ])
});

static VALUE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"(?i)value[:\s]*\$?\s*([\d,]+)",
        r"(?i)\$\s*([\d,]+)\s*(?:value|worth)",
        r"(?i)sell[:\s]*\$?\s*([\d,]+)",
        r"(?i)worth[:\s]*\$?\s*([\d,]+)",
    ])
});

static UNIT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"(?i)(\d+)\s*(?:units?|crates?|bars?)",
        r"(?i)units?[:\s]*(\d+)",
    ])
});

const FULL_AT: u32 = 95;
const EMPTY_AT: u32 = 5;
const LOW_SUPPLIES_AT: u32 = 20;

/// Parsed business information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusinessReading {
    pub business_type: BusinessType,
    /// Stock percentage 0-100
    pub stock_level: Option<u32>,
    /// Dollar value of stock
    pub stock_value: Option<i64>,
    /// Supply percentage 0-100
    pub supply_level: Option<u32>,
    pub product_units: Option<u32>,
    pub is_full: bool,
    pub is_empty: bool,
    pub needs_supplies: bool,
    pub raw_text: String,
}

impl BusinessReading {
    /// True if stock, supplies or value was parsed.
    pub fn has_data(&self) -> bool {
        self.stock_level.is_some() || self.supply_level.is_some() || self.stock_value.is_some()
    }
}

/// Parser for business computer screens. Keeps the last reading with data
/// for each identified business.
#[derive(Debug, Clone, Default)]
pub struct BusinessParser {
    normalizer: TextNormalizer,
    last_readings: HashMap<BusinessType, BusinessReading>,
}

impl BusinessParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a business screen. `hint` overrides keyword identification
    /// when the caller already knows which business is open.
    pub fn parse(&mut self, text: &str, hint: Option<BusinessType>) -> BusinessReading {
        if text.trim().is_empty() {
            return BusinessReading {
                raw_text: text.to_string(),
                ..BusinessReading::default()
            };
        }

        let corrected = self.normalizer.correct(text);

        let mut reading = BusinessReading {
            business_type: hint.unwrap_or_else(|| identify_business(text)),
            stock_level: extract_percentage(&STOCK_PATTERNS, &corrected),
            supply_level: extract_percentage(&SUPPLY_PATTERNS, &corrected),
            stock_value: extract_value(&corrected),
            product_units: extract_units(&corrected),
            raw_text: text.to_string(),
            ..BusinessReading::default()
        };

        if let Some(stock) = reading.stock_level {
            reading.is_full = stock >= FULL_AT;
            reading.is_empty = stock <= EMPTY_AT;
        }
        if let Some(supplies) = reading.supply_level {
            reading.needs_supplies = supplies <= LOW_SUPPLIES_AT;
        }

        if reading.has_data() && reading.business_type != BusinessType::Unknown {
            debug!(
                "Business {}: stock={:?} supplies={:?} value={:?}",
                reading.business_type, reading.stock_level, reading.supply_level, reading.stock_value
            );
            self.last_readings.insert(reading.business_type, reading.clone());
        }

        reading
    }

    pub fn last_reading(&self, business_type: BusinessType) -> Option<&BusinessReading> {
        self.last_readings.get(&business_type)
    }

    pub fn all_last_readings(&self) -> &HashMap<BusinessType, BusinessReading> {
        &self.last_readings
    }
}

fn identify_business(text: &str) -> BusinessType {
    let text_lower = text.to_lowercase();
    BUSINESS_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| text_lower.contains(kw)))
        .map(|(business_type, _)| *business_type)
        .unwrap_or(BusinessType::Unknown)
}

fn group_u64(caps: &Captures<'_>, group: usize) -> Option<u64> {
    caps.get(group).and_then(|m| m.as_str().parse().ok())
}

/// First pattern producing a value in 0..=100 wins.
fn extract_percentage(patterns: &[Regex], text: &str) -> Option<u32> {
    for pattern in patterns {
        let Some(caps) = pattern.captures(text) else {
            continue;
        };
        let Some(mut value) = group_u64(&caps, 1) else {
            continue;
        };

        if let Some(max) = group_u64(&caps, 2).filter(|&max| max > 0) {
            value = value.saturating_mul(100) / max;
        }

        if value <= 100 {
            return u32::try_from(value).ok();
        }
    }
    None
}

fn extract_value(text: &str) -> Option<i64> {
    VALUE_PATTERNS.iter().find_map(|pattern| {
        let caps = pattern.captures(text)?;
        let digits = caps.get(1)?.as_str().replace(',', "");
        digits.parse::<i64>().ok().filter(|&v| v >= 0)
    })
}

fn extract_units(text: &str) -> Option<u32> {
    UNIT_PATTERNS.iter().find_map(|pattern| {
        let caps = pattern.captures(text)?;
        caps.get(1)?.as_str().parse::<u32>().ok()
    })
}
