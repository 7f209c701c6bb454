//! Money display parsing.
//!
//! The HUD shows either a single balance (`$1,234,567`) or a labeled
//! cash/bank split. Values are always whole dollars; thousands separators are
//! commas or periods depending on the game locale.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::{debug, warn};

use super::normalize::{TextNormalizer, DIGIT_CONFUSIONS};

/// Digits plus every glyph the digit table corrects. Spans captured with it
/// can run into a following word; [`number_tokens`] trims them back.
static MONEY_DIGIT_CLASS: LazyLock<String> = LazyLock::new(|| {
    let glyphs: String = DIGIT_CONFUSIONS
        .substitutions
        .iter()
        .map(|&(wrong, _)| wrong)
        .collect();
    format!(r"\d{}", regex::escape(&glyphs))
});

static CASH_BANK_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i:CASH|DINERO|BARGELD)\s+\$?\s*([{d},.\s]+)\s+(?i:BANK|BANCO)\s+\$?\s*([{d},.\s]+)",
        d = MONEY_DIGIT_CLASS.as_str()
    ))
    .ok()
});

static MONEY_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(&format!(r"\$\s*([{},.\s]+)", MONEY_DIGIT_CLASS.as_str())).ok()
});

static BARE_NUMBER_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[\d,.\s]{3,}").ok());

/// Plausibility bounds for money readings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MoneyLimits {
    /// Readings below this are treated as noise
    pub min_value: i64,
    /// Readings above this are treated as OCR overflow
    pub max_value: i64,
    /// A change by this factor (up or down) from the last valid reading is rejected
    pub max_swing_ratio: f64,
}

impl Default for MoneyLimits {
    fn default() -> Self {
        Self {
            min_value: 100,
            // Balances are stored as a signed 32-bit value in game; leave headroom
            max_value: 2_200_000_000,
            max_swing_ratio: 100.0,
        }
    }
}

/// Parsed money reading from the money display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MoneyReading {
    pub cash: Option<i64>,
    pub bank: Option<i64>,
    pub total: Option<i64>,
    pub raw_text: String,
}

impl MoneyReading {
    fn empty(raw_text: &str) -> Self {
        Self {
            raw_text: raw_text.to_string(),
            ..Self::default()
        }
    }

    /// True if any money value was parsed.
    pub fn has_value(&self) -> bool {
        self.cash.is_some() || self.bank.is_some() || self.total.is_some()
    }

    /// Best available value: the total, else cash + bank, else whichever is present.
    pub fn display_value(&self) -> i64 {
        if let Some(total) = self.total {
            return total;
        }
        match (self.cash, self.bank) {
            (Some(cash), Some(bank)) => cash.saturating_add(bank),
            (Some(cash), None) => cash,
            (None, Some(bank)) => bank,
            (None, None) => 0,
        }
    }
}

/// Parser for the money display. Remembers the last reading that passed
/// [`MoneyParser::validate_reading`] to reject implausible jumps.
#[derive(Debug, Clone)]
pub struct MoneyParser {
    limits: MoneyLimits,
    normalizer: TextNormalizer,
    last_valid: Option<MoneyReading>,
}

impl Default for MoneyParser {
    fn default() -> Self {
        Self::new(MoneyLimits::default())
    }
}

impl MoneyParser {
    pub fn new(limits: MoneyLimits) -> Self {
        Self {
            limits,
            normalizer: TextNormalizer::digits(),
            last_valid: None,
        }
    }

    /// Parses money value(s) from OCR text.
    ///
    /// Tries the labeled cash/bank split, then `$`-marked values (largest
    /// wins), then any bare number. Returns an empty reading carrying the raw
    /// text when nothing parses.
    pub fn parse(&self, text: &str) -> MoneyReading {
        let cleaned = clean_text(text);
        if cleaned.is_empty() {
            return MoneyReading::empty(text);
        }

        let cash_bank = self.parse_cash_bank(&cleaned, text);
        if cash_bank.has_value() {
            return cash_bank;
        }

        let single = self.parse_single_value(&cleaned, text);
        if single.has_value() {
            return single;
        }

        debug!("No money value in {:?}", truncate(text, 50));
        MoneyReading::empty(text)
    }

    fn parse_cash_bank(&self, cleaned: &str, raw: &str) -> MoneyReading {
        let Some(pattern) = CASH_BANK_PATTERN.as_ref() else {
            return MoneyReading::empty(raw);
        };
        let Some(caps) = pattern.captures(cleaned) else {
            return MoneyReading::empty(raw);
        };

        let cash = caps
            .get(1)
            .and_then(|m| self.extract_number(&number_tokens(cleaned, m)));
        let bank = caps
            .get(2)
            .and_then(|m| self.extract_number(&number_tokens(cleaned, m)));

        if cash.is_none() && bank.is_none() {
            return MoneyReading::empty(raw);
        }

        let total = match (cash, bank) {
            (Some(c), Some(b)) => Some(c.saturating_add(b)),
            _ => None,
        };

        MoneyReading {
            cash,
            bank,
            total,
            raw_text: raw.to_string(),
        }
    }

    fn parse_single_value(&self, cleaned: &str, raw: &str) -> MoneyReading {
        if let Some(pattern) = MONEY_PATTERN.as_ref() {
            // Several marked values: the balance is the largest one on screen
            let largest = pattern
                .captures_iter(cleaned)
                .filter_map(|caps| caps.get(1))
                .filter_map(|m| self.extract_number(&number_tokens(cleaned, m)))
                .max();

            if let Some(total) = largest {
                return MoneyReading {
                    total: Some(total),
                    raw_text: raw.to_string(),
                    ..MoneyReading::default()
                };
            }
        }

        if let Some(pattern) = BARE_NUMBER_PATTERN.as_ref() {
            let first = pattern
                .find_iter(cleaned)
                .filter_map(|m| self.extract_number(m.as_str()))
                .find(|&value| value > 0);

            if let Some(total) = first {
                return MoneyReading {
                    total: Some(total),
                    raw_text: raw.to_string(),
                    ..MoneyReading::default()
                };
            }
        }

        MoneyReading::empty(raw)
    }

    /// Extracts one whole-dollar amount from a captured span.
    fn extract_number(&self, span: &str) -> Option<i64> {
        let stripped: String = span
            .chars()
            .filter(|c| !c.is_whitespace() && !matches!(c, '$' | '€' | '£' | '¥'))
            .collect();
        let corrected = self.normalizer.correct_numeric(&stripped);

        // A lone period is a thousands separator too: the game never shows cents
        let digits: String = corrected.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            return None;
        }

        let Ok(value) = digits.parse::<i64>() else {
            debug!("Number overflow for {:?}", truncate(&digits, 30));
            return None;
        };

        if value > self.limits.max_value {
            debug!("Parsed value too large, likely OCR error: {}", value);
            return None;
        }

        Some(value)
    }

    /// Second-pass plausibility check.
    ///
    /// Rejects empty, negative, too small and too large readings, and any
    /// reading that differs from the last valid one by the configured swing
    /// factor. A reading that passes becomes the new last valid reading.
    pub fn validate_reading(&mut self, reading: &MoneyReading) -> bool {
        if !reading.has_value() {
            return false;
        }

        let value = reading.display_value();

        if value < 0 {
            debug!("Invalid negative money value: {}", value);
            return false;
        }
        if value < self.limits.min_value {
            debug!("Money value too small, likely OCR error: {}", value);
            return false;
        }
        if value > self.limits.max_value {
            debug!("Money value exceeds maximum: {}", value);
            return false;
        }

        if let Some(last) = &self.last_valid {
            let last_value = last.display_value();
            if last_value > 0 {
                let ratio = value as f64 / last_value as f64;
                let swing = self.limits.max_swing_ratio;
                if ratio >= swing || ratio <= 1.0 / swing {
                    warn!("Suspicious money change: ${} -> ${}", last_value, value);
                    return false;
                }
            }
        }

        self.last_valid = Some(reading.clone());
        true
    }

    /// The last reading that passed validation.
    pub fn last_valid(&self) -> Option<&MoneyReading> {
        self.last_valid.as_ref()
    }

    /// Accepts a reading as the comparison baseline without validating it.
    pub fn remember(&mut self, reading: MoneyReading) {
        self.last_valid = Some(reading);
    }

    pub fn reset(&mut self) {
        self.last_valid = None;
    }
}

/// Keeps the whitespace-separated tokens of a captured span that belong to
/// the number. Tokens after the first need a real digit, and a token running
/// straight into a letter is the start of a word.
fn number_tokens(cleaned: &str, span: regex::Match<'_>) -> String {
    let text = span.as_str();
    let glued = !text.ends_with(char::is_whitespace)
        && cleaned[span.end()..]
            .chars()
            .next()
            .is_some_and(char::is_alphabetic);

    let tokens: Vec<&str> = text.split_whitespace().collect();
    let mut kept = String::new();
    for (i, token) in tokens.iter().enumerate() {
        let is_last = i + 1 == tokens.len();
        if (is_last && glued) || (i > 0 && !token.chars().any(|c| c.is_ascii_digit())) {
            break;
        }
        kept.push_str(token);
    }
    kept
}

fn clean_text(text: &str) -> String {
    text.replace(['\u{00a0}', '\u{202f}'], " ").trim().to_string()
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
