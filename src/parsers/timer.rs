//! Timer display parsing (`M:SS`, `H:MM:SS`, bare seconds).

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::debug;

use super::normalize::TextNormalizer;

static HHMMSS_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})\s*[:;.]\s*(\d{2})\s*[:;.]\s*(\d{2})").ok());

static MMSS_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})\s*[:;.]\s*(\d{2})").ok());

static SECONDS_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)^(\d{1,5})\s*(?:s|sec)?$").ok());

/// Parsed timer reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerReading {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    pub total_seconds: u32,
    pub raw_text: String,
    /// Countdown (true) or elapsed-time (false) display
    pub is_countdown: bool,
}

impl Default for TimerReading {
    fn default() -> Self {
        Self {
            hours: 0,
            minutes: 0,
            seconds: 0,
            total_seconds: 0,
            raw_text: String::new(),
            is_countdown: true,
        }
    }
}

impl TimerReading {
    fn empty(raw_text: &str) -> Self {
        Self {
            raw_text: raw_text.to_string(),
            ..Self::default()
        }
    }

    fn from_parts(hours: u32, minutes: u32, seconds: u32, raw_text: &str) -> Self {
        Self {
            hours,
            minutes,
            seconds,
            total_seconds: hours * 3600 + minutes * 60 + seconds,
            raw_text: raw_text.to_string(),
            is_countdown: true,
        }
    }

    /// True when a time was parsed. An explicit `0:00` counts as a value.
    pub fn has_value(&self) -> bool {
        self.total_seconds > 0
            || (self.hours == 0
                && self.minutes == 0
                && self.seconds == 0
                && self.raw_text.contains("0:00"))
    }

    /// `H:MM:SS` when hours are present, otherwise `M:SS`.
    pub fn formatted(&self) -> String {
        if self.hours > 0 {
            format!("{}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
        } else {
            format!("{}:{:02}", self.minutes, self.seconds)
        }
    }
}

/// Parser for on-screen timers. Remembers the last reading with a value.
#[derive(Debug, Clone)]
pub struct TimerParser {
    normalizer: TextNormalizer,
    last_valid: Option<TimerReading>,
}

impl Default for TimerParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerParser {
    pub fn new() -> Self {
        Self {
            normalizer: TextNormalizer::timer(),
            last_valid: None,
        }
    }

    /// Parses a timer from OCR text, trying `H:MM:SS`, then `M:SS`, then
    /// bare seconds. Successful readings carry the corrected text.
    pub fn parse(&mut self, text: &str) -> TimerReading {
        if text.trim().is_empty() {
            return TimerReading::empty(text);
        }

        let cleaned = self.normalizer.correct(text.trim());

        let parsers: [fn(&str) -> Option<TimerReading>; 3] =
            [parse_hhmmss, parse_mmss, parse_seconds];

        for parse in parsers {
            if let Some(reading) = parse(&cleaned).filter(TimerReading::has_value) {
                self.last_valid = Some(reading.clone());
                return reading;
            }
        }

        TimerReading::empty(text)
    }

    /// Estimates real seconds remaining from two successive readings.
    ///
    /// When the countdown has advanced, the on-screen value is scaled by the
    /// observed timer rate; otherwise the current value is returned as-is.
    /// `None` when either reading is empty.
    pub fn estimate_time_remaining(
        &self,
        current: &TimerReading,
        previous: &TimerReading,
        elapsed_real_seconds: f64,
    ) -> Option<f64> {
        if !current.has_value() || !previous.has_value() {
            return None;
        }

        let timer_diff = previous.total_seconds as f64 - current.total_seconds as f64;

        if timer_diff > 0.0 && current.is_countdown {
            let rate = if elapsed_real_seconds > 0.0 {
                timer_diff / elapsed_real_seconds
            } else {
                1.0
            };
            return (rate > 0.0).then(|| current.total_seconds as f64 / rate);
        }

        Some(current.total_seconds as f64)
    }

    pub fn last_valid(&self) -> Option<&TimerReading> {
        self.last_valid.as_ref()
    }
}

fn capture_u32(caps: &regex::Captures<'_>, group: usize) -> Option<u32> {
    caps.get(group).and_then(|m| m.as_str().parse().ok())
}

fn parse_hhmmss(text: &str) -> Option<TimerReading> {
    let caps = HHMMSS_PATTERN.as_ref()?.captures(text)?;
    let hours = capture_u32(&caps, 1)?;
    let minutes = capture_u32(&caps, 2)?;
    let seconds = capture_u32(&caps, 3)?;

    if hours > 99 || minutes > 59 || seconds > 59 {
        debug!("Timer H:MM:SS out of range: {}:{}:{}", hours, minutes, seconds);
        return None;
    }
    Some(TimerReading::from_parts(hours, minutes, seconds, text))
}

fn parse_mmss(text: &str) -> Option<TimerReading> {
    let caps = MMSS_PATTERN.as_ref()?.captures(text)?;
    let minutes = capture_u32(&caps, 1)?;
    let seconds = capture_u32(&caps, 2)?;

    if minutes > 99 || seconds > 59 {
        debug!("Timer M:SS out of range: {}:{}", minutes, seconds);
        return None;
    }
    Some(TimerReading {
        minutes,
        seconds,
        total_seconds: minutes * 60 + seconds,
        raw_text: text.to_string(),
        ..TimerReading::default()
    })
}

fn parse_seconds(text: &str) -> Option<TimerReading> {
    let caps = SECONDS_PATTERN.as_ref()?.captures(text.trim())?;
    let total = capture_u32(&caps, 1)?;

    if total > 9999 {
        debug!("Seconds value out of range: {}", total);
        return None;
    }

    let (minutes, seconds) = (total / 60, total % 60);
    let (hours, minutes) = (minutes / 60, minutes % 60);
    Some(TimerReading::from_parts(hours, minutes, seconds, text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> TimerReading {
        TimerParser::new().parse(text)
    }

    #[test]
    fn test_parse_mmss() {
        let reading = parse("5:30");
        assert_eq!((reading.minutes, reading.seconds), (5, 30));
        assert_eq!(reading.total_seconds, 330);

        assert_eq!(parse("15:45").total_seconds, 945);
        assert_eq!(parse("Time: 5:30 remaining").total_seconds, 330);
    }

    #[test]
    fn test_parse_hhmmss() {
        let reading = parse("1:30:45");
        assert_eq!((reading.hours, reading.minutes, reading.seconds), (1, 30, 45));
        assert_eq!(reading.total_seconds, 5445);
    }

    #[test]
    fn test_colon_misreads() {
        assert_eq!(parse("5;30").total_seconds, 330);
        assert_eq!(parse("5.30").total_seconds, 330);
        assert_eq!(parse("5:OO").total_seconds, 300);
        assert_eq!(parse("l:3O").total_seconds, 90);
    }

    #[test]
    fn test_bare_seconds() {
        assert_eq!(parse("45").total_seconds, 45);
        assert_eq!(parse("120s").total_seconds, 120);
        assert_eq!(parse("90 sec").total_seconds, 90);

        let reading = parse("125");
        assert_eq!((reading.minutes, reading.seconds), (2, 5));

        let longest = parse("9999");
        assert_eq!((longest.hours, longest.minutes, longest.seconds), (2, 46, 39));
        assert!(!parse("10000").has_value());
        assert!(!parse("99999 sec").has_value());
    }

    #[test]
    fn test_zero_timer_is_a_value() {
        let reading = parse("0:00");
        assert_eq!(reading.total_seconds, 0);
        assert!(reading.has_value());
    }

    #[test]
    fn test_out_of_range_fields_rejected() {
        assert!(!parse("5:60").has_value());
        assert!(!parse("5:75").has_value());
        assert!(!parse("1:75:10").has_value());
    }

    #[test]
    fn test_empty_and_garbage() {
        assert!(!parse("").has_value());
        assert!(!parse("   ").has_value());
        assert!(!parse("no timer").has_value());
        assert_eq!(parse("no timer").raw_text, "no timer");
    }

    #[test]
    fn test_formatted() {
        assert_eq!(parse("5:30").formatted(), "5:30");
        assert_eq!(parse("1:05:09").formatted(), "1:05:09");
        assert_eq!(parse("7").formatted(), "0:07");
    }

    #[test]
    fn test_last_valid_is_kept() {
        let mut parser = TimerParser::new();
        assert!(parser.last_valid().is_none());
        parser.parse("3:00");
        parser.parse("garbage");
        assert_eq!(parser.last_valid().map(|r| r.total_seconds), Some(180));
    }

    #[test]
    fn test_estimate_time_remaining() {
        let parser = TimerParser::new();
        let previous = parse("5:00");
        let current = parse("4:50");

        // Timer dropped 10s over 10 real seconds: rate 1.0
        let estimate = parser.estimate_time_remaining(&current, &previous, 10.0);
        assert_eq!(estimate, Some(290.0));

        // Timer dropped 10s over 20 real seconds: half speed
        let estimate = parser.estimate_time_remaining(&current, &previous, 20.0);
        assert_eq!(estimate, Some(580.0));

        // Not advancing: current value as-is
        let estimate = parser.estimate_time_remaining(&previous, &previous, 5.0);
        assert_eq!(estimate, Some(300.0));

        let empty = TimerReading::default();
        assert_eq!(parser.estimate_time_remaining(&empty, &previous, 5.0), None);
    }
}
