//! Confusable-character correction for recognized text.
//!
//! OCR regularly reads `0` as `O`, `1` as `l`, `5` as `S` and so on. The
//! substitutions here are only ever applied to spans that already look
//! numeric, so words like "CASH" or "lost" reach the keyword matchers intact.

/// An ordered glyph → intended-character table plus the separator characters
/// that may appear inside a number for this kind of display.
#[derive(Debug, Clone, Copy)]
pub struct ConfusionTable {
    pub substitutions: &'static [(char, char)],
    pub separators: &'static [char],
}

/// Digits in money, percentages and counts.
pub const DIGIT_CONFUSIONS: ConfusionTable = ConfusionTable {
    substitutions: &[
        ('O', '0'),
        ('o', '0'),
        ('I', '1'),
        ('l', '1'),
        ('S', '5'),
        ('s', '5'),
        ('B', '8'),
        ('g', '9'),
        ('q', '9'),
    ],
    separators: &[',', '.'],
};

/// Clock-style displays (`5:30`, `1:02:45`). Semicolons and periods are
/// frequent misreads of the colon.
pub const TIMER_CONFUSIONS: ConfusionTable = ConfusionTable {
    substitutions: &[
        ('O', '0'),
        ('o', '0'),
        ('I', '1'),
        ('l', '1'),
        ('|', '1'),
        ('!', '1'),
        (';', ':'),
        ('.', ':'),
    ],
    separators: &[':'],
};

const CURRENCY_MARKERS: [char; 4] = ['$', '€', '£', '¥'];

/// Stateless corrector bound to one confusion table.
#[derive(Debug, Clone, Copy)]
pub struct TextNormalizer {
    table: ConfusionTable,
}

impl TextNormalizer {
    pub const fn new(table: ConfusionTable) -> Self {
        Self { table }
    }

    pub const fn digits() -> Self {
        Self::new(DIGIT_CONFUSIONS)
    }

    pub const fn timer() -> Self {
        Self::new(TIMER_CONFUSIONS)
    }

    /// Corrects confusable glyphs inside numeric-candidate spans of `text`.
    ///
    /// A span is a maximal run of digits, table glyphs and separators. It is
    /// rewritten only when it is not glued to a letter on either side and it
    /// either contains a real digit, follows a currency marker, or is
    /// followed by `%`. Everything else is returned untouched.
    pub fn correct(&self, text: &str) -> String {
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::with_capacity(text.len());
        let mut i = 0;

        while i < chars.len() {
            if !self.is_span_char(chars[i]) {
                out.push(chars[i]);
                i += 1;
                continue;
            }

            let start = i;
            while i < chars.len() && self.is_span_char(chars[i]) {
                i += 1;
            }
            let span = &chars[start..i];
            let before = start.checked_sub(1).map(|idx| chars[idx]);
            let after = chars.get(i).copied();

            if self.is_numeric_context(span, before, after) {
                out.extend(span.iter().map(|&c| self.substitute(c)));
            } else {
                out.extend(span.iter());
            }
        }

        out
    }

    /// Applies the table to a span the caller already knows is numeric.
    pub fn correct_numeric(&self, span: &str) -> String {
        span.chars().map(|c| self.substitute(c)).collect()
    }

    fn substitute(&self, c: char) -> char {
        self.table
            .substitutions
            .iter()
            .find(|(wrong, _)| *wrong == c)
            .map(|&(_, right)| right)
            .unwrap_or(c)
    }

    fn is_span_char(&self, c: char) -> bool {
        c.is_ascii_digit()
            || self.table.separators.contains(&c)
            || self.table.substitutions.iter().any(|(wrong, _)| *wrong == c)
    }

    fn is_numeric_context(&self, span: &[char], before: Option<char>, after: Option<char>) -> bool {
        let glued_to_word = before.is_some_and(char::is_alphabetic)
            || after.is_some_and(char::is_alphabetic);
        if glued_to_word {
            return false;
        }

        span.iter().any(char::is_ascii_digit)
            || before.is_some_and(|c| CURRENCY_MARKERS.contains(&c))
            || after == Some('%')
    }
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::digits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corrects_letters_inside_numbers() {
        let n = TextNormalizer::digits();
        assert_eq!(n.correct("$1,OOO,OOO"), "$1,000,000");
        assert_eq!(n.correct("$l,2S4,S67"), "$1,254,567");
    }

    #[test]
    fn test_leaves_words_alone() {
        let n = TextNormalizer::digits();
        assert_eq!(n.correct("CASH $50,000 BANK"), "CASH $50,000 BANK");
        assert_eq!(n.correct("product lost"), "product lost");
        // Standalone glyph runs without numeric context are not numbers
        assert_eq!(n.correct("Is SOS ok"), "Is SOS ok");
    }

    #[test]
    fn test_currency_and_percent_contexts() {
        let n = TextNormalizer::digits();
        assert_eq!(n.correct("$SOO"), "$500");
        assert_eq!(n.correct("Supplies: lOO%"), "Supplies: 100%");
    }

    #[test]
    fn test_timer_table() {
        let n = TextNormalizer::timer();
        assert_eq!(n.correct("5;30"), "5:30");
        assert_eq!(n.correct("5:OO"), "5:00");
        assert_eq!(n.correct("l:30"), "1:30");
        assert_eq!(n.correct("Time: 5.30 left"), "Time: 5:30 left");
    }

    #[test]
    fn test_correct_numeric_is_unconditional() {
        let n = TextNormalizer::digits();
        assert_eq!(n.correct_numeric("lOO"), "100");
        assert_eq!(n.correct_numeric(""), "");
    }

    #[test]
    fn test_empty_and_unchanged_input() {
        let n = TextNormalizer::default();
        assert_eq!(n.correct(""), "");
        assert_eq!(n.correct("no digits here"), "no digits here");
    }
}
