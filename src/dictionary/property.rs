//! Word-level property records exchanged with a structure policy.

/// Sentinel for "no probability": absent word, absent relation.
pub const NOT_A_PROBABILITY: i32 = -1;
/// Largest storable probability.
pub const MAX_PROBABILITY: i32 = 255;
/// Sentinel for a record without historical information.
pub const NOT_A_TIMESTAMP: i32 = -1;
/// Longest word, in code points.
pub const MAX_WORD_LENGTH: usize = 48;

#[inline]
pub(crate) fn is_valid_probability(probability: i32) -> bool {
    (0..=MAX_PROBABILITY).contains(&probability)
}

/// Historical usage information attached to unigrams and bigrams.
///
/// Only persisted by format versions that carry historical information; other
/// versions read it back as [`HistoricalInfo::default`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoricalInfo {
    pub timestamp: i32,
    pub level: u8,
    pub count: u8,
}

impl Default for HistoricalInfo {
    fn default() -> Self {
        Self {
            timestamp: NOT_A_TIMESTAMP,
            level: 0,
            count: 0,
        }
    }
}

impl HistoricalInfo {
    /// Info for an entry that was just typed: level 0, count 1.
    pub fn inputted(timestamp: i32) -> Self {
        Self {
            timestamp,
            level: 0,
            count: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcutProperty {
    pub target: Vec<i32>,
    pub probability: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnigramProperty {
    pub probability: i32,
    pub is_not_a_word: bool,
    pub is_blacklisted: bool,
    pub historical_info: HistoricalInfo,
    pub shortcuts: Vec<ShortcutProperty>,
}

impl UnigramProperty {
    pub fn new(probability: i32) -> Self {
        Self {
            probability,
            is_not_a_word: false,
            is_blacklisted: false,
            historical_info: HistoricalInfo::default(),
            shortcuts: Vec::new(),
        }
    }

    pub fn with_shortcut(mut self, target: &[i32], probability: i32) -> Self {
        self.shortcuts.push(ShortcutProperty {
            target: target.to_vec(),
            probability,
        });
        self
    }
}

impl Default for UnigramProperty {
    fn default() -> Self {
        Self::new(NOT_A_PROBABILITY)
    }
}

/// A directed relation from the word it is added under to `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigramProperty {
    pub target: Vec<i32>,
    pub probability: i32,
    pub historical_info: HistoricalInfo,
}

impl BigramProperty {
    pub fn new(target: &[i32], probability: i32) -> Self {
        Self {
            target: target.to_vec(),
            probability,
            historical_info: HistoricalInfo::default(),
        }
    }
}

/// Everything a structure knows about one word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordProperty {
    pub code_points: Vec<i32>,
    pub unigram: UnigramProperty,
    pub bigrams: Vec<BigramProperty>,
}

impl WordProperty {
    #[inline]
    pub fn is_not_a_word(&self) -> bool {
        self.unigram.is_not_a_word
    }

    #[inline]
    pub fn is_blacklisted(&self) -> bool {
        self.unigram.is_blacklisted
    }
}

/// One batch entry for [`Dictionary::add_multiple_entries`](super::Dictionary::add_multiple_entries):
/// unigram parameters for `word1` and, when `word0` is present, a bigram
/// `word0 -> word1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageModelParam {
    pub word0: Option<Vec<i32>>,
    pub word1: Vec<i32>,
    pub unigram_probability: i32,
    pub bigram_probability: i32,
    pub timestamp: i32,
    pub shortcut_target: Option<Vec<i32>>,
    pub shortcut_probability: i32,
    pub is_not_a_word: bool,
    pub is_blacklisted: bool,
}

impl LanguageModelParam {
    pub fn unigram(word: &[i32], probability: i32) -> Self {
        Self {
            word0: None,
            word1: word.to_vec(),
            unigram_probability: probability,
            bigram_probability: NOT_A_PROBABILITY,
            timestamp: NOT_A_TIMESTAMP,
            shortcut_target: None,
            shortcut_probability: NOT_A_PROBABILITY,
            is_not_a_word: false,
            is_blacklisted: false,
        }
    }

    pub fn bigram(
        word0: &[i32],
        word1: &[i32],
        unigram_probability: i32,
        bigram_probability: i32,
    ) -> Self {
        Self {
            word0: Some(word0.to_vec()),
            bigram_probability,
            ..Self::unigram(word1, unigram_probability)
        }
    }

    pub(crate) fn unigram_property(&self) -> UnigramProperty {
        let mut shortcuts = Vec::new();
        if let Some(target) = self.shortcut_target.as_ref().filter(|t| !t.is_empty()) {
            shortcuts.push(ShortcutProperty {
                target: target.clone(),
                probability: self.shortcut_probability,
            });
        }
        UnigramProperty {
            probability: self.unigram_probability,
            is_not_a_word: self.is_not_a_word,
            is_blacklisted: self.is_blacklisted,
            historical_info: HistoricalInfo::inputted(self.timestamp),
            shortcuts,
        }
    }

    pub(crate) fn bigram_property(&self) -> BigramProperty {
        BigramProperty {
            target: self.word1.clone(),
            probability: self.bigram_probability,
            historical_info: HistoricalInfo::inputted(self.timestamp),
        }
    }
}

/// Converts a string to the code point form used throughout the dictionary API.
pub fn code_points(word: &str) -> Vec<i32> {
    word.chars().map(|c| c as i32).collect()
}

/// Converts code points back to a string, skipping invalid scalar values.
pub fn to_string(code_points: &[i32]) -> String {
    code_points
        .iter()
        .filter_map(|&cp| u32::try_from(cp).ok().and_then(char::from_u32))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_points_round_trip() {
        let cps = code_points("café");
        assert_eq!(cps, vec![0x63, 0x61, 0x66, 0xE9]);
        assert_eq!(to_string(&cps), "café");
        assert_eq!(to_string(&[0x61, -5, 0x62]), "ab");
    }

    #[test]
    fn test_language_model_param_properties() {
        let mut param = LanguageModelParam::bigram(&code_points("a"), &code_points("b"), 100, 50);
        param.shortcut_target = Some(code_points("bee"));
        param.shortcut_probability = 14;
        param.timestamp = 42;

        let unigram = param.unigram_property();
        assert_eq!(unigram.probability, 100);
        assert_eq!(unigram.historical_info, HistoricalInfo::inputted(42));
        assert_eq!(unigram.shortcuts.len(), 1);
        assert_eq!(unigram.shortcuts[0].target, code_points("bee"));

        let bigram = param.bigram_property();
        assert_eq!(bigram.target, code_points("b"));
        assert_eq!(bigram.probability, 50);
    }

    #[test]
    fn test_empty_shortcut_target_is_ignored() {
        let mut param = LanguageModelParam::unigram(&code_points("a"), 10);
        param.shortcut_target = Some(Vec::new());
        assert!(param.unigram_property().shortcuts.is_empty());
    }
}
