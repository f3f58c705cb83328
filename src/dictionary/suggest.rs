//! Suggestion and prediction dispatch.
//!
//! Candidates are scored by the structure's combined unigram/bigram probability.
//! The strategies differ only in which words they consider a match for the input.

use super::policy::StructurePolicy;
use super::property::NOT_A_PROBABILITY;

/// Default number of candidates kept by [`SuggestionResults`].
pub const MAX_RESULTS: usize = 18;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuggestOptions {
    /// Input is a gesture path rather than a sequence of taps.
    pub is_gesture: bool,
    /// Drop candidates whose score falls below this value.
    pub min_score: i32,
}

/// Input of one suggestion request.
#[derive(Debug, Clone, Copy)]
pub struct SuggestInput<'a> {
    /// Typed code points, or the keys crossed by a gesture path.
    pub code_points: &'a [i32],
    /// Word preceding the input, empty at the start of a sentence.
    pub prev_word: &'a [i32],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub code_points: Vec<i32>,
    pub score: i32,
}

/// A bounded list of candidates, best first.
#[derive(Debug, Clone)]
pub struct SuggestionResults {
    max: usize,
    suggestions: Vec<Suggestion>,
}

impl SuggestionResults {
    pub fn new(max: usize) -> Self {
        Self {
            max,
            suggestions: Vec::with_capacity(max),
        }
    }

    /// Inserts a candidate in score order; the worst candidate falls off when the
    /// list is full. Equal scores keep insertion order.
    pub fn add(&mut self, code_points: &[i32], score: i32) {
        if self.max == 0 {
            return;
        }
        let pos = self.suggestions.partition_point(|s| s.score >= score);
        if pos >= self.max {
            return;
        }
        if self.suggestions.len() == self.max {
            self.suggestions.pop();
        }
        self.suggestions.insert(
            pos,
            Suggestion {
                code_points: code_points.to_vec(),
                score,
            },
        );
    }

    pub fn suggestions(&self) -> &[Suggestion] {
        &self.suggestions
    }

    pub fn len(&self) -> usize {
        self.suggestions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suggestions.is_empty()
    }

    pub fn clear(&mut self) {
        self.suggestions.clear();
    }

    /// Confidence that the first candidate may be committed without confirmation:
    /// its score lead over the runner-up, or its own score when it stands alone.
    pub fn autocommit_confidence(&self) -> i32 {
        match self.suggestions.as_slice() {
            [] => 0,
            [only] => only.score,
            [first, second, ..] => first.score - second.score,
        }
    }
}

impl Default for SuggestionResults {
    fn default() -> Self {
        Self::new(MAX_RESULTS)
    }
}

/// The ranking strategies a dictionary can dispatch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestStrategy {
    Gesture,
    Typing,
}

impl SuggestStrategy {
    pub fn for_options(options: &SuggestOptions) -> Self {
        if options.is_gesture {
            SuggestStrategy::Gesture
        } else {
            SuggestStrategy::Typing
        }
    }

    /// Adds the candidates for `input` to `results`.
    pub fn rank(
        self,
        policy: &dyn StructurePolicy,
        input: &SuggestInput<'_>,
        options: &SuggestOptions,
        results: &mut SuggestionResults,
    ) {
        let Some(&first) = input.code_points.first() else {
            return;
        };
        let mut consider = |word: &[i32], probability: i32| {
            let bigram = if input.prev_word.is_empty() {
                NOT_A_PROBABILITY
            } else {
                policy.get_bigram_probability(input.prev_word, word)
            };
            let score = policy.calculate_probability(probability, bigram);
            if score != NOT_A_PROBABILITY && score >= options.min_score {
                results.add(word, score);
            }
        };
        match self {
            SuggestStrategy::Typing => {
                policy.for_each_completion(input.code_points, &mut consider);
            }
            SuggestStrategy::Gesture => {
                let path = input.code_points;
                policy.for_each_completion(&[first], &mut |word, probability| {
                    if matches_gesture(word, path) {
                        consider(word, probability);
                    }
                });
            }
        }
    }
}

/// A word matches a gesture path when it starts and ends on the path's end keys and
/// its letters are crossed in order. Repeated letters may share one key.
fn matches_gesture(word: &[i32], path: &[i32]) -> bool {
    if word.first() != path.first() || word.last() != path.last() {
        return false;
    }
    let mut keys = path.iter();
    let mut prev = None;
    for &cp in word {
        if prev == Some(cp) {
            continue;
        }
        if !keys.any(|&key| key == cp) {
            return false;
        }
        prev = Some(cp);
    }
    true
}

/// Adds the words that follow `prev_word`, ranked by bigram probability. Words
/// flagged as not-a-word or blacklisted are skipped.
pub fn predict(policy: &dyn StructurePolicy, prev_word: &[i32], results: &mut SuggestionResults) {
    let Some(property) = policy.get_word_property(prev_word) else {
        return;
    };
    for bigram in &property.bigrams {
        if policy.get_probability(&bigram.target) == NOT_A_PROBABILITY {
            continue;
        }
        results.add(&bigram.target, bigram.probability);
    }
}
