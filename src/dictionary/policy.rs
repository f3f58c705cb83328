use std::path::Path;

use crate::error::Result;

use super::header::DictionaryHeader;
use super::property::{BigramProperty, UnigramProperty, WordProperty, NOT_A_PROBABILITY};

/// A mutable dictionary structure: word storage, bigram relations, persistence and
/// compaction behind one object-safe interface.
///
/// Absence is never an error. Lookups of missing words return
/// [`NOT_A_PROBABILITY`] or `None`, and traversal reports exhaustion with token `0`.
/// A failed mutation leaves the structure as it was.
pub trait StructurePolicy: Send {
    fn header(&self) -> &DictionaryHeader;

    /// Whether mutations are accepted.
    fn is_updatable(&self) -> bool;

    /// Unigram probability of `word`, or [`NOT_A_PROBABILITY`].
    fn get_probability(&self, word: &[i32]) -> i32;

    /// Probability of the relation `word0 -> word1`, or [`NOT_A_PROBABILITY`].
    fn get_bigram_probability(&self, word0: &[i32], word1: &[i32]) -> i32;

    /// Combines a unigram and a bigram probability into the probability used for
    /// ranking. A missing bigram falls back to the unigram.
    fn calculate_probability(&self, unigram_probability: i32, bigram_probability: i32) -> i32 {
        if unigram_probability == NOT_A_PROBABILITY {
            NOT_A_PROBABILITY
        } else if bigram_probability == NOT_A_PROBABILITY {
            unigram_probability
        } else {
            bigram_probability
        }
    }

    fn get_word_property(&self, word: &[i32]) -> Option<WordProperty>;

    /// Writes the word at `token` into `out` and returns the token of the following
    /// word. Token `0` starts a traversal; a returned `0` means `out` held the last
    /// word (or nothing, for an empty structure).
    fn next_word(&self, token: u32, out: &mut Vec<i32>) -> u32;

    /// Calls `f` with every word starting with `prefix` and its unigram probability.
    /// Words flagged as not-a-word or blacklisted are skipped.
    fn for_each_completion(&self, prefix: &[i32], f: &mut dyn FnMut(&[i32], i32));

    fn add_unigram_word(&mut self, word: &[i32], property: &UnigramProperty) -> Result<()>;

    fn add_bigram_words(&mut self, word0: &[i32], property: &BigramProperty) -> Result<()>;

    fn remove_bigram_words(&mut self, word0: &[i32], word1: &[i32]) -> Result<()>;

    /// Whether the structure should be compacted before further growth. Callers that
    /// `minds_block_by_gc` only get `true` when compaction is required.
    fn needs_to_run_gc(&self, minds_block_by_gc: bool) -> bool;

    fn flush(&self, path: &Path) -> Result<()>;

    /// Compacts the structure in place, then flushes it.
    fn flush_with_gc(&mut self, path: &Path) -> Result<()>;

    /// Answers a textual property query; unknown queries yield an empty string.
    fn get_property(&self, query: &str) -> String;

    fn is_corrupted(&self) -> bool;
}
