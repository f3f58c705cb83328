//! The dictionary facade.
//!
//! A [`Dictionary`] owns one boxed [`StructurePolicy`] and forwards word-level
//! operations to it. Suggestions are dispatched to a [`SuggestStrategy`] selected
//! by [`SuggestOptions::is_gesture`].
//!
//! ## Example
//!
//! ```rust
//! use std::collections::BTreeMap;
//!
//! use triedict::{code_points, BigramProperty, Dictionary, StructureConfig, UnigramProperty};
//!
//! let mut dict =
//!     Dictionary::create_on_memory(403, "en_US", BTreeMap::new(), &StructureConfig::default())
//!         .unwrap();
//! dict.add_unigram_word(&code_points("cat"), &UnigramProperty::new(120)).unwrap();
//! dict.add_unigram_word(&code_points("dog"), &UnigramProperty::new(80)).unwrap();
//! dict.add_bigram_words(&code_points("cat"), &BigramProperty::new(&code_points("dog"), 40))
//!     .unwrap();
//!
//! assert_eq!(dict.get_probability(&code_points("cat")), 120);
//! assert_eq!(dict.get_bigram_probability(&code_points("cat"), &code_points("dog")), 40);
//! ```

pub mod factory;
pub mod header;
mod image;
pub mod policy;
pub mod property;
pub mod structure;
pub mod suggest;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info, trace, warn};
use parking_lot::{Mutex, MutexGuard};

use crate::config::StructureConfig;
use crate::error::Result;
use crate::migrate::{self, MigrationOptions};

pub use header::{DictionaryHeader, FormatVersion};
pub use policy::StructurePolicy;
pub use property::{
    BigramProperty, HistoricalInfo, LanguageModelParam, ShortcutProperty, UnigramProperty,
    WordProperty, MAX_PROBABILITY, MAX_WORD_LENGTH, NOT_A_PROBABILITY, NOT_A_TIMESTAMP,
};
pub use structure::TrieDictionary;
pub use suggest::{SuggestInput, SuggestOptions, SuggestStrategy, Suggestion, SuggestionResults};

/// A dictionary: one structure policy plus suggestion dispatch.
///
/// Every mutation takes `&mut self`; share an instance across threads through
/// [`SharedDictionary`].
pub struct Dictionary {
    policy: Box<dyn StructurePolicy>,
}

impl Dictionary {
    pub fn new(policy: Box<dyn StructurePolicy>) -> Self {
        let dict = Self { policy };
        dict.log_dictionary_info();
        dict
    }

    /// Opens a persisted dictionary. See [`factory::open_existing`].
    pub fn open(
        path: impl AsRef<Path>,
        offset: usize,
        size: usize,
        updatable: bool,
        config: &StructureConfig,
    ) -> Result<Self> {
        factory::open_existing(path, offset, size, updatable, config).map(Self::new)
    }

    /// Creates an empty dictionary. See [`factory::create_on_memory`].
    pub fn create_on_memory(
        format_version: u32,
        locale: &str,
        attributes: BTreeMap<String, String>,
        config: &StructureConfig,
    ) -> Result<Self> {
        factory::create_on_memory(format_version, locale, attributes, config).map(Self::new)
    }

    fn log_dictionary_info(&self) {
        info!("Dictionary info: {}", self.header().summary());
    }

    pub fn policy(&self) -> &dyn StructurePolicy {
        self.policy.as_ref()
    }

    pub fn header(&self) -> &DictionaryHeader {
        self.policy.header()
    }

    pub fn format_version(&self) -> FormatVersion {
        self.header().format_version()
    }

    /// Fills `results` with candidates for `input`, ranked by the strategy the
    /// options select.
    pub fn get_suggestions(
        &self,
        input: &SuggestInput<'_>,
        options: &SuggestOptions,
        results: &mut SuggestionResults,
    ) {
        let strategy = SuggestStrategy::for_options(options);
        trace!("get_suggestions: {} code points, {strategy:?}", input.code_points.len());
        strategy.rank(self.policy(), input, options, results);
    }

    /// Fills `results` with the words that follow `prev_word`.
    pub fn get_predictions(&self, prev_word: &[i32], results: &mut SuggestionResults) {
        if prev_word.is_empty() {
            return;
        }
        suggest::predict(self.policy(), prev_word, results);
    }

    pub fn get_probability(&self, word: &[i32]) -> i32 {
        self.policy.get_probability(word)
    }

    pub fn get_bigram_probability(&self, word0: &[i32], word1: &[i32]) -> i32 {
        self.policy.get_bigram_probability(word0, word1)
    }

    pub fn calculate_probability(&self, unigram_probability: i32, bigram_probability: i32) -> i32 {
        self.policy
            .calculate_probability(unigram_probability, bigram_probability)
    }

    pub fn add_unigram_word(&mut self, word: &[i32], property: &UnigramProperty) -> Result<()> {
        trace!("add_unigram_word: {} code points", word.len());
        self.policy.add_unigram_word(word, property)
    }

    pub fn add_bigram_words(&mut self, word0: &[i32], property: &BigramProperty) -> Result<()> {
        trace!("add_bigram_words: {} -> {} code points", word0.len(), property.target.len());
        self.policy.add_bigram_words(word0, property)
    }

    pub fn remove_bigram_words(&mut self, word0: &[i32], word1: &[i32]) -> Result<()> {
        trace!("remove_bigram_words");
        self.policy.remove_bigram_words(word0, word1)
    }

    /// Adds `params[start..]` one entry at a time and returns the index after the
    /// last entry processed. Stops early, after the entry that made the structure
    /// ask for GC. Rejected entries are logged and skipped.
    pub fn add_multiple_entries(&mut self, params: &[LanguageModelParam], start: usize) -> usize {
        if start >= params.len() {
            return 0;
        }
        for (i, param) in params.iter().enumerate().skip(start) {
            if let Err(e) = self.add_unigram_word(&param.word1, &param.unigram_property()) {
                warn!("entry {i}: cannot add unigram: {e}");
            }
            if let Some(word0) = &param.word0 {
                if let Err(e) = self.add_bigram_words(word0, &param.bigram_property()) {
                    warn!("entry {i}: cannot add bigram: {e}");
                }
            }
            if self.needs_to_run_gc(true) {
                debug!("add_multiple_entries: stopping after entry {i} for GC");
                return i + 1;
            }
        }
        params.len()
    }

    pub fn get_word_property(&self, word: &[i32]) -> Option<WordProperty> {
        self.policy.get_word_property(word)
    }

    /// Writes the word at `token` into `out` and returns the next token. Start with
    /// `0`; a returned `0` means there are no more words.
    pub fn get_next_word_and_next_token(&self, token: u32, out: &mut Vec<i32>) -> u32 {
        self.policy.next_word(token, out)
    }

    pub fn needs_to_run_gc(&self, minds_block_by_gc: bool) -> bool {
        self.policy.needs_to_run_gc(minds_block_by_gc)
    }

    pub fn flush(&self, path: impl AsRef<Path>) -> Result<()> {
        self.policy.flush(path.as_ref())
    }

    pub fn flush_with_gc(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.policy.flush_with_gc(path.as_ref())
    }

    pub fn get_property(&self, query: &str) -> String {
        self.policy.get_property(query)
    }

    pub fn is_corrupted(&self) -> bool {
        self.policy.is_corrupted()
    }

    /// Rebuilds this dictionary at `format_version` into `path`.
    pub fn migrate_to(
        &self,
        path: impl AsRef<Path>,
        format_version: u32,
        options: &MigrationOptions,
    ) -> Result<()> {
        migrate::migrate(self.policy(), path.as_ref(), format_version, options)
    }
}

/// A [`Dictionary`] behind a mutex, for callers that share one instance across
/// threads. Each call holds the lock for its duration.
#[derive(Clone)]
pub struct SharedDictionary {
    inner: Arc<Mutex<Dictionary>>,
}

impl SharedDictionary {
    pub fn new(dict: Dictionary) -> Self {
        Self {
            inner: Arc::new(Mutex::new(dict)),
        }
    }

    /// Locks the dictionary for a sequence of calls, such as a full traversal.
    pub fn lock(&self) -> MutexGuard<'_, Dictionary> {
        self.inner.lock()
    }

    pub fn get_probability(&self, word: &[i32]) -> i32 {
        self.inner.lock().get_probability(word)
    }

    pub fn add_unigram_word(&self, word: &[i32], property: &UnigramProperty) -> Result<()> {
        self.inner.lock().add_unigram_word(word, property)
    }

    pub fn add_bigram_words(&self, word0: &[i32], property: &BigramProperty) -> Result<()> {
        self.inner.lock().add_bigram_words(word0, property)
    }

    pub fn needs_to_run_gc(&self, minds_block_by_gc: bool) -> bool {
        self.inner.lock().needs_to_run_gc(minds_block_by_gc)
    }

    pub fn flush_with_gc(&self, path: impl AsRef<Path>) -> Result<()> {
        self.inner.lock().flush_with_gc(path)
    }
}
