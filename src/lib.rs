//! # triedict
//!
//! Storage core of an on-device predictive-text dictionary.
//!
//! - [`TrieMap`]: a compact, mutable forest of sparse bitmap-indexed integer maps,
//!   addressed by keys and opaque [`TableHandle`]s.
//! - [`Dictionary`]: a facade over one updatable dictionary structure (unigrams,
//!   bigrams, traversal, flush and GC, suggestion dispatch).
//! - [`migrate`]: rebuilds a dictionary at another format version, compacting the
//!   destination as it grows.
//!
//! ## Example
//!
//! ```rust
//! use triedict::TrieMap;
//!
//! let mut map = TrieMap::new();
//! map.put_root(1, 100).unwrap();
//! map.put_root(-7, 7).unwrap();
//!
//! assert_eq!(map.get_root(1), Some(100));
//! assert_eq!(map.get_root(-7), Some(7));
//! assert_eq!(map.get_root(2), None);
//! ```

#![deny(unsafe_op_in_unsafe_fn)]

pub mod config;
pub mod dictionary;
pub mod error;
pub mod migrate;
pub mod trie_map;

pub use config::StructureConfig;
pub use dictionary::property::{code_points, to_string};
pub use dictionary::{
    BigramProperty, Dictionary, DictionaryHeader, FormatVersion, HistoricalInfo,
    LanguageModelParam, SharedDictionary, ShortcutProperty, StructurePolicy, SuggestInput,
    SuggestOptions, SuggestStrategy, Suggestion, SuggestionResults, TrieDictionary,
    UnigramProperty, WordProperty, MAX_PROBABILITY, MAX_WORD_LENGTH, NOT_A_PROBABILITY,
    NOT_A_TIMESTAMP,
};
pub use error::{Error, Result};
pub use migrate::{migrate, MigrationOptions, PartialOutput};
pub use trie_map::{Entry, TableHandle, TrieMap};
