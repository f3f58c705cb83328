//! Error types shared by the trie map, the dictionary structure and migration.

use thiserror::Error;

/// The error type for all fallible operations in this crate.
///
/// Absence (a missing key or word) is never an error: lookups return `None` or the
/// `NOT_A_PROBABILITY` sentinel instead.
#[derive(Debug, Error)]
pub enum Error {
    /// An error originating from file I/O.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A value wider than the trie map's value field was offered to `put`.
    #[error("value {value:#x} does not fit in {bits} bits")]
    ValueOutOfRange { value: u64, bits: u32 },

    /// The trie map ran out of addressable slots.
    #[error("trie map slot space exhausted")]
    TrieMapFull,

    /// The requested dictionary format version is not supported.
    #[error("unsupported dictionary format version: {0}")]
    UnsupportedFormatVersion(u32),

    /// A persisted image is structurally invalid.
    #[error("invalid dictionary image: {0}")]
    InvalidFormat(String),

    /// The persisted image checksum does not match its content.
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// A mutation was attempted on a dictionary opened read-only.
    #[error("dictionary is not updatable")]
    NotUpdatable,

    /// A word is empty or longer than the maximum word length.
    #[error("invalid word of length {len} (max {max})")]
    InvalidWord { len: usize, max: usize },

    /// A probability outside `0..=MAX_PROBABILITY`.
    #[error("invalid probability: {0}")]
    InvalidProbability(i32),

    /// A word named by a bigram or removal is not in the dictionary.
    #[error("word not found in dictionary")]
    WordNotFound,

    /// The content buffers would exceed the configured capacity.
    #[error("dictionary buffer full: {used} + {requested} bytes exceeds capacity {capacity}")]
    BufferFull {
        used: usize,
        requested: usize,
        capacity: usize,
    },

    /// The unigram or bigram count limit has been reached.
    #[error("{kind} count limit {limit} reached")]
    CountLimitReached { kind: &'static str, limit: usize },

    /// A migration step failed; the migration was aborted.
    #[error("migration failed while {step}: {source}")]
    Migration {
        step: &'static str,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub(crate) fn migration(step: &'static str, source: Error) -> Self {
        Error::Migration {
            step,
            source: Box::new(source),
        }
    }
}

/// A convenience `Result` alias using the crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
