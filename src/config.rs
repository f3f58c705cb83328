//! Capacity and compaction thresholds for dictionary structures.

/// Hard limit on the bytes held by one dictionary structure.
pub const DEFAULT_BUFFER_CAPACITY: usize = 8 * 1024 * 1024;

/// Headroom kept below the capacity before GC is requested.
pub const DEFAULT_GC_MARGIN: usize = 512 * 1024;

/// Configuration for a [`TrieDictionary`](crate::dictionary::TrieDictionary).
///
/// The configuration is a runtime property of an open structure and is not
/// persisted; reopening an image takes a configuration again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureConfig {
    /// Bytes the structure may hold (content buffers plus trie slots). Mutations
    /// that would exceed it fail with `Error::BufferFull`.
    pub buffer_capacity: usize,
    /// Used bytes at which `needs_to_run_gc` reports the structure as near its limit.
    pub gc_threshold: usize,
    /// Maximum number of distinct words.
    pub max_unigram_count: usize,
    /// Maximum number of bigram relations.
    pub max_bigram_count: usize,
    /// Superseded bytes at which GC is suggested to callers that do not mind
    /// blocking.
    pub eager_gc_superseded_bytes: usize,
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            gc_threshold: DEFAULT_BUFFER_CAPACITY - DEFAULT_GC_MARGIN,
            max_unigram_count: 200_000,
            max_bigram_count: 1_000_000,
            eager_gc_superseded_bytes: 256 * 1024,
        }
    }
}

impl StructureConfig {
    /// A configuration with the given capacity and a GC threshold that keeps the
    /// default margin (or half the capacity, for small capacities).
    pub fn with_capacity(buffer_capacity: usize) -> Self {
        let margin = DEFAULT_GC_MARGIN.min(buffer_capacity / 2);
        Self {
            buffer_capacity,
            gc_threshold: buffer_capacity - margin,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_capacity_keeps_threshold_below_capacity() {
        let config = StructureConfig::with_capacity(1024);
        assert_eq!(config.buffer_capacity, 1024);
        assert_eq!(config.gc_threshold, 512);

        let config = StructureConfig::with_capacity(DEFAULT_BUFFER_CAPACITY);
        assert_eq!(config, StructureConfig::default());
    }
}
