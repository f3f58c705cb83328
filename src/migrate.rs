//! Rebuilding a dictionary at another format version.
//!
//! Migration replays the source's content through the destination's mutation
//! interface in two passes, unigrams first so that every bigram finds both of its
//! words. Before each word the destination is asked whether it needs GC; if so it
//! is flushed with GC to the output path and reopened from there, which keeps it
//! within its buffer limits without touching the source.

use std::fs;
use std::path::Path;

use log::{debug, error, info, trace, warn};

use crate::config::StructureConfig;
use crate::dictionary::factory;
use crate::dictionary::policy::StructurePolicy;
use crate::dictionary::property::{to_string, MAX_WORD_LENGTH};
use crate::error::{Error, Result};

/// What happens to the output file when a migration fails after it was written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PartialOutput {
    /// Delete the file, if this migration wrote it.
    #[default]
    Remove,
    /// Leave the last successful intermediate flush in place.
    Keep,
}

#[derive(Debug, Clone, Default)]
pub struct MigrationOptions {
    pub partial_output: PartialOutput,
    /// Configuration of the destination structure.
    pub config: StructureConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Unigrams,
    Bigrams,
}

/// Rebuilds `source` at `format_version` and writes the result to `path`.
///
/// Fails before writing anything if the destination cannot be created (for
/// example, an unsupported format version). Any failed step aborts the migration
/// with [`Error::Migration`].
pub fn migrate(
    source: &dyn StructurePolicy,
    path: &Path,
    format_version: u32,
    options: &MigrationOptions,
) -> Result<()> {
    let header = source.header();
    let mut dest = factory::create_on_memory(
        format_version,
        header.locale(),
        header.attributes().clone(),
        &options.config,
    )
    .map_err(|e| {
        error!("cannot create migration destination: {e}");
        Error::migration("creating the destination", e)
    })?;
    info!(
        "migrating {} from version {} to {format_version} into {}",
        header.summary(),
        header.format_version(),
        path.display()
    );

    let mut flushed = false;
    let result = run(source, &mut dest, path, &options.config, &mut flushed);
    match &result {
        Ok(()) => info!("migration into {} finished", path.display()),
        Err(e) => {
            error!("migration into {} aborted: {e}", path.display());
            if flushed && options.partial_output == PartialOutput::Remove {
                if let Err(e) = fs::remove_file(path) {
                    warn!("cannot remove partial output {}: {e}", path.display());
                }
            }
        }
    }
    result
}

fn run(
    source: &dyn StructurePolicy,
    dest: &mut Box<dyn StructurePolicy>,
    path: &Path,
    config: &StructureConfig,
    flushed: &mut bool,
) -> Result<()> {
    run_pass(Pass::Unigrams, source, dest, path, config, flushed)?;
    run_pass(Pass::Bigrams, source, dest, path, config, flushed)?;
    dest.flush_with_gc(path)
        .map_err(|e| Error::migration("writing the destination", e))
}

fn run_pass(
    pass: Pass,
    source: &dyn StructurePolicy,
    dest: &mut Box<dyn StructurePolicy>,
    path: &Path,
    config: &StructureConfig,
    flushed: &mut bool,
) -> Result<()> {
    debug!("migration pass {pass:?} started");
    let mut word = Vec::with_capacity(MAX_WORD_LENGTH);
    let mut token = 0;
    let mut words = 0usize;
    loop {
        token = source.next_word(token, &mut word);
        if word.is_empty() {
            break;
        }
        let Some(property) = source.get_word_property(&word) else {
            return Err(Error::migration(
                "reading a source word",
                Error::InvalidFormat(format!("unreadable record for {:?}", to_string(&word))),
            ));
        };

        if dest.needs_to_run_gc(true) {
            debug!("migration pass {pass:?}: destination needs GC after {words} words");
            dest.flush_with_gc(path)
                .map_err(|e| Error::migration("compacting the destination", e))?;
            *flushed = true;
            *dest = factory::open_existing(path, 0, 0, true, config)
                .map_err(|e| Error::migration("reopening the destination", e))?;
        }

        match pass {
            Pass::Unigrams => dest
                .add_unigram_word(&word, &property.unigram)
                .map_err(|e| Error::migration("adding a unigram", e))?,
            Pass::Bigrams => {
                for bigram in &property.bigrams {
                    dest.add_bigram_words(&word, bigram)
                        .map_err(|e| Error::migration("adding a bigram", e))?;
                }
            }
        }
        trace!("migration pass {pass:?}: word {words} done");
        words += 1;

        if token == 0 {
            break;
        }
    }
    // A damaged terminal ends traversal early without an error of its own.
    if source.is_corrupted() {
        return Err(Error::migration(
            "reading the source",
            Error::InvalidFormat("source dictionary is corrupted".into()),
        ));
    }
    debug!("migration pass {pass:?} finished: {words} words");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::dictionary::header::{DictionaryHeader, FormatVersion};
    use crate::dictionary::property::{
        code_points, BigramProperty, UnigramProperty, WordProperty, NOT_A_PROBABILITY,
    };
    use crate::dictionary::structure::TrieDictionary;
    use crate::dictionary::Dictionary;

    fn source(version: u32) -> Box<dyn StructurePolicy> {
        let mut attributes = BTreeMap::new();
        attributes.insert("dictionary".to_string(), "main:en_US".to_string());
        attributes.insert("date".to_string(), "1400000000".to_string());
        factory::create_on_memory(version, "en_US", attributes, &StructureConfig::default())
            .unwrap()
    }

    fn add(dict: &mut dyn StructurePolicy, word: &str, probability: i32) {
        dict.add_unigram_word(&code_points(word), &UnigramProperty::new(probability))
            .unwrap();
    }

    fn add_bigram(dict: &mut dyn StructurePolicy, word0: &str, word1: &str, probability: i32) {
        dict.add_bigram_words(
            &code_points(word0),
            &BigramProperty::new(&code_points(word1), probability),
        )
        .unwrap();
    }

    fn content(dict: &dyn StructurePolicy) -> Vec<WordProperty> {
        let mut out = Vec::new();
        let mut word = Vec::new();
        let mut token = 0;
        loop {
            token = dict.next_word(token, &mut word);
            if word.is_empty() {
                break;
            }
            out.push(dict.get_word_property(&word).unwrap());
            if token == 0 {
                break;
            }
        }
        out
    }

    fn unwrap_migration(err: Error) -> Error {
        match err {
            Error::Migration { source, .. } => *source,
            other => panic!("expected a migration error, got {other:?}"),
        }
    }

    #[test]
    fn test_migrate_cat_dog() {
        let mut src = source(4);
        add(src.as_mut(), "cat", 120);
        add(src.as_mut(), "dog", 80);
        add_bigram(src.as_mut(), "cat", "dog", 40);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("migrated.dict");
        migrate(src.as_ref(), &path, 403, &MigrationOptions::default()).unwrap();

        let dest = Dictionary::open(&path, 0, 0, false, &StructureConfig::default()).unwrap();
        assert_eq!(dest.format_version(), FormatVersion::V4Dev);
        assert_eq!(dest.header().locale(), "en_US");
        assert_eq!(dest.header().attributes(), src.header().attributes());
        assert_eq!(dest.get_probability(&code_points("cat")), 120);
        assert_eq!(dest.get_probability(&code_points("dog")), 80);
        assert_eq!(dest.get_bigram_probability(&code_points("cat"), &code_points("dog")), 40);
        assert_eq!(
            dest.get_bigram_probability(&code_points("dog"), &code_points("cat")),
            NOT_A_PROBABILITY
        );
        let cat = dest.get_word_property(&code_points("cat")).unwrap();
        assert_eq!(cat.bigrams.len(), 1);
        let dog = dest.get_word_property(&code_points("dog")).unwrap();
        assert!(dog.bigrams.is_empty());
        assert_eq!(content(dest.policy()).len(), 2);
    }

    #[test]
    fn test_migrate_empty_dictionary() {
        let src = source(403);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.dict");
        migrate(src.as_ref(), &path, 4, &MigrationOptions::default()).unwrap();

        let dest = TrieDictionary::open(&path, 0, 0, true, StructureConfig::default()).unwrap();
        assert_eq!(dest.unigram_count(), 0);
        assert_eq!(dest.format_version(), FormatVersion::V4);
    }

    #[test]
    fn test_gc_during_migration_does_not_change_content() {
        let mut src = source(403);
        let words: Vec<String> = (0..120).map(|i| format!("w{}x{}", i % 7, i)).collect();
        for (i, word) in words.iter().enumerate() {
            let property = UnigramProperty::new((i % 200) as i32)
                .with_shortcut(&code_points(&format!("s{i}")), (i % 16) as i32);
            src.add_unigram_word(&code_points(word), &property).unwrap();
        }
        for i in 0..words.len() {
            for step in [1, 5, 11] {
                let target = &words[(i + step) % words.len()];
                add_bigram(src.as_mut(), &words[i], target, ((i + step) % 256) as i32);
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let unconstrained = dir.path().join("unconstrained.dict");
        migrate(src.as_ref(), &unconstrained, 403, &MigrationOptions::default()).unwrap();

        let gc_threshold = 8 * 1024;
        let constrained = dir.path().join("constrained.dict");
        let options = MigrationOptions {
            config: StructureConfig {
                gc_threshold,
                ..StructureConfig::default()
            },
            ..MigrationOptions::default()
        };
        migrate(src.as_ref(), &constrained, 403, &options).unwrap();

        let a = TrieDictionary::open(&unconstrained, 0, 0, true, StructureConfig::default()).unwrap();
        let b = TrieDictionary::open(&constrained, 0, 0, true, StructureConfig::default()).unwrap();
        // The destination crossed the threshold, so GC ran mid-migration.
        assert!(a.used_bytes() > gc_threshold);
        assert_eq!(content(&a), content(src.as_ref()));
        assert_eq!(content(&b), content(&a));
        assert_eq!(a.bigram_count(), 3 * words.len());
        assert_eq!(b.bigram_count(), 3 * words.len());
    }

    #[test]
    fn test_bigrams_before_unigrams_fail() {
        let mut src = source(4);
        add(src.as_mut(), "cat", 120);
        add(src.as_mut(), "dog", 80);
        add_bigram(src.as_mut(), "cat", "dog", 40);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.dict");
        let config = StructureConfig::default();
        let mut dest = factory::create_on_memory(4, "en_US", BTreeMap::new(), &config).unwrap();
        let mut flushed = false;
        let err = run_pass(Pass::Bigrams, src.as_ref(), &mut dest, &path, &config, &mut flushed)
            .unwrap_err();
        assert!(matches!(unwrap_migration(err), Error::WordNotFound));
        assert!(!flushed);
    }

    #[test]
    fn test_unsupported_version_writes_nothing() {
        let mut src = source(4);
        add(src.as_mut(), "cat", 120);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never.dict");

        let err = migrate(src.as_ref(), &path, 7, &MigrationOptions::default()).unwrap_err();
        assert!(matches!(unwrap_migration(err), Error::UnsupportedFormatVersion(7)));
        assert!(!path.exists());
    }

    fn failing_source() -> Box<dyn StructurePolicy> {
        let mut src = source(4);
        for word in ["a", "b", "x", "y"] {
            add(src.as_mut(), word, 10);
        }
        add_bigram(src.as_mut(), "a", "x", 1);
        add_bigram(src.as_mut(), "b", "y", 2);
        src
    }

    fn failing_options(partial_output: PartialOutput) -> MigrationOptions {
        // The second bigram triggers a GC flush, then exceeds the limit.
        MigrationOptions {
            partial_output,
            config: StructureConfig {
                max_bigram_count: 1,
                ..StructureConfig::default()
            },
        }
    }

    #[test]
    fn test_failed_migration_removes_partial_output() {
        let src = failing_source();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.dict");

        let err = migrate(src.as_ref(), &path, 4, &failing_options(PartialOutput::Remove))
            .unwrap_err();
        assert!(matches!(
            unwrap_migration(err),
            Error::CountLimitReached { kind: "bigram", .. }
        ));
        assert!(!path.exists());
    }

    #[test]
    fn test_failed_migration_can_keep_partial_output() {
        let src = failing_source();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.dict");

        assert!(migrate(src.as_ref(), &path, 4, &failing_options(PartialOutput::Keep)).is_err());
        let kept = TrieDictionary::open(&path, 0, 0, true, StructureConfig::default()).unwrap();
        assert_eq!(kept.unigram_count(), 4);
        assert_eq!(kept.bigram_count(), 1);
    }

    #[test]
    fn test_failed_migration_keeps_preexisting_file() {
        let src = failing_source();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("existing.dict");
        fs::write(&path, b"not ours").unwrap();

        let err = migrate(src.as_ref(), &path, 9, &MigrationOptions::default()).unwrap_err();
        assert!(matches!(unwrap_migration(err), Error::UnsupportedFormatVersion(9)));
        assert_eq!(fs::read(&path).unwrap(), b"not ours");
    }

    fn cat_dog() -> TrieDictionary {
        let header = DictionaryHeader::new(FormatVersion::V4, "en_US", BTreeMap::new());
        let mut src = TrieDictionary::new(header, StructureConfig::default());
        add(&mut src, "cat", 120);
        add(&mut src, "dog", 80);
        add_bigram(&mut src, "cat", "dog", 40);
        src
    }

    #[test]
    fn test_unreadable_source_word_aborts() {
        let mut src = cat_dog();
        src.damage_unigram_pointer(&code_points("dog"));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("migrated.dict");

        let err = migrate(&src, &path, 4, &MigrationOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::Migration {
                step: "reading a source word",
                ..
            }
        ));
        assert!(src.is_corrupted());
        assert!(!path.exists());
    }

    #[test]
    fn test_truncated_source_traversal_aborts() {
        let mut src = cat_dog();
        src.damage_terminal(&code_points("dog"));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("migrated.dict");

        let err = migrate(&src, &path, 4, &MigrationOptions::default()).unwrap_err();
        assert!(matches!(unwrap_migration(err), Error::InvalidFormat(_)));
        assert!(!path.exists());
    }
}
