//! `TrieDictionary`: an updatable dictionary structure stored in two [`TrieMap`]s
//! and two append-only content buffers.
//!
//! ## Layout
//!
//! ```text
//! node_map     code point trie. Each entry is one code point of a word; its nested
//!              table holds the following code points. Value 0 marks a node that is
//!              only a prefix, any other value is (terminal offset + 1).
//! terminals    one record per word, in insertion order:
//!              [len u8][code points i32 LE * len][unigram record offset u32 LE]
//! properties   append-only unigram and bigram records
//! bigram_map   root key = source terminal offset, nested table keyed by target
//!              terminal offset, value = bigram record offset
//! ```
//!
//! A word's terminal offset is its identity for bigrams and the traversal token.
//! Overwriting a unigram or bigram appends a new record and leaves the old one as
//! superseded bytes until [`flush_with_gc`](StructurePolicy::flush_with_gc) rebuilds
//! the structure.

use std::cell::Cell;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info, warn};
use smallvec::SmallVec;

use crate::config::StructureConfig;
use crate::error::{Error, Result};
use crate::trie_map::{TableHandle, TrieMap, SLOT_SIZE};

use super::header::{DictionaryHeader, FormatVersion};
use super::image;
use super::policy::StructurePolicy;
use super::property::{
    is_valid_probability, to_string, BigramProperty, HistoricalInfo, ShortcutProperty,
    UnigramProperty, WordProperty, MAX_WORD_LENGTH, NOT_A_PROBABILITY,
};

pub const UNIGRAM_COUNT_QUERY: &str = "UNIGRAM_COUNT";
pub const BIGRAM_COUNT_QUERY: &str = "BIGRAM_COUNT";
pub const MAX_UNIGRAM_COUNT_QUERY: &str = "MAX_UNIGRAM_COUNT";
pub const MAX_BIGRAM_COUNT_QUERY: &str = "MAX_BIGRAM_COUNT";

const FLAG_NOT_A_WORD: u8 = 1 << 0;
const FLAG_BLACKLISTED: u8 = 1 << 1;

/// timestamp i32, level u8, count u8
const HISTORICAL_INFO_SIZE: usize = 6;
const MAX_SHORTCUTS: usize = u8::MAX as usize;

/// Upper bound on arena growth caused by inserting one key into one table: a run
/// reallocated one slot larger, a split chain down to the deepest level and one
/// next-level slot.
const SLOTS_PER_KEY_BOUND: usize = 48;

/// Offsets are used as `i32` keys of the bigram map.
const MAX_BUFFER_BYTES: usize = i32::MAX as usize;

/// Owned content of a structure, shared with the image codec.
#[derive(Clone, Default)]
pub(crate) struct Buffers {
    pub(crate) node_map: TrieMap,
    pub(crate) bigram_map: TrieMap,
    pub(crate) terminals: Vec<u8>,
    pub(crate) properties: Vec<u8>,
    pub(crate) unigram_count: usize,
    pub(crate) bigram_count: usize,
}

impl Buffers {
    fn used_bytes(&self) -> usize {
        self.terminals.len()
            + self.properties.len()
            + self.node_map.used_bytes()
            + self.bigram_map.used_bytes()
    }
}

struct Terminal {
    code_points: SmallVec<[i32; 16]>,
    property: u32,
    size: usize,
}

impl Terminal {
    /// Byte offset of the unigram pointer inside the record.
    #[inline]
    fn property_field(&self) -> usize {
        1 + 4 * self.code_points.len()
    }
}

#[inline]
fn word_key(terminal: u32) -> i32 {
    terminal as i32
}

fn check_word(word: &[i32]) -> Result<()> {
    if word.is_empty() || word.len() > MAX_WORD_LENGTH {
        return Err(Error::InvalidWord {
            len: word.len(),
            max: MAX_WORD_LENGTH,
        });
    }
    Ok(())
}

fn check_probability(probability: i32) -> Result<()> {
    if is_valid_probability(probability) {
        Ok(())
    } else {
        Err(Error::InvalidProbability(probability))
    }
}

// =============================================================================
// Record codec
// =============================================================================

fn write_historical_info(out: &mut Vec<u8>, info: &HistoricalInfo) -> Result<()> {
    out.write_i32::<LittleEndian>(info.timestamp)?;
    out.write_u8(info.level)?;
    out.write_u8(info.count)?;
    Ok(())
}

fn read_historical_info(r: &mut &[u8]) -> Option<HistoricalInfo> {
    Some(HistoricalInfo {
        timestamp: r.read_i32::<LittleEndian>().ok()?,
        level: r.read_u8().ok()?,
        count: r.read_u8().ok()?,
    })
}

fn encode_terminal(word: &[i32], property: u32) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(5 + 4 * word.len());
    out.write_u8(word.len() as u8)?;
    for &cp in word {
        out.write_i32::<LittleEndian>(cp)?;
    }
    out.write_u32::<LittleEndian>(property)?;
    Ok(out)
}

fn parse_terminal(buf: &[u8], offset: usize) -> Option<Terminal> {
    let mut r = buf.get(offset..)?;
    let len = r.read_u8().ok()? as usize;
    if len == 0 || len > MAX_WORD_LENGTH {
        return None;
    }
    let mut code_points = SmallVec::with_capacity(len);
    for _ in 0..len {
        code_points.push(r.read_i32::<LittleEndian>().ok()?);
    }
    let property = r.read_u32::<LittleEndian>().ok()?;
    Some(Terminal {
        code_points,
        property,
        size: 1 + 4 * len + 4,
    })
}

fn encode_unigram(property: &UnigramProperty, historical: bool) -> Result<Vec<u8>> {
    let mut flags = 0;
    if property.is_not_a_word {
        flags |= FLAG_NOT_A_WORD;
    }
    if property.is_blacklisted {
        flags |= FLAG_BLACKLISTED;
    }
    let mut out = Vec::new();
    out.write_u8(flags)?;
    out.write_u8(property.probability as u8)?;
    if historical {
        write_historical_info(&mut out, &property.historical_info)?;
    }
    out.write_u8(property.shortcuts.len() as u8)?;
    for shortcut in &property.shortcuts {
        out.write_u8(shortcut.probability as u8)?;
        out.write_u8(shortcut.target.len() as u8)?;
        for &cp in &shortcut.target {
            out.write_i32::<LittleEndian>(cp)?;
        }
    }
    Ok(out)
}

/// Returns the property and the size of its record.
fn parse_unigram(buf: &[u8], offset: usize, historical: bool) -> Option<(UnigramProperty, usize)> {
    let mut r = buf.get(offset..)?;
    let start = r.len();
    let flags = r.read_u8().ok()?;
    let probability = i32::from(r.read_u8().ok()?);
    let historical_info = if historical {
        read_historical_info(&mut r)?
    } else {
        HistoricalInfo::default()
    };
    let count = r.read_u8().ok()?;
    let mut shortcuts = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let probability = i32::from(r.read_u8().ok()?);
        let len = r.read_u8().ok()? as usize;
        let mut target = Vec::with_capacity(len);
        for _ in 0..len {
            target.push(r.read_i32::<LittleEndian>().ok()?);
        }
        shortcuts.push(ShortcutProperty {
            target,
            probability,
        });
    }
    let property = UnigramProperty {
        probability,
        is_not_a_word: flags & FLAG_NOT_A_WORD != 0,
        is_blacklisted: flags & FLAG_BLACKLISTED != 0,
        historical_info,
        shortcuts,
    };
    Some((property, start - r.len()))
}

fn encode_bigram(property: &BigramProperty, historical: bool) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(1 + HISTORICAL_INFO_SIZE);
    out.write_u8(property.probability as u8)?;
    if historical {
        write_historical_info(&mut out, &property.historical_info)?;
    }
    Ok(out)
}

fn parse_bigram(buf: &[u8], offset: usize, historical: bool) -> Option<(i32, HistoricalInfo)> {
    let mut r = buf.get(offset..)?;
    let probability = i32::from(r.read_u8().ok()?);
    let info = if historical {
        read_historical_info(&mut r)?
    } else {
        HistoricalInfo::default()
    };
    Some((probability, info))
}

// =============================================================================
// TrieDictionary
// =============================================================================

/// The [`TrieMap`]-backed [`StructurePolicy`].
pub struct TrieDictionary {
    header: DictionaryHeader,
    config: StructureConfig,
    updatable: bool,
    buffers: Buffers,
    superseded_bytes: usize,
    corrupted: Cell<bool>,
}

impl TrieDictionary {
    /// Creates an empty, updatable structure.
    pub fn new(header: DictionaryHeader, config: StructureConfig) -> Self {
        Self::from_buffers(header, Buffers::default(), true, config)
    }

    pub(crate) fn from_buffers(
        header: DictionaryHeader,
        buffers: Buffers,
        updatable: bool,
        config: StructureConfig,
    ) -> Self {
        Self {
            header,
            config,
            updatable,
            buffers,
            superseded_bytes: 0,
            corrupted: Cell::new(false),
        }
    }

    /// Opens the image at `path`, restricted to `size` bytes from `offset`
    /// (`size == 0` reads to the end of the file).
    pub fn open(
        path: &Path,
        offset: usize,
        size: usize,
        updatable: bool,
        config: StructureConfig,
    ) -> Result<Self> {
        let (header, buffers) = image::read_file(path, offset, size)?;
        info!(
            "opened {} ({} words, {} bigrams, version {}, updatable: {})",
            path.display(),
            buffers.unigram_count,
            buffers.bigram_count,
            header.format_version(),
            updatable
        );
        Ok(Self::from_buffers(header, buffers, updatable, config))
    }

    #[inline]
    pub fn format_version(&self) -> FormatVersion {
        self.header.format_version()
    }

    pub fn unigram_count(&self) -> usize {
        self.buffers.unigram_count
    }

    pub fn bigram_count(&self) -> usize {
        self.buffers.bigram_count
    }

    /// Bytes held by content buffers and trie arenas.
    pub fn used_bytes(&self) -> usize {
        self.buffers.used_bytes()
    }

    /// Bytes of records that were overwritten or removed since the last rebuild.
    pub fn superseded_bytes(&self) -> usize {
        self.superseded_bytes
    }

    #[inline]
    fn has_historical_info(&self) -> bool {
        self.header.format_version().has_historical_info()
    }

    fn ensure_updatable(&self) -> Result<()> {
        if self.updatable {
            Ok(())
        } else {
            warn!("rejected mutation of a non-updatable dictionary");
            Err(Error::NotUpdatable)
        }
    }

    /// Fails with `BufferFull` unless `content` buffer bytes plus the worst-case
    /// arena growth for `new_keys` key insertions fit the capacity.
    fn check_capacity(&self, content: usize, new_keys: usize) -> Result<()> {
        let capacity = self.config.buffer_capacity.min(MAX_BUFFER_BYTES);
        let used = self.used_bytes();
        let requested = content + new_keys * SLOTS_PER_KEY_BOUND * SLOT_SIZE;
        if used + requested > capacity {
            warn!("dictionary buffer full: {used} + {requested} > {capacity}");
            return Err(Error::BufferFull {
                used,
                requested,
                capacity,
            });
        }
        Ok(())
    }

    fn corrupt<T>(&self) -> Option<T> {
        if !self.corrupted.replace(true) {
            warn!("dictionary record pointer out of bounds; marking corrupted");
        }
        None
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    fn find_terminal(&self, word: &[i32]) -> Option<u32> {
        let (&last, init) = word.split_last()?;
        let map = &self.buffers.node_map;
        let mut table = map.root();
        for &cp in init {
            table = map.next_level(cp, table)?;
        }
        match map.get(last, table)? {
            0 => None,
            value => u32::try_from(value - 1).ok().or_else(|| self.corrupt()),
        }
    }

    fn read_terminal(&self, offset: u32) -> Option<Terminal> {
        parse_terminal(&self.buffers.terminals, offset as usize).or_else(|| self.corrupt())
    }

    fn read_unigram(&self, offset: u32) -> Option<(UnigramProperty, usize)> {
        parse_unigram(
            &self.buffers.properties,
            offset as usize,
            self.has_historical_info(),
        )
        .or_else(|| self.corrupt())
    }

    /// Flags and probability only.
    fn read_unigram_head(&self, offset: u32) -> Option<(u8, i32)> {
        let head = self
            .buffers
            .properties
            .get(offset as usize..offset as usize + 2);
        match head {
            Some(&[flags, probability]) => Some((flags, i32::from(probability))),
            _ => self.corrupt(),
        }
    }

    fn read_bigram(&self, offset: u64) -> Option<(i32, HistoricalInfo)> {
        let offset = usize::try_from(offset).ok()?;
        parse_bigram(&self.buffers.properties, offset, self.has_historical_info())
            .or_else(|| self.corrupt())
    }

    /// Probability of a suggestible word, `None` for flagged or corrupt entries.
    fn unigram_probability_of(&self, terminal: u32) -> Option<i32> {
        let property = self.read_terminal(terminal)?.property;
        let (flags, probability) = self.read_unigram_head(property)?;
        (flags & (FLAG_NOT_A_WORD | FLAG_BLACKLISTED) == 0).then_some(probability)
    }

    fn bigram_table(&self, source: u32) -> Option<TableHandle> {
        let map = &self.buffers.bigram_map;
        map.next_level(word_key(source), map.root())
    }

    fn bigram_record_size(&self) -> usize {
        if self.has_historical_info() {
            1 + HISTORICAL_INFO_SIZE
        } else {
            1
        }
    }

    fn read_bigrams(&self, source: u32) -> Vec<BigramProperty> {
        let Some(table) = self.bigram_table(source) else {
            return Vec::new();
        };
        let mut relations: Vec<(u32, u64)> = self
            .buffers
            .bigram_map
            .entries(table)
            .map(|entry| (entry.key as u32, entry.value))
            .collect();
        relations.sort_unstable_by_key(|&(target, _)| target);
        relations
            .into_iter()
            .filter_map(|(target, record)| {
                let terminal = self.read_terminal(target)?;
                let (probability, historical_info) = self.read_bigram(record)?;
                Some(BigramProperty {
                    target: terminal.code_points.to_vec(),
                    probability,
                    historical_info,
                })
            })
            .collect()
    }

    fn walk_completions(
        &self,
        table: TableHandle,
        path: &mut Vec<i32>,
        f: &mut dyn FnMut(&[i32], i32),
    ) {
        if path.len() >= MAX_WORD_LENGTH {
            return;
        }
        for entry in self.buffers.node_map.entries(table) {
            path.push(entry.key);
            self.emit_completion(entry.value, path, f);
            if let Some(next) = entry.next_level {
                self.walk_completions(next, path, f);
            }
            path.pop();
        }
    }

    fn emit_completion(&self, value: u64, path: &[i32], f: &mut dyn FnMut(&[i32], i32)) {
        if value == 0 {
            return;
        }
        let terminal = match u32::try_from(value - 1) {
            Ok(terminal) => terminal,
            Err(_) => return,
        };
        if let Some(probability) = self.unigram_probability_of(terminal) {
            f(path, probability);
        }
    }

    /// Calls `f` for every stored word, in traversal order.
    fn for_each_word(&self, mut f: impl FnMut(&[i32]) -> Result<()>) -> Result<()> {
        let mut word = Vec::with_capacity(MAX_WORD_LENGTH);
        let mut token = 0;
        loop {
            token = self.next_word(token, &mut word);
            if word.is_empty() {
                return Ok(());
            }
            f(&word)?;
            if token == 0 {
                return Ok(());
            }
        }
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    fn insert_path(&mut self, word: &[i32], terminal: u32) -> Result<()> {
        let Some((&last, init)) = word.split_last() else {
            return Err(Error::InvalidWord {
                len: 0,
                max: MAX_WORD_LENGTH,
            });
        };
        let map = &mut self.buffers.node_map;
        let mut table = map.root();
        for &cp in init {
            if !map.contains_key(cp, table) {
                map.put(cp, 0, table)?;
            }
            table = map
                .get_or_create_next_level(cp, table)
                .ok_or(Error::TrieMapFull)?;
        }
        map.put(last, u64::from(terminal) + 1, table)
    }

    /// Rebuilds the structure from its live content, dropping superseded records
    /// and unreachable tables.
    ///
    /// Fails without touching the buffers if any live record cannot be read.
    fn rebuild(&mut self) -> Result<()> {
        if self.is_corrupted() {
            return Err(Error::InvalidFormat("cannot compact a corrupted dictionary".into()));
        }
        let mut fresh = TrieDictionary::new(self.header.clone(), self.config.clone());
        self.for_each_word(|word| match self.get_word_property(word) {
            Some(property) => fresh.add_unigram_word(word, &property.unigram),
            None => Err(Error::InvalidFormat(format!(
                "unreadable record for {:?}",
                to_string(word)
            ))),
        })?;
        self.for_each_word(|word| {
            let id = self.find_terminal(word).ok_or(Error::WordNotFound)?;
            for bigram in self.read_bigrams(id) {
                fresh.add_bigram_words(word, &bigram)?;
            }
            Ok(())
        })?;
        // Traversal and bigram reads stop short on damaged records.
        if self.is_corrupted() {
            return Err(Error::InvalidFormat("dictionary records out of bounds".into()));
        }

        debug!(
            "rebuilt dictionary: {} -> {} bytes, {} superseded bytes dropped",
            self.used_bytes(),
            fresh.used_bytes(),
            self.superseded_bytes
        );
        self.buffers = fresh.buffers;
        self.buffers.node_map.shrink_to_fit();
        self.buffers.bigram_map.shrink_to_fit();
        self.superseded_bytes = 0;
        Ok(())
    }
}

impl StructurePolicy for TrieDictionary {
    fn header(&self) -> &DictionaryHeader {
        &self.header
    }

    fn is_updatable(&self) -> bool {
        self.updatable
    }

    fn get_probability(&self, word: &[i32]) -> i32 {
        self.find_terminal(word)
            .and_then(|terminal| self.unigram_probability_of(terminal))
            .unwrap_or(NOT_A_PROBABILITY)
    }

    fn get_bigram_probability(&self, word0: &[i32], word1: &[i32]) -> i32 {
        let probability = || {
            let source = self.find_terminal(word0)?;
            let target = self.find_terminal(word1)?;
            let table = self.bigram_table(source)?;
            let record = self.buffers.bigram_map.get(word_key(target), table)?;
            self.read_bigram(record).map(|(probability, _)| probability)
        };
        probability().unwrap_or(NOT_A_PROBABILITY)
    }

    fn get_word_property(&self, word: &[i32]) -> Option<WordProperty> {
        let id = self.find_terminal(word)?;
        let terminal = self.read_terminal(id)?;
        let (unigram, _) = self.read_unigram(terminal.property)?;
        Some(WordProperty {
            code_points: terminal.code_points.to_vec(),
            unigram,
            bigrams: self.read_bigrams(id),
        })
    }

    fn next_word(&self, token: u32, out: &mut Vec<i32>) -> u32 {
        out.clear();
        let offset = token as usize;
        if offset >= self.buffers.terminals.len() {
            return 0;
        }
        let Some(terminal) = self.read_terminal(token) else {
            return 0;
        };
        out.extend_from_slice(&terminal.code_points);
        let next = offset + terminal.size;
        if next >= self.buffers.terminals.len() {
            0
        } else {
            next as u32
        }
    }

    fn for_each_completion(&self, prefix: &[i32], f: &mut dyn FnMut(&[i32], i32)) {
        let map = &self.buffers.node_map;
        let mut path = prefix.to_vec();
        let start = match prefix.split_last() {
            None => Some(map.root()),
            Some((&last, init)) => {
                let mut table = map.root();
                for &cp in init {
                    match map.next_level(cp, table) {
                        Some(next) => table = next,
                        None => return,
                    }
                }
                let Some(value) = map.get(last, table) else {
                    return;
                };
                self.emit_completion(value, &path, f);
                map.next_level(last, table)
            }
        };
        if let Some(table) = start {
            self.walk_completions(table, &mut path, f);
        }
    }

    fn add_unigram_word(&mut self, word: &[i32], property: &UnigramProperty) -> Result<()> {
        self.ensure_updatable()?;
        check_word(word)?;
        check_probability(property.probability)?;
        if property.shortcuts.len() > MAX_SHORTCUTS {
            return Err(Error::CountLimitReached {
                kind: "shortcut",
                limit: MAX_SHORTCUTS,
            });
        }
        for shortcut in &property.shortcuts {
            check_word(&shortcut.target)?;
            check_probability(shortcut.probability)?;
        }
        let record = encode_unigram(property, self.has_historical_info())?;

        if let Some(id) = self.find_terminal(word) {
            let terminal = self
                .read_terminal(id)
                .ok_or_else(|| Error::InvalidFormat(format!("bad terminal record at {id}")))?;
            self.check_capacity(record.len(), 0)?;
            let old_size = self
                .read_unigram(terminal.property)
                .map_or(0, |(_, size)| size);

            let offset = self.buffers.properties.len() as u32;
            self.buffers.properties.extend_from_slice(&record);
            let field = id as usize + terminal.property_field();
            LittleEndian::write_u32(&mut self.buffers.terminals[field..field + 4], offset);
            self.superseded_bytes += old_size;
            return Ok(());
        }

        if self.buffers.unigram_count >= self.config.max_unigram_count {
            warn!("unigram count limit {} reached", self.config.max_unigram_count);
            return Err(Error::CountLimitReached {
                kind: "unigram",
                limit: self.config.max_unigram_count,
            });
        }
        let terminal = encode_terminal(word, self.buffers.properties.len() as u32)?;
        self.check_capacity(record.len() + terminal.len(), word.len())?;

        let id = self.buffers.terminals.len() as u32;
        self.insert_path(word, id)?;
        self.buffers.terminals.extend_from_slice(&terminal);
        self.buffers.properties.extend_from_slice(&record);
        self.buffers.unigram_count += 1;
        Ok(())
    }

    fn add_bigram_words(&mut self, word0: &[i32], property: &BigramProperty) -> Result<()> {
        self.ensure_updatable()?;
        check_word(word0)?;
        check_word(&property.target)?;
        check_probability(property.probability)?;
        let source = self.find_terminal(word0).ok_or(Error::WordNotFound)?;
        let target = self
            .find_terminal(&property.target)
            .ok_or(Error::WordNotFound)?;
        let record = encode_bigram(property, self.has_historical_info())?;

        let exists = self
            .bigram_table(source)
            .is_some_and(|table| self.buffers.bigram_map.contains_key(word_key(target), table));
        if exists {
            self.check_capacity(record.len(), 0)?;
        } else {
            if self.buffers.bigram_count >= self.config.max_bigram_count {
                warn!("bigram count limit {} reached", self.config.max_bigram_count);
                return Err(Error::CountLimitReached {
                    kind: "bigram",
                    limit: self.config.max_bigram_count,
                });
            }
            self.check_capacity(record.len(), 2)?;
        }

        let offset = self.buffers.properties.len() as u64;
        let map = &mut self.buffers.bigram_map;
        if !map.contains_key(word_key(source), map.root()) {
            map.put_root(word_key(source), 0)?;
        }
        let table = map
            .get_or_create_next_level_root(word_key(source))
            .ok_or(Error::TrieMapFull)?;
        map.put(word_key(target), offset, table)?;
        self.buffers.properties.extend_from_slice(&record);
        if exists {
            self.superseded_bytes += self.bigram_record_size();
        } else {
            self.buffers.bigram_count += 1;
        }
        Ok(())
    }

    fn remove_bigram_words(&mut self, word0: &[i32], word1: &[i32]) -> Result<()> {
        self.ensure_updatable()?;
        check_word(word0)?;
        check_word(word1)?;
        let source = self.find_terminal(word0).ok_or(Error::WordNotFound)?;
        let target = self.find_terminal(word1).ok_or(Error::WordNotFound)?;
        let Some(table) = self.bigram_table(source) else {
            return Ok(());
        };
        if self.buffers.bigram_map.remove(word_key(target), table) {
            self.buffers.bigram_count -= 1;
            self.superseded_bytes += self.bigram_record_size();
        }
        Ok(())
    }

    fn needs_to_run_gc(&self, minds_block_by_gc: bool) -> bool {
        if !self.updatable {
            return false;
        }
        let used = self.used_bytes();
        if used >= self.config.gc_threshold {
            debug!("GC needed: {used} bytes used, threshold {}", self.config.gc_threshold);
            return true;
        }
        if self.buffers.unigram_count >= self.config.max_unigram_count
            || self.buffers.bigram_count >= self.config.max_bigram_count
        {
            debug!("GC needed: count limit reached");
            return true;
        }
        !minds_block_by_gc && self.superseded_bytes >= self.config.eager_gc_superseded_bytes
    }

    fn flush(&self, path: &Path) -> Result<()> {
        self.ensure_updatable()?;
        image::write_file(path, &self.header, &self.buffers)?;
        info!(
            "flushed {} words and {} bigrams to {}",
            self.buffers.unigram_count,
            self.buffers.bigram_count,
            path.display()
        );
        Ok(())
    }

    fn flush_with_gc(&mut self, path: &Path) -> Result<()> {
        self.ensure_updatable()?;
        self.rebuild()?;
        self.flush(path)
    }

    fn get_property(&self, query: &str) -> String {
        match query {
            UNIGRAM_COUNT_QUERY => self.buffers.unigram_count.to_string(),
            BIGRAM_COUNT_QUERY => self.buffers.bigram_count.to_string(),
            MAX_UNIGRAM_COUNT_QUERY => self.config.max_unigram_count.to_string(),
            MAX_BIGRAM_COUNT_QUERY => self.config.max_bigram_count.to_string(),
            _ => String::new(),
        }
    }

    fn is_corrupted(&self) -> bool {
        self.corrupted.get()
    }
}

#[cfg(test)]
impl TrieDictionary {
    /// Points the unigram record of `word` past the end of the property buffer.
    pub(crate) fn damage_unigram_pointer(&mut self, word: &[i32]) {
        let terminal = self.find_terminal(word).unwrap() as usize;
        let field = terminal + 1 + 4 * word.len();
        LittleEndian::write_u32(&mut self.buffers.terminals[field..field + 4], 1 << 20);
    }

    /// Zeroes the length byte of `word`'s terminal, which ends traversal there.
    pub(crate) fn damage_terminal(&mut self, word: &[i32]) {
        let terminal = self.find_terminal(word).unwrap() as usize;
        self.buffers.terminals[terminal] = 0;
    }
}
