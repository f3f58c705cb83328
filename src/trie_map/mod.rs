//! A forest of sparse, bitmap-indexed integer maps.
//!
//! Every table (the root table and any number of lazily created nested tables) is a
//! small tree of 32-way bitmap nodes living in one shared slot arena. A node stores a
//! presence bitmap and the offset of a compacted run holding only its occupied
//! children; a child's position in the run is the population count of the bitmap
//! below its bit. Level `l` consumes key bits `5l..5l+5`, low bits first, so no key
//! distribution can push a lookup deeper than seven levels.
//!
//! ## Example
//!
//! ```rust
//! use triedict::TrieMap;
//!
//! let mut map = TrieMap::new();
//! map.put_root(10, 100).unwrap();
//! let next = map.get_or_create_next_level_root(10).unwrap();
//! map.put(9, 9, next).unwrap();
//!
//! assert_eq!(map.get_root(10), Some(100));
//! assert_eq!(map.get(9, next), Some(9));
//! assert_eq!(map.get(10, next), None);
//! ```

use std::fmt;
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use smallvec::SmallVec;

use crate::error::{Error, Result};

// =============================================================================
// Configuration
// =============================================================================

const LABEL_BITS: u32 = 5;
const LABEL_MASK: u32 = (1 << LABEL_BITS) - 1;
/// Deepest level; level 6 holds the two most significant key bits.
const MAX_LEVEL: u32 = 6;
const FAN_OUT: usize = 1 << LABEL_BITS;

/// Index of the root table's bitmap slot.
const ROOT_SLOT: u32 = 0;
/// Slot indices must fit the 31-bit next-level field of a terminal slot.
const MAX_SLOTS: usize = (1 << 31) - 1;

/// Bytes occupied by one slot in memory and in a persisted image.
pub const SLOT_SIZE: usize = 16;

#[inline]
fn label(key: i32, level: u32) -> u32 {
    ((key as u32) >> (level * LABEL_BITS)) & LABEL_MASK
}

// =============================================================================
// Slot type
// =============================================================================

/// A packed arena slot.
///
/// Layout:
/// - Bitmap slot: `head` = run offset (low 32 bits), bit 63 = 0; `tail` = bitmap.
/// - Terminal slot: bit 63 = 1, bits 32..63 = next-level slot index (0 = none),
///   low 32 bits = key; `tail` = value.
#[derive(Clone, Copy, PartialEq, Eq)]
struct Slot {
    head: u64,
    tail: u64,
}

impl Slot {
    const TERMINAL_BIT: u64 = 1u64 << 63;
    const NEXT_SHIFT: u32 = 32;
    const NEXT_MASK: u64 = (1u64 << 31) - 1;
    const EMPTY_TABLE: Slot = Slot { head: 0, tail: 0 };

    #[inline]
    fn bitmap(bitmap: u32, run: u32) -> Self {
        Self {
            head: u64::from(run),
            tail: u64::from(bitmap),
        }
    }

    #[inline]
    fn terminal(key: i32, value: u64, next_level: u32) -> Self {
        debug_assert!(u64::from(next_level) <= Self::NEXT_MASK);
        Self {
            head: Self::TERMINAL_BIT
                | (u64::from(next_level) << Self::NEXT_SHIFT)
                | u64::from(key as u32),
            tail: value,
        }
    }

    #[inline]
    fn is_terminal(self) -> bool {
        self.head & Self::TERMINAL_BIT != 0
    }

    #[inline]
    fn key(self) -> i32 {
        debug_assert!(self.is_terminal());
        self.head as u32 as i32
    }

    #[inline]
    fn value(self) -> u64 {
        debug_assert!(self.is_terminal());
        self.tail
    }

    #[inline]
    fn next_level(self) -> u32 {
        debug_assert!(self.is_terminal());
        ((self.head >> Self::NEXT_SHIFT) & Self::NEXT_MASK) as u32
    }

    #[inline]
    fn with_value(self, value: u64) -> Self {
        Self::terminal(self.key(), value, self.next_level())
    }

    #[inline]
    fn with_next_level(self, next_level: u32) -> Self {
        Self::terminal(self.key(), self.value(), next_level)
    }

    #[inline]
    fn run(self) -> u32 {
        debug_assert!(!self.is_terminal());
        self.head as u32
    }

    #[inline]
    fn bits(self) -> u32 {
        debug_assert!(!self.is_terminal());
        self.tail as u32
    }

    #[inline]
    fn run_len(self) -> usize {
        self.bits().count_ones() as usize
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_terminal() {
            f.debug_struct("Terminal")
                .field("key", &self.key())
                .field("value", &self.value())
                .field("next_level", &self.next_level())
                .finish()
        } else {
            f.debug_struct("Bitmap")
                .field("bits", &format_args!("{:#034b}", self.bits()))
                .field("run", &self.run())
                .finish()
        }
    }
}

// =============================================================================
// Slot arena
// =============================================================================

/// Slot arena with exact run-length free lists.
#[derive(Clone)]
struct SlotArena {
    slots: Vec<Slot>,
    /// Free runs by length (`free[len]`).
    free: Vec<Vec<u32>>,
}

impl SlotArena {
    fn new() -> Self {
        Self {
            slots: vec![Slot::EMPTY_TABLE],
            free: (0..=FAN_OUT).map(|_| Vec::new()).collect(),
        }
    }

    fn from_slots(slots: Vec<Slot>) -> Self {
        Self {
            slots,
            free: (0..=FAN_OUT).map(|_| Vec::new()).collect(),
        }
    }

    fn alloc(&mut self, len: usize) -> Result<u32> {
        debug_assert!((1..=FAN_OUT).contains(&len));
        if let Some(off) = self.free[len].pop() {
            return Ok(off);
        }
        let off = self.slots.len();
        if off + len > MAX_SLOTS {
            return Err(Error::TrieMapFull);
        }
        self.slots.resize(off + len, Slot::EMPTY_TABLE);
        Ok(off as u32)
    }

    fn release(&mut self, off: u32, len: usize) {
        debug_assert!((1..=FAN_OUT).contains(&len));
        self.free[len].push(off);
    }

    fn capacity_bytes(&self) -> usize {
        self.slots.capacity() * SLOT_SIZE
            + self.free.iter().map(|v| v.capacity() * 4).sum::<usize>()
    }

    fn shrink_to_fit(&mut self) {
        self.slots.shrink_to_fit();
        for v in &mut self.free {
            v.shrink_to_fit();
        }
    }
}

// =============================================================================
// Public types
// =============================================================================

/// Opaque handle to a table inside one [`TrieMap`].
///
/// Handles are only produced by the map itself and stay valid for the life of the
/// map that produced them. A handle from one map means nothing to another.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TableHandle(u32);

impl TableHandle {
    #[inline]
    fn slot(self) -> usize {
        self.0 as usize
    }
}

/// A live entry of one table, as yielded by [`TrieMap::entries`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Entry {
    pub key: i32,
    pub value: u64,
    /// The nested table owned by this entry, if one was created.
    pub next_level: Option<TableHandle>,
}

/// Location of a terminal slot found by a descent.
#[derive(Clone, Copy)]
struct Found {
    /// Bitmap slot owning the run that contains the terminal.
    parent: usize,
    /// Absolute slot index of the terminal.
    slot: usize,
    /// Level of the owning bitmap node.
    level: u32,
}

// =============================================================================
// TrieMap
// =============================================================================

/// A memory-compact forest of integer-keyed maps.
///
/// Values are limited to [`TrieMap::MAX_VALUE`] (36 bits); wider values are
/// rejected and leave the map unchanged.
#[derive(Clone)]
pub struct TrieMap {
    arena: SlotArena,
    len: usize,
}

impl TrieMap {
    /// Width of the value field in bits.
    pub const VALUE_BITS: u32 = 36;
    /// Largest storable value.
    pub const MAX_VALUE: u64 = (1u64 << Self::VALUE_BITS) - 1;

    pub fn new() -> Self {
        Self {
            arena: SlotArena::new(),
            len: 0,
        }
    }

    /// Handle of the root table.
    #[inline]
    pub fn root(&self) -> TableHandle {
        TableHandle(ROOT_SLOT)
    }

    /// Number of live entries across every table.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes of arena slots in use, including slots parked on free lists.
    #[inline]
    pub fn used_bytes(&self) -> usize {
        self.arena.slots.len() * SLOT_SIZE
    }

    pub fn memory_usage(&self) -> usize {
        self.arena.capacity_bytes()
    }

    pub fn shrink_to_fit(&mut self) {
        self.arena.shrink_to_fit();
    }

    pub fn put_root(&mut self, key: i32, value: u64) -> Result<()> {
        self.put(key, value, self.root())
    }

    pub fn get_root(&self, key: i32) -> Option<u64> {
        self.get(key, self.root())
    }

    pub fn get_or_create_next_level_root(&mut self, key: i32) -> Option<TableHandle> {
        self.get_or_create_next_level(key, self.root())
    }

    /// Looks up `key` in `table`.
    pub fn get(&self, key: i32, table: TableHandle) -> Option<u64> {
        self.find(key, table)
            .map(|found| self.arena.slots[found.slot].value())
    }

    #[inline]
    pub fn contains_key(&self, key: i32, table: TableHandle) -> bool {
        self.find(key, table).is_some()
    }

    /// Inserts or overwrites `key` in `table`.
    ///
    /// Overwriting keeps the entry's nested table, if any.
    pub fn put(&mut self, key: i32, value: u64, table: TableHandle) -> Result<()> {
        if value > Self::MAX_VALUE {
            return Err(Error::ValueOutOfRange {
                value,
                bits: Self::VALUE_BITS,
            });
        }

        let mut node_idx = table.slot();
        for level in 0..=MAX_LEVEL {
            let node = self.arena.slots[node_idx];
            let bit = 1u32 << label(key, level);
            let pos = (node.bits() & (bit - 1)).count_ones() as usize;

            if node.bits() & bit == 0 {
                self.insert_into_run(node_idx, pos, bit, Slot::terminal(key, value, 0))?;
                self.len += 1;
                return Ok(());
            }

            let idx = node.run() as usize + pos;
            let slot = self.arena.slots[idx];
            if !slot.is_terminal() {
                node_idx = idx;
                continue;
            }

            if slot.key() == key {
                self.arena.slots[idx] = slot.with_value(value);
                return Ok(());
            }
            if level == MAX_LEVEL {
                break;
            }

            // Two distinct keys share every label up to here: push the resident
            // terminal one level down and keep descending.
            let run = self.arena.alloc(1)?;
            self.arena.slots[run as usize] = slot;
            self.arena.slots[idx] = Slot::bitmap(1u32 << label(slot.key(), level + 1), run);
            node_idx = idx;
        }
        // Distinct keys always part within the key width; only a damaged arena gets here.
        Err(Error::InvalidFormat(format!("key {key} descends below level {MAX_LEVEL}")))
    }

    /// Deletes `key` from `table`. Returns whether an entry was removed.
    ///
    /// A nested table owned by the removed entry becomes unreachable; its slots are
    /// only reclaimed when the owning structure is rebuilt.
    pub fn remove(&mut self, key: i32, table: TableHandle) -> bool {
        let Some(found) = self.find(key, table) else {
            return false;
        };

        let node = self.arena.slots[found.parent];
        let run = node.run() as usize;
        let run_len = node.run_len();
        let bit = 1u32 << label(key, found.level);

        if run_len == 1 {
            self.arena.release(run as u32, 1);
            self.arena.slots[found.parent] = Slot::EMPTY_TABLE;
        } else {
            // Close the gap in place and hand the freed tail slot back.
            self.arena
                .slots
                .copy_within(found.slot + 1..run + run_len, found.slot);
            self.arena.release((run + run_len - 1) as u32, 1);
            self.arena.slots[found.parent] = Slot::bitmap(node.bits() & !bit, run as u32);
        }
        self.len -= 1;
        true
    }

    /// Returns the nested table owned by `key` in `table`, creating it on first use.
    ///
    /// Returns `None` when `key` has no entry in `table` (or, exceptionally, when the
    /// arena cannot grow).
    pub fn get_or_create_next_level(
        &mut self,
        key: i32,
        table: TableHandle,
    ) -> Option<TableHandle> {
        let found = self.find(key, table)?;
        let slot = self.arena.slots[found.slot];
        if slot.next_level() != 0 {
            return Some(TableHandle(slot.next_level()));
        }
        let handle = self.arena.alloc(1).ok()?;
        self.arena.slots[handle as usize] = Slot::EMPTY_TABLE;
        self.arena.slots[found.slot] = slot.with_next_level(handle);
        Some(TableHandle(handle))
    }

    /// Returns the nested table owned by `key` in `table` without creating one.
    pub fn next_level(&self, key: i32, table: TableHandle) -> Option<TableHandle> {
        let found = self.find(key, table)?;
        match self.arena.slots[found.slot].next_level() {
            0 => None,
            next => Some(TableHandle(next)),
        }
    }

    /// Iterates the live entries of one table (not of its nested tables).
    pub fn entries(&self, table: TableHandle) -> Entries<'_> {
        let mut stack = SmallVec::new();
        stack.push((table.0, 0u32));
        Entries { map: self, stack }
    }

    fn find(&self, key: i32, table: TableHandle) -> Option<Found> {
        let mut node_idx = table.slot();
        for level in 0..=MAX_LEVEL {
            let node = self.arena.slots[node_idx];
            let bit = 1u32 << label(key, level);
            if node.bits() & bit == 0 {
                return None;
            }
            let pos = (node.bits() & (bit - 1)).count_ones() as usize;
            let idx = node.run() as usize + pos;
            let slot = *self.arena.slots.get(idx)?;
            if slot.is_terminal() {
                return (slot.key() == key).then_some(Found {
                    parent: node_idx,
                    slot: idx,
                    level,
                });
            }
            node_idx = idx;
        }
        None
    }

    fn insert_into_run(&mut self, node_idx: usize, pos: usize, bit: u32, slot: Slot) -> Result<()> {
        let node = self.arena.slots[node_idx];
        let old_len = node.run_len();
        let old_run = node.run() as usize;
        let new_run = self.arena.alloc(old_len + 1)? as usize;

        let slots = &mut self.arena.slots;
        slots.copy_within(old_run..old_run + pos, new_run);
        slots[new_run + pos] = slot;
        slots.copy_within(old_run + pos..old_run + old_len, new_run + pos + 1);
        if old_len > 0 {
            self.arena.release(old_run as u32, old_len);
        }
        self.arena.slots[node_idx] = Slot::bitmap(node.bits() | bit, new_run as u32);
        Ok(())
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Writes the slot arena. Free lists are not persisted.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u32::<LittleEndian>(self.arena.slots.len() as u32)?;
        w.write_u64::<LittleEndian>(self.len as u64)?;
        for slot in &self.arena.slots {
            w.write_u64::<LittleEndian>(slot.head)?;
            w.write_u64::<LittleEndian>(slot.tail)?;
        }
        Ok(())
    }

    /// Reads a slot arena written by [`TrieMap::write_to`], validating that every
    /// run and next-level reference stays inside the arena and that the tables
    /// reachable from the root form trees.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let count = r.read_u32::<LittleEndian>()? as usize;
        let len = r.read_u64::<LittleEndian>()? as usize;
        if count == 0 || count > MAX_SLOTS {
            return Err(Error::InvalidFormat(format!("bad trie slot count {count}")));
        }

        // The count is untrusted until every slot has actually been read.
        let mut slots = Vec::with_capacity(count.min(1 << 16));
        for _ in 0..count {
            let head = r.read_u64::<LittleEndian>()?;
            let tail = r.read_u64::<LittleEndian>()?;
            slots.push(Slot { head, tail });
        }

        if slots[ROOT_SLOT as usize].is_terminal() {
            return Err(Error::InvalidFormat("root slot is not a table".into()));
        }
        for (idx, slot) in slots.iter().enumerate() {
            if slot.is_terminal() {
                if slot.value() > Self::MAX_VALUE {
                    return Err(Error::InvalidFormat(format!("slot {idx}: value too wide")));
                }
                let next = slot.next_level() as usize;
                if next != 0 && (next >= count || slots[next].is_terminal()) {
                    return Err(Error::InvalidFormat(format!(
                        "slot {idx}: bad next-level reference {next}"
                    )));
                }
            } else if slot.tail > u64::from(u32::MAX)
                || (slot.run_len() > 0 && slot.run() as usize + slot.run_len() > count)
            {
                return Err(Error::InvalidFormat(format!("slot {idx}: run out of bounds")));
            }
        }

        check_reachable(&slots)?;

        Ok(Self {
            arena: SlotArena::from_slots(slots),
            len,
        })
    }
}

/// Walks every table reachable from the root, rejecting runs reached twice (shared
/// or cyclic), nodes below the deepest level and terminals filed under labels that
/// do not match their key. Runs and next-level references must already be in bounds.
fn check_reachable(slots: &[Slot]) -> Result<()> {
    let mut seen = vec![false; slots.len()];
    seen[ROOT_SLOT as usize] = true;
    // (bitmap slot, level, key bits consumed on the way down)
    let mut stack: Vec<(usize, u32, u64)> = vec![(ROOT_SLOT as usize, 0, 0)];

    while let Some((node_idx, level, prefix)) = stack.pop() {
        let node = slots[node_idx];
        if node.run_len() == 0 {
            continue;
        }
        if level > MAX_LEVEL {
            return Err(Error::InvalidFormat(format!(
                "slot {node_idx}: node below level {MAX_LEVEL}"
            )));
        }
        let run = node.run() as usize;
        let mut bits = node.bits();
        for idx in run..run + node.run_len() {
            let path = prefix | (u64::from(bits.trailing_zeros()) << (level * LABEL_BITS));
            bits &= bits - 1;
            if std::mem::replace(&mut seen[idx], true) {
                return Err(Error::InvalidFormat(format!("slot {idx}: reached twice")));
            }
            let slot = slots[idx];
            if !slot.is_terminal() {
                stack.push((idx, level + 1, path));
                continue;
            }
            let mask = (1u64 << ((level + 1) * LABEL_BITS)) - 1;
            if u64::from(slot.key() as u32) & mask != path {
                return Err(Error::InvalidFormat(format!(
                    "slot {idx}: key filed under the wrong labels"
                )));
            }
            let next = slot.next_level() as usize;
            if next != 0 {
                if std::mem::replace(&mut seen[next], true) {
                    return Err(Error::InvalidFormat(format!("slot {next}: reached twice")));
                }
                stack.push((next, 0, 0));
            }
        }
    }
    Ok(())
}

impl Default for TrieMap {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TrieMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrieMap")
            .field("len", &self.len)
            .field("slots", &self.arena.slots.len())
            .finish()
    }
}

/// Iterator over one table's entries, in slot order.
pub struct Entries<'a> {
    map: &'a TrieMap,
    /// Pending slots with the level of the node that owns them.
    stack: SmallVec<[(u32, u32); 32]>,
}

impl Iterator for Entries<'_> {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        while let Some((idx, level)) = self.stack.pop() {
            let Some(&slot) = self.map.arena.slots.get(idx as usize) else {
                continue;
            };
            if slot.is_terminal() {
                let next = slot.next_level();
                return Some(Entry {
                    key: slot.key(),
                    value: slot.value(),
                    next_level: (next != 0).then_some(TableHandle(next)),
                });
            }
            // Bounded depth keeps a damaged arena from looping.
            if level > MAX_LEVEL {
                continue;
            }
            let run = slot.run();
            for i in (0..slot.run_len() as u32).rev() {
                self.stack.push((run + i, level + 1));
            }
        }
        None
    }
}


#[cfg(test)]
mod proptests;
