//! Slots: contiguous entry storage with parallel occupation and refcount
//! tables and a forward-only free-slot cursor.
//!
//! Slot indices are stable for the lifetime of an occupied slot. Storage may
//! be reallocated by growth or compaction, so references into it are only
//! valid while the owning lock is held.

use crate::refcount::SlotCount;

const FREE: u8 = 0;
const LIVE: u8 = 1;

/// A stored key, its payload (`()` for set-like pools) and the key's hash.
#[derive(Debug)]
pub struct Entry<K, V> {
    key: K,
    value: V,
    hash: u64,
}

impl<K, V> Entry<K, V> {
    pub(crate) fn new(key: K, value: V, hash: u64) -> Self {
        Self { key, value, hash }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    /// Payloads are mutable in place; keys never are, as they back the index.
    pub fn value_mut(&mut self) -> &mut V {
        &mut self.value
    }

    pub(crate) fn hash(&self) -> u64 {
        self.hash
    }
}

pub(crate) struct Slots<K, V> {
    entries: Vec<Entry<K, V>>,
    occupied: Vec<u8>,
    counts: Vec<SlotCount>,
    // Lowest slot known to be free.
    free_hint: Option<usize>,
}

impl<K, V> Slots<K, V> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            occupied: Vec::with_capacity(capacity),
            counts: Vec::with_capacity(capacity),
            free_hint: None,
        }
    }

    /// Number of slots, free ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    pub fn free_hint(&self) -> Option<usize> {
        self.free_hint
    }

    #[inline]
    pub fn is_occupied(&self, slot: usize) -> bool {
        self.occupied.get(slot).map_or(false, |&o| o == LIVE)
    }

    /// Entry stored at `slot`, live or not. Panics when out of range.
    #[inline]
    pub fn entry(&self, slot: usize) -> &Entry<K, V> {
        &self.entries[slot]
    }

    #[inline]
    pub fn entry_mut(&mut self, slot: usize) -> &mut Entry<K, V> {
        &mut self.entries[slot]
    }

    /// Stores `entry` in the lowest free slot, or appends a new slot.
    ///
    /// The slot comes back occupied with a zero count. A reused slot hands
    /// back the entry it held so the caller can drop it outside its locks.
    pub fn place(&mut self, entry: Entry<K, V>) -> (usize, Option<Entry<K, V>>) {
        match self.free_hint {
            Some(slot) => {
                debug_assert_eq!(self.occupied[slot], FREE);
                let displaced = core::mem::replace(&mut self.entries[slot], entry);
                self.occupied[slot] = LIVE;
                self.counts[slot].reset();
                self.advance_hint(slot + 1);
                log::trace!("reused slot {slot}, next free hint {:?}", self.free_hint);
                (slot, Some(displaced))
            }
            None => {
                let slot = self.entries.len();
                self.entries.push(entry);
                self.occupied.push(LIVE);
                self.counts.push(SlotCount::new(0));
                log::trace!("appended slot {slot}");
                (slot, None)
            }
        }
    }

    // Scan forward from `from`; slots behind the cursor are never revisited.
    fn advance_hint(&mut self, from: usize) {
        self.free_hint = self.occupied[from..]
            .iter()
            .position(|&o| o == FREE)
            .map(|offset| from + offset);
    }

    /// Attach one reference to an occupied slot. Returns false if the slot is
    /// free or out of range.
    #[inline]
    pub fn add_ref(&self, slot: usize) -> bool {
        if !self.is_occupied(slot) {
            return false;
        }
        self.counts[slot].get();
        true
    }

    /// Detach one reference. Returns true if this was the last one.
    #[inline]
    pub fn put_ref(&self, slot: usize) -> bool {
        self.counts[slot].put()
    }

    #[inline]
    pub fn count(&self, slot: usize) -> u64 {
        if self.is_occupied(slot) {
            self.counts[slot].load()
        } else {
            0
        }
    }

    /// Frees `slot` if it is still occupied and unreferenced. Returns the
    /// key hash so the caller can unlink the index record.
    pub fn reclaim(&mut self, slot: usize) -> Option<u64> {
        if !self.is_occupied(slot) || self.counts[slot].load() != 0 {
            return None;
        }
        self.occupied[slot] = FREE;
        if self.free_hint.map_or(true, |hint| slot < hint) {
            self.free_hint = Some(slot);
        }
        log::trace!("reclaimed slot {slot}");
        Some(self.entries[slot].hash())
    }

    pub fn highest_occupied(&self) -> Option<usize> {
        self.occupied.iter().rposition(|&o| o == LIVE)
    }

    /// Keeps the first `len` slots and shrinks every table to `capacity`.
    /// Returns the entries cut off so they can be dropped outside the locks.
    pub fn truncate_and_shrink(&mut self, len: usize, capacity: usize) -> Vec<Entry<K, V>> {
        debug_assert!(self.highest_occupied().map_or(true, |h| h < len));
        let cut = if len < self.entries.len() {
            self.entries.drain(len..).collect()
        } else {
            Vec::new()
        };
        self.occupied.truncate(len);
        self.counts.truncate(len);
        self.entries.shrink_to(capacity);
        self.occupied.shrink_to(capacity);
        self.counts.shrink_to(capacity);
        if self.free_hint.map_or(false, |hint| hint >= len) {
            self.free_hint = None;
        }
        cut
    }

    pub fn occupied_count(&self) -> usize {
        self.occupied.iter().filter(|&&o| o == LIVE).count()
    }
}
