//! HashIndex: sorted `(hash, slot)` records with binary-search lookup.
//!
//! Records are kept ordered by full hash value, the slot index breaking ties.
//! Lookup finds the first record for a hash with a lower-bound search, then
//! walks forward over every record sharing that hash and lets the caller
//! decide which candidate slot actually holds the key. Collision cost is
//! linear in the bucket, independent of the index size.

use core::cmp::Ordering;

/// One entry of the index: a full hash and the slot holding the key.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct IndexRecord {
    pub hash: u64,
    pub slot: usize,
}

impl Ord for IndexRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.hash
            .cmp(&other.hash)
            .then_with(|| self.slot.cmp(&other.slot))
    }
}

impl PartialOrd for IndexRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
pub struct HashIndex {
    records: Vec<IndexRecord>,
}

impl HashIndex {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn shrink_to_fit(&mut self) {
        self.records.shrink_to_fit();
    }

    #[inline]
    fn lower_bound(&self, hash: u64) -> usize {
        self.records.partition_point(|r| r.hash < hash)
    }

    /// Records sharing `hash`, in slot order.
    #[inline]
    fn bucket(&self, hash: u64) -> impl Iterator<Item = &IndexRecord> + '_ {
        let start = self.lower_bound(hash);
        self.records[start..]
            .iter()
            .take_while(move |r| r.hash == hash)
    }

    /// Returns the first slot recorded under `hash` for which `is_match`
    /// holds. `is_match` is expected to compare the stored key.
    pub fn find<F>(&self, hash: u64, mut is_match: F) -> Option<usize>
    where
        F: FnMut(usize) -> bool,
    {
        self.bucket(hash).map(|r| r.slot).find(|&slot| is_match(slot))
    }

    pub fn insert(&mut self, hash: u64, slot: usize) {
        let record = IndexRecord { hash, slot };
        let at = self.records.partition_point(|r| *r < record);
        debug_assert!(
            self.records.get(at) != Some(&record),
            "slot {slot} indexed twice under the same hash"
        );
        self.records.insert(at, record);
    }

    /// Removes the record for `(hash, slot)`; returns whether it existed.
    pub fn remove(&mut self, hash: u64, slot: usize) -> bool {
        let start = self.lower_bound(hash);
        let found = self.records[start..]
            .iter()
            .take_while(|r| r.hash == hash)
            .position(|r| r.slot == slot);
        match found {
            Some(offset) => {
                self.records.remove(start + offset);
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> core::slice::Iter<'_, IndexRecord> {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots(index: &HashIndex, hash: u64) -> Vec<usize> {
        index.bucket(hash).map(|r| r.slot).collect()
    }

    /// Invariant: records stay sorted by hash regardless of insertion order.
    #[test]
    fn insert_keeps_records_sorted() {
        let mut index = HashIndex::default();
        for (hash, slot) in [(30, 0), (10, 1), (20, 2), (10, 3), (5, 4)] {
            index.insert(hash, slot);
        }
        let hashes: Vec<u64> = index.iter().map(|r| r.hash).collect();
        assert_eq!(hashes, vec![5, 10, 10, 20, 30]);
        assert_eq!(index.len(), 5);
    }

    /// Invariant: a bucket contains exactly the slots recorded under a hash,
    /// ordered by slot.
    #[test]
    fn bucket_scan_is_bounded_by_hash() {
        let mut index = HashIndex::default();
        index.insert(7, 9);
        index.insert(7, 2);
        index.insert(6, 1);
        index.insert(8, 3);
        assert_eq!(slots(&index, 7), vec![2, 9]);
        assert!(slots(&index, 100).is_empty());
        assert!(slots(&index, 0).is_empty());
    }

    /// Invariant: `find` consults the predicate for each colliding slot and
    /// never reports a slot only because its hash matched.
    #[test]
    fn find_resolves_collisions_with_predicate() {
        let mut index = HashIndex::default();
        index.insert(42, 0);
        index.insert(42, 1);
        index.insert(42, 2);

        let mut seen = Vec::new();
        let hit = index.find(42, |slot| {
            seen.push(slot);
            slot == 1
        });
        assert_eq!(hit, Some(1));
        assert_eq!(seen, vec![0, 1]);

        assert_eq!(index.find(42, |_| false), None);
        assert_eq!(index.find(41, |_| true), None);
    }

    /// Invariant: `remove` deletes only the exact `(hash, slot)` pair.
    #[test]
    fn remove_targets_exact_pair() {
        let mut index = HashIndex::default();
        index.insert(1, 0);
        index.insert(1, 4);
        index.insert(2, 4);

        assert!(!index.remove(1, 7));
        assert!(index.remove(1, 4));
        assert_eq!(slots(&index, 1), vec![0]);
        assert_eq!(slots(&index, 2), vec![4]);
        assert!(!index.remove(1, 4), "second removal finds nothing");
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn extreme_hash_values() {
        let mut index = HashIndex::default();
        index.insert(u64::MAX, 1);
        index.insert(0, 0);
        assert_eq!(index.find(u64::MAX, |_| true), Some(1));
        assert_eq!(index.find(0, |_| true), Some(0));
        assert!(index.remove(u64::MAX, 1));
        assert!(index.remove(0, 0));
        assert_eq!(index.len(), 0);
    }
}
