//! LSMKV - Compaction Strategy & K-Way Merge
//! Merges sorted runs of entries (memtable snapshots, SSTables) into one
//! sorted run and decides when the engine should merge tables.
//!
//! ## Merge order
//! Sources are passed oldest first. When several sources hold the same
//! key, only the entry from the newest source survives. Tombstones are
//! passed through; callers decide whether they may be dropped.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::engine::manager::KeyRange;
use crate::types::Entry;

/// Trait defining when and what to merge.
pub trait CompactionStrategy {
    /// Pick two generations to merge, if any.
    fn select_merge(&self, ranges: &[KeyRange]) -> Option<(i64, i64)>;

    /// Returns the human-readable name of this strategy.
    fn name(&self) -> &str;
}

/// Merge the two newest tables once more than `trigger` tables exist.
///
/// The two newest tables are always adjacent and nothing outranks their
/// merged output, so the result keeps newest-wins ordering.
pub struct NewestPairMerge {
    trigger: usize,
}

impl NewestPairMerge {
    /// `trigger == 0` disables merging.
    pub fn new(trigger: usize) -> Self {
        Self { trigger }
    }
}

impl CompactionStrategy for NewestPairMerge {
    fn select_merge(&self, ranges: &[KeyRange]) -> Option<(i64, i64)> {
        if self.trigger == 0 || ranges.len() <= self.trigger {
            return None;
        }
        let mut generations: Vec<i64> = ranges.iter().map(|r| r.generation).collect();
        generations.sort_unstable();
        let newest = generations.pop()?;
        let previous = generations.pop()?;
        Some((previous, newest))
    }

    fn name(&self) -> &str {
        "NewestPairMerge"
    }
}

/// Heap slot: the current head of one source.
struct HeapItem {
    entry: Entry,
    source: usize,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    // BinaryHeap is a max-heap: smallest key first, newest source first on ties.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .entry
            .key
            .cmp(&self.entry.key)
            .then(self.source.cmp(&other.source))
    }
}

/// K-way merge over sorted entry sources, newest source wins on equal keys.
pub struct MergeIter<I: Iterator<Item = Entry>> {
    sources: Vec<I>,
    heap: BinaryHeap<HeapItem>,
}

impl<I: Iterator<Item = Entry>> MergeIter<I> {
    /// `sources` must each be ascending by key, ordered oldest to newest.
    pub fn new(sources: Vec<I>) -> Self {
        let mut sources = sources;
        let mut heap = BinaryHeap::with_capacity(sources.len());
        for (source, iter) in sources.iter_mut().enumerate() {
            if let Some(entry) = iter.next() {
                heap.push(HeapItem { entry, source });
            }
        }
        Self { sources, heap }
    }

    fn refill(&mut self, source: usize) {
        if let Some(entry) = self.sources[source].next() {
            self.heap.push(HeapItem { entry, source });
        }
    }
}

impl<I: Iterator<Item = Entry>> Iterator for MergeIter<I> {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        let winner = self.heap.pop()?;
        self.refill(winner.source);

        // Older versions of the same key sit right below on the heap.
        while let Some(top) = self.heap.peek() {
            if top.entry.key != winner.entry.key {
                break;
            }
            if let Some(shadowed) = self.heap.pop() {
                self.refill(shadowed.source);
            }
        }
        Some(winner.entry)
    }
}

/// Merge `sources` (oldest first) into one sorted run, newest version per key.
pub fn merge_sorted(sources: Vec<Vec<Entry>>) -> Vec<Entry> {
    MergeIter::new(sources.into_iter().map(Vec::into_iter).collect()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(k: &str, v: &str) -> Entry {
        Entry::put(k.as_bytes().to_vec(), v.as_bytes().to_vec())
    }

    fn range(generation: i64) -> KeyRange {
        KeyRange {
            generation,
            first_key: b"a".to_vec(),
            last_key: b"z".to_vec(),
        }
    }

    #[test]
    fn test_merge_newer_wins() {
        let older = vec![put("1", "old"), put("2", "old"), put("3", "old")];
        let newer = vec![put("2", "new"), put("4", "new")];

        let merged = merge_sorted(vec![older, newer]);
        assert_eq!(
            merged,
            vec![put("1", "old"), put("2", "new"), put("3", "old"), put("4", "new")]
        );
    }

    #[test]
    fn test_merge_keeps_tombstones_from_newest() {
        let older = vec![put("a", "1"), put("b", "2")];
        let newer = vec![Entry::delete(b"a".to_vec())];
        let merged = merge_sorted(vec![older, newer]);
        assert_eq!(merged, vec![Entry::delete(b"a".to_vec()), put("b", "2")]);
    }

    #[test]
    fn test_merge_three_way() {
        let s0 = vec![put("a", "0"), put("d", "0"), put("g", "0")];
        let s1 = vec![put("b", "1"), put("d", "1")];
        let s2 = vec![put("d", "2"), put("z", "2")];
        let merged = merge_sorted(vec![s0, s1, s2]);
        let keys: Vec<Vec<u8>> = merged.iter().map(|e| e.key.clone()).collect();
        let expected: Vec<Vec<u8>> = ["a", "b", "d", "g", "z"]
            .iter()
            .map(|k| k.as_bytes().to_vec())
            .collect();
        assert_eq!(keys, expected);
        assert_eq!(merged[2], put("d", "2"));
    }

    #[test]
    fn test_merge_empty_sources() {
        assert!(merge_sorted(vec![Vec::new(), Vec::new()]).is_empty());
        assert_eq!(merge_sorted(vec![Vec::new(), vec![put("a", "1")]]).len(), 1);
    }

    #[test]
    fn test_select_merge_below_trigger() {
        let strategy = NewestPairMerge::new(4);
        let ranges: Vec<KeyRange> = (1..=4).map(range).collect();
        assert_eq!(strategy.select_merge(&ranges), None);
    }

    #[test]
    fn test_select_merge_picks_newest_pair() {
        let strategy = NewestPairMerge::new(2);
        let ranges = vec![range(1), range(5), range(3)];
        assert_eq!(strategy.select_merge(&ranges), Some((3, 5)));
        assert_eq!(strategy.name(), "NewestPairMerge");
    }

    #[test]
    fn test_select_merge_disabled() {
        let strategy = NewestPairMerge::new(0);
        let ranges: Vec<KeyRange> = (1..=20).map(range).collect();
        assert_eq!(strategy.select_merge(&ranges), None);
    }
}
