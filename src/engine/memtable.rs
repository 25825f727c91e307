//! LSMKV - MemTable (In-Memory Sorted Map)
//! The MemTable is the write-buffer of the LSM-Tree.
//! All writes go here first before being flushed to SSTables on disk.

use crate::engine::rbtree::RbTree;
use crate::engine::wal::Wal;
use crate::error::{LsmError, Result};
use crate::types::{Entry, Key, Value};

/// What the caller has to do after a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemtableStatus {
    /// The write is buffered; nothing else to do.
    Buffered,
    /// The buffer is over its byte threshold and must be flushed.
    FlushThreshold,
}

/// In-memory sorted key-value store backed by a red-black tree.
/// Serves as the write buffer in the LSM-Tree architecture.
pub struct MemTable {
    /// Sorted map storing key-value pairs.
    /// A `None` value represents a tombstone (deletion marker).
    tree: RbTree<Option<Value>>,
    /// Size in bytes above which writes report `FlushThreshold`.
    flush_threshold: usize,
}

impl MemTable {
    /// Create a new, empty MemTable.
    pub fn new(flush_threshold: usize) -> Self {
        Self {
            tree: RbTree::new(),
            flush_threshold,
        }
    }

    /// Rebuild a MemTable by replaying every live entry of `wal`.
    ///
    /// Replay ignores the flush threshold: an oversized buffer is flushed
    /// by the engine right after opening.
    pub fn recover(wal: &Wal, flush_threshold: usize) -> Result<Self> {
        let mut table = Self::new(flush_threshold);
        wal.scan(|_, entry| {
            table.apply(entry);
            true
        })?;
        Ok(table)
    }

    /// Returns the size of the MemTable in bytes (keys plus values).
    pub fn size(&self) -> usize {
        self.tree.size_bytes()
    }

    /// Returns the number of entries in the MemTable, tombstones included.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Returns true if the MemTable is empty.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn flush_threshold(&self) -> usize {
        self.flush_threshold
    }

    /// True once the buffered bytes exceed the threshold.
    pub fn needs_flush(&self) -> bool {
        self.tree.size_bytes() > self.flush_threshold
    }

    /// Insert a key-value pair; `None` records a tombstone.
    /// If the key already exists, the old value is replaced.
    pub fn put(&mut self, key: Key, value: Option<Value>) -> MemtableStatus {
        self.tree.put(key, value);
        if self.needs_flush() {
            MemtableStatus::FlushThreshold
        } else {
            MemtableStatus::Buffered
        }
    }

    /// Apply a replayed WAL entry.
    pub fn apply(&mut self, entry: Entry) -> MemtableStatus {
        self.put(entry.key, entry.value)
    }

    /// Delete a key by inserting a tombstone marker.
    pub fn delete(&mut self, key: Key) -> MemtableStatus {
        self.put(key, None)
    }

    /// Get a value by key.
    ///
    /// Fails with `KeyNotFound` when the key was never buffered and with
    /// `FoundTombstone` when its latest version is a deletion.
    pub fn get(&self, key: &[u8]) -> Result<Value> {
        match self.tree.get(key) {
            Some(Some(value)) => Ok(value.clone()),
            Some(None) => Err(LsmError::FoundTombstone),
            None => Err(LsmError::KeyNotFound),
        }
    }

    /// Check if a key exists in the MemTable (including tombstones).
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.tree.contains_key(key)
    }

    /// Visit entries in key order until `f` returns false.
    pub fn scan<F>(&self, mut f: F)
    where
        F: FnMut(&[u8], Option<&[u8]>) -> bool,
    {
        self.tree.scan(|key, value| f(key, value.as_deref()));
    }

    /// All entries in ascending key order, tombstones included.
    pub fn entries(&self) -> Vec<Entry> {
        self.tree
            .iter()
            .map(|(key, value)| Entry {
                key: key.to_vec(),
                value: value.clone(),
            })
            .collect()
    }

    /// Clear all entries from the MemTable and reset size.
    pub fn reset(&mut self) {
        self.tree.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut table = MemTable::new(1024);
        table.put(b"key1".to_vec(), Some(b"value1".to_vec()));
        assert_eq!(table.get(b"key1").unwrap(), b"value1".to_vec());
    }

    #[test]
    fn test_get_nonexistent() {
        let table = MemTable::new(1024);
        assert!(matches!(table.get(b"missing"), Err(LsmError::KeyNotFound)));
    }

    #[test]
    fn test_overwrite() {
        let mut table = MemTable::new(1024);
        table.put(b"key".to_vec(), Some(b"old".to_vec()));
        table.put(b"key".to_vec(), Some(b"new".to_vec()));
        assert_eq!(table.get(b"key").unwrap(), b"new".to_vec());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_delete_tombstone() {
        let mut table = MemTable::new(1024);
        table.put(b"key".to_vec(), Some(b"value".to_vec()));
        table.delete(b"key".to_vec());
        assert!(matches!(table.get(b"key"), Err(LsmError::FoundTombstone)));
        assert!(table.contains_key(b"key")); // tombstone still exists
    }

    #[test]
    fn test_size_tracking() {
        let mut table = MemTable::new(1024);
        assert_eq!(table.size(), 0);
        table.put(b"abc".to_vec(), Some(b"12345".to_vec())); // 3 + 5 = 8
        assert_eq!(table.size(), 8);
        table.delete(b"abc".to_vec()); // key only
        assert_eq!(table.size(), 3);
    }

    #[test]
    fn test_flush_threshold_signal() {
        let mut table = MemTable::new(10);
        assert_eq!(
            table.put(b"k1".to_vec(), Some(b"12345678".to_vec())),
            MemtableStatus::Buffered
        );
        assert_eq!(
            table.put(b"k2".to_vec(), Some(b"x".to_vec())),
            MemtableStatus::FlushThreshold
        );
        assert!(table.needs_flush());
    }

    #[test]
    fn test_entries_sorted_with_tombstones() {
        let mut table = MemTable::new(1024);
        table.put(b"c".to_vec(), Some(b"3".to_vec()));
        table.put(b"a".to_vec(), Some(b"1".to_vec()));
        table.delete(b"b".to_vec());
        let entries = table.entries();
        assert_eq!(
            entries,
            vec![
                Entry::put(b"a".to_vec(), b"1".to_vec()),
                Entry::delete(b"b".to_vec()),
                Entry::put(b"c".to_vec(), b"3".to_vec()),
            ]
        );
    }

    #[test]
    fn test_recover_from_wal() {
        let dir = tempfile::tempdir().unwrap();
        let mut wal = Wal::open(dir.path(), 1 << 20, false).unwrap();
        wal.write(&Entry::put(b"a".to_vec(), b"1".to_vec())).unwrap();
        wal.write(&Entry::put(b"b".to_vec(), b"2".to_vec())).unwrap();
        wal.write(&Entry::put(b"a".to_vec(), b"3".to_vec())).unwrap();
        wal.write(&Entry::delete(b"b".to_vec())).unwrap();

        let table = MemTable::recover(&wal, 1024).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(b"a").unwrap(), b"3".to_vec());
        assert!(matches!(table.get(b"b"), Err(LsmError::FoundTombstone)));
    }

    #[test]
    fn test_reset() {
        let mut table = MemTable::new(1024);
        table.put(b"k1".to_vec(), Some(b"v1".to_vec()));
        table.put(b"k2".to_vec(), Some(b"v2".to_vec()));
        table.reset();
        assert!(table.is_empty());
        assert_eq!(table.size(), 0);
    }
}
