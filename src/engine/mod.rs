//! LSMKV - Storage Engine Module
//! Top-level module for the LSM-Tree storage engine components.
//!
//! ## Write path
//! `put`/`delete` append to the WAL, then update the memtable. Once the
//! memtable outgrows its threshold it is flushed into a new SSTable and
//! the WAL is truncated past everything that was flushed.
//!
//! ## Read path
//! Memtable first, then SSTables newest to oldest. A tombstone found on
//! the way ends the search as `KeyNotFound`.
//!
//! ## Locking
//! WAL, memtable and SSTable manager each sit behind their own
//! `RwLock`, always taken in that order.

pub mod codec;
pub mod compaction;
pub mod manager;
pub mod memtable;
pub mod metrics;
pub mod rbtree;
pub mod sstable;
pub mod wal;

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::config::Config;
use crate::error::{LsmError, Result};
use crate::types::{Entry, Key, Value};

use self::compaction::{CompactionStrategy, MergeIter, NewestPairMerge};
use self::manager::SstManager;
use self::memtable::{MemTable, MemtableStatus};
use self::metrics::EngineMetrics;
use self::wal::Wal;

/// Merge policy shared across threads.
pub type Strategy = Box<dyn CompactionStrategy + Send + Sync>;

/// The LSM-tree key-value store.
///
/// All operations take `&self`; wrap it in an `Arc` to share it between
/// threads.
pub struct LsmTree {
    config: Config,
    wal: RwLock<Wal>,
    memtable: RwLock<MemTable>,
    sstables: RwLock<SstManager>,
    strategy: Strategy,
    metrics: EngineMetrics,
    closed: AtomicBool,
}

impl LsmTree {
    /// Open or create a store under `config.data_dir`, merging with
    /// [`NewestPairMerge`] at `config.merge_trigger`.
    pub fn open(config: Config) -> Result<Self> {
        let strategy = Box::new(NewestPairMerge::new(config.merge_trigger));
        Self::open_with_strategy(config, strategy)
    }

    /// Open with a custom merge policy.
    pub fn open_with_strategy(config: Config, strategy: Strategy) -> Result<Self> {
        config.validate()?;
        config.ensure_dirs()?;

        let wal = Wal::open(config.log_dir(), config.max_segment_size, config.sync_writes)?;
        let memtable = MemTable::recover(&wal, config.flush_threshold)?;
        let sstables = SstManager::open(config.sstable_dir(), config.sparse_index)?;

        let metrics = EngineMetrics::new();
        metrics.record_recovery(wal.len());
        log::info!(
            "lsmkv opened at {:?} ({} WAL entries replayed, {} SSTable(s), merge strategy {})",
            config.data_dir,
            wal.len(),
            sstables.len(),
            strategy.name()
        );

        let tree = Self {
            config,
            wal: RwLock::new(wal),
            memtable: RwLock::new(memtable),
            sstables: RwLock::new(sstables),
            strategy,
            metrics,
            closed: AtomicBool::new(false),
        };

        // Replay ignores the threshold; catch up before serving writes.
        {
            let mut wal = tree.wal.write();
            let mut memtable = tree.memtable.write();
            if memtable.needs_flush() {
                let mut sstables = tree.sstables.write();
                tree.flush_locked(&mut wal, &mut memtable, &mut sstables)?;
                tree.merge_if_needed(&mut sstables)?;
            }
        }
        Ok(tree)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(LsmError::FileClosed);
        }
        Ok(())
    }

    fn check_key(key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(LsmError::BadEntry("key must not be empty".into()));
        }
        Ok(())
    }

    /// Insert or overwrite `key`.
    ///
    /// `FlushFailed` means the value was logged and is readable, but the
    /// flush it triggered did not complete. Any other error means nothing
    /// was written.
    pub fn put(&self, key: Key, value: Value) -> Result<()> {
        self.ensure_open()?;
        Self::check_key(&key)?;
        let (key_size, value_size) = (key.len(), value.len());
        let result = self.write(Entry::put(key, value));
        if matches!(result, Ok(()) | Err(LsmError::FlushFailed(_))) {
            self.metrics.record_put(key_size, value_size);
        }
        result
    }

    /// Delete `key` by writing a tombstone. Deleting a missing key is not an error.
    ///
    /// Reports `FlushFailed` the same way as [`put`](Self::put).
    pub fn delete(&self, key: Key) -> Result<()> {
        self.ensure_open()?;
        Self::check_key(&key)?;
        let result = self.write(Entry::delete(key));
        if matches!(result, Ok(()) | Err(LsmError::FlushFailed(_))) {
            self.metrics.record_delete();
        }
        result
    }

    fn write(&self, entry: Entry) -> Result<()> {
        let mut wal = self.wal.write();
        wal.write(&entry)?;

        let mut memtable = self.memtable.write();
        if memtable.apply(entry) == MemtableStatus::FlushThreshold {
            let mut sstables = self.sstables.write();
            self.flush_locked(&mut wal, &mut memtable, &mut sstables)
                .and_then(|_| self.merge_if_needed(&mut sstables))
                .map_err(|e| LsmError::FlushFailed(Box::new(e)))?;
        }
        Ok(())
    }

    /// Latest value of `key`. Missing and deleted keys fail with `KeyNotFound`.
    pub fn get(&self, key: &[u8]) -> Result<Value> {
        self.ensure_open()?;
        let result = self.lookup(key);
        self.metrics
            .record_get(result.as_ref().ok().map(|value| value.len()));
        result
    }

    fn lookup(&self, key: &[u8]) -> Result<Value> {
        // Held across the SSTable lookup so a concurrent flush cannot hide the key.
        let memtable = self.memtable.read();
        match memtable.get(key) {
            Ok(value) => return Ok(value),
            Err(LsmError::FoundTombstone) => return Err(LsmError::KeyNotFound),
            Err(LsmError::KeyNotFound) => {}
            Err(e) => return Err(e),
        }
        let entry = self.sstables.read().get(key)?;
        entry.value.ok_or(LsmError::KeyNotFound)
    }

    /// All live key-value pairs in key order.
    pub fn scan(&self) -> Result<Vec<(Key, Value)>> {
        self.ensure_open()?;
        let memtable = self.memtable.read();
        let mut sources = self.sstables.read().all_entries()?;
        sources.push(memtable.entries());
        drop(memtable);

        let pairs = MergeIter::new(sources.into_iter().map(Vec::into_iter).collect())
            .filter_map(|entry| entry.value.map(|value| (entry.key, value)))
            .collect();
        self.metrics.record_scan();
        Ok(pairs)
    }

    /// Flush the memtable now. Returns the new SSTable generation, or
    /// `None` when the memtable was empty.
    pub fn flush(&self) -> Result<Option<i64>> {
        self.ensure_open()?;
        let mut wal = self.wal.write();
        let mut memtable = self.memtable.write();
        let mut sstables = self.sstables.write();
        let generation = self.flush_locked(&mut wal, &mut memtable, &mut sstables)?;
        self.merge_if_needed(&mut sstables)?;
        Ok(generation)
    }

    fn flush_locked(
        &self,
        wal: &mut Wal,
        memtable: &mut MemTable,
        sstables: &mut SstManager,
    ) -> Result<Option<i64>> {
        let Some(generation) = sstables.flush_memtable(memtable)? else {
            return Ok(None);
        };
        // Everything up to the last index now lives in the new table.
        wal.truncate_front(wal.last_index() + 1)?;
        self.metrics.record_flush();
        Ok(Some(generation))
    }

    fn merge_if_needed(&self, sstables: &mut SstManager) -> Result<()> {
        while let Some((a, b)) = self.strategy.select_merge(sstables.ranges()) {
            sstables.merge(a, b)?;
            self.metrics.record_merge();
        }
        Ok(())
    }

    /// Drop the removable tombstones of table `generation`.
    pub fn compact(&self, generation: i64) -> Result<usize> {
        self.ensure_open()?;
        let dropped = self.sstables.write().compact(generation)?;
        self.metrics.record_compaction();
        Ok(dropped)
    }

    /// Merge tables `a` and `b` into generation `max(a, b) + 1`.
    pub fn merge(&self, a: i64, b: i64) -> Result<Option<i64>> {
        self.ensure_open()?;
        let output = self.sstables.write().merge(a, b)?;
        self.metrics.record_merge();
        Ok(output)
    }

    /// Close the WAL, the memtable and the SSTables, in that order.
    ///
    /// Every component is closed even if an earlier one fails; the first
    /// error is returned. Unflushed writes stay in the WAL for the next open.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(LsmError::FileClosed);
        }
        let mut wal = self.wal.write();
        let mut memtable = self.memtable.write();
        let mut sstables = self.sstables.write();

        let wal_result = wal.close();
        memtable.reset();
        let sstables_result = sstables.close();
        log::info!("lsmkv closed at {:?}", self.config.data_dir);
        wal_result.and(sstables_result)
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Entries buffered in the memtable, tombstones included.
    pub fn memtable_len(&self) -> usize {
        self.memtable.read().len()
    }

    /// Bytes buffered in the memtable.
    pub fn memtable_size(&self) -> usize {
        self.memtable.read().size()
    }

    pub fn table_count(&self) -> usize {
        self.sstables.read().len()
    }

    /// Live SSTable generations, ascending.
    pub fn generations(&self) -> Vec<i64> {
        self.sstables.read().generations()
    }

    /// Entries currently held by the WAL.
    pub fn wal_len(&self) -> usize {
        self.wal.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small(dir: &std::path::Path) -> Config {
        Config::new(dir)
            .with_flush_threshold(256)
            .with_max_segment_size(512)
            .with_sync_writes(false)
            .with_merge_trigger(0)
    }

    #[test]
    fn test_put_get_delete_close() {
        let dir = tempfile::tempdir().unwrap();
        let tree = LsmTree::open(Config::new(dir.path())).unwrap();

        tree.put(b"key-01".to_vec(), b"value-01".to_vec()).unwrap();
        tree.put(b"key-02".to_vec(), b"value-02".to_vec()).unwrap();
        assert_eq!(tree.get(b"key-01").unwrap(), b"value-01".to_vec());
        assert_eq!(tree.get(b"key-02").unwrap(), b"value-02".to_vec());

        tree.delete(b"key-01".to_vec()).unwrap();
        assert!(matches!(tree.get(b"key-01"), Err(LsmError::KeyNotFound)));
        assert_eq!(tree.get(b"key-02").unwrap(), b"value-02".to_vec());

        tree.close().unwrap();
        assert!(matches!(tree.close(), Err(LsmError::FileClosed)));
        assert!(matches!(tree.get(b"key-02"), Err(LsmError::FileClosed)));
        assert!(matches!(
            tree.put(b"k".to_vec(), b"v".to_vec()),
            Err(LsmError::FileClosed)
        ));
    }

    #[test]
    fn test_empty_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let tree = LsmTree::open(small(dir.path())).unwrap();
        assert!(matches!(
            tree.put(Vec::new(), b"v".to_vec()),
            Err(LsmError::BadEntry(_))
        ));
        assert!(matches!(tree.delete(Vec::new()), Err(LsmError::BadEntry(_))));
        assert_eq!(tree.wal_len(), 0);
    }

    #[test]
    fn test_threshold_flush_truncates_wal() {
        let dir = tempfile::tempdir().unwrap();
        let tree = LsmTree::open(small(dir.path())).unwrap();
        for i in 0..40 {
            let key = format!("key-{:03}", i).into_bytes();
            tree.put(key, vec![b'x'; 16]).unwrap();
        }
        assert!(tree.table_count() >= 1);
        assert!(tree.memtable_size() <= 256);
        assert_eq!(tree.wal_len(), tree.memtable_len());
        for i in 0..40 {
            let key = format!("key-{:03}", i).into_bytes();
            assert_eq!(tree.get(&key).unwrap(), vec![b'x'; 16]);
        }
    }

    #[test]
    fn test_failed_flush_keeps_write_visible() {
        let dir = tempfile::tempdir().unwrap();
        let config = small(dir.path());
        let sstable_dir = config.sstable_dir();
        let tree = LsmTree::open(config).unwrap();

        // A plain file where the table directory should be makes every flush fail.
        std::fs::remove_dir_all(&sstable_dir).unwrap();
        std::fs::write(&sstable_dir, b"").unwrap();

        let mut failed = None;
        for i in 0..20 {
            let key = format!("key-{:03}", i).into_bytes();
            if let Err(e) = tree.put(key, vec![b'x'; 16]) {
                failed = Some((i, e));
                break;
            }
        }
        let (last, err) = failed.unwrap();
        assert!(matches!(err, LsmError::FlushFailed(_)));
        for i in 0..=last {
            let key = format!("key-{:03}", i).into_bytes();
            assert_eq!(tree.get(&key).unwrap(), vec![b'x'; 16]);
        }
        assert_eq!(tree.wal_len(), last + 1);
        assert_eq!(tree.table_count(), 0);
    }

    #[test]
    fn test_manual_flush() {
        let dir = tempfile::tempdir().unwrap();
        let tree = LsmTree::open(small(dir.path())).unwrap();
        assert_eq!(tree.flush().unwrap(), None);

        tree.put(b"a".to_vec(), b"1".to_vec()).unwrap();
        tree.delete(b"b".to_vec()).unwrap();
        assert_eq!(tree.flush().unwrap(), Some(1));
        assert_eq!(tree.memtable_len(), 0);
        assert_eq!(tree.wal_len(), 0);
        assert_eq!(tree.get(b"a").unwrap(), b"1".to_vec());
        assert!(matches!(tree.get(b"b"), Err(LsmError::KeyNotFound)));
    }

    #[test]
    fn test_tombstone_shadows_flushed_value() {
        let dir = tempfile::tempdir().unwrap();
        let tree = LsmTree::open(small(dir.path())).unwrap();
        tree.put(b"k".to_vec(), b"v".to_vec()).unwrap();
        tree.flush().unwrap();
        tree.delete(b"k".to_vec()).unwrap();
        assert!(matches!(tree.get(b"k"), Err(LsmError::KeyNotFound)));
        tree.flush().unwrap();
        assert!(matches!(tree.get(b"k"), Err(LsmError::KeyNotFound)));

        // Compacting the newer table must keep the tombstone.
        assert_eq!(tree.compact(2).unwrap(), 0);
        assert!(matches!(tree.get(b"k"), Err(LsmError::KeyNotFound)));
    }

    #[test]
    fn test_scan_merges_all_layers() {
        let dir = tempfile::tempdir().unwrap();
        let tree = LsmTree::open(small(dir.path())).unwrap();
        tree.put(b"a".to_vec(), b"1".to_vec()).unwrap();
        tree.put(b"b".to_vec(), b"1".to_vec()).unwrap();
        tree.flush().unwrap();
        tree.put(b"b".to_vec(), b"2".to_vec()).unwrap();
        tree.put(b"c".to_vec(), b"2".to_vec()).unwrap();
        tree.flush().unwrap();
        tree.delete(b"a".to_vec()).unwrap();
        tree.put(b"d".to_vec(), b"3".to_vec()).unwrap();

        let pairs = tree.scan().unwrap();
        assert_eq!(
            pairs,
            vec![
                (b"b".to_vec(), b"2".to_vec()),
                (b"c".to_vec(), b"2".to_vec()),
                (b"d".to_vec(), b"3".to_vec()),
            ]
        );
    }

    #[test]
    fn test_auto_merge_keeps_table_count_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let tree = LsmTree::open(small(dir.path()).with_merge_trigger(3)).unwrap();
        for round in 0..6 {
            tree.put(format!("k{round}").into_bytes(), b"v".to_vec())
                .unwrap();
            tree.put(b"shared".to_vec(), format!("{round}").into_bytes())
                .unwrap();
            tree.flush().unwrap();
        }
        assert!(tree.table_count() <= 3);
        assert!(tree.metrics().merges.load(Ordering::Relaxed) > 0);
        assert_eq!(tree.get(b"shared").unwrap(), b"5".to_vec());
        for round in 0..6 {
            assert_eq!(tree.get(format!("k{round}").as_bytes()).unwrap(), b"v".to_vec());
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path()).with_flush_threshold(0);
        assert!(matches!(LsmTree::open(config), Err(LsmError::Config(_))));
    }
}
