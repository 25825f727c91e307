//! LSMKV - SSTable Manager & Sparse Index
//! Owns every SSTable under `<base>/data`, tracks their key ranges and
//! performs flush, compaction and merge.
//!
//! ## Generations
//! Each table has a generation number; a higher generation holds newer
//! data. Lookups try tables whose `[first_key, last_key]` range covers
//! the key from newest to oldest and stop at the first hit, tombstones
//! included.
//!
//! ## Sparse index
//! Besides the coarse range per table, the manager samples every
//! `max(1, floor(log2 n))`-th index entry of a table into a red-black
//! tree. A point lookup then only decodes the records between the two
//! samples around the key.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::compaction::merge_sorted;
use crate::engine::memtable::MemTable;
use crate::engine::rbtree::{ByteSize, RbTree};
use crate::engine::sstable::{self, SSTable};
use crate::error::{LsmError, Result};
use crate::types::{Entry, Key};

/// Key span of one SSTable generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub generation: i64,
    pub first_key: Key,
    pub last_key: Key,
}

impl KeyRange {
    fn of(table: &SSTable) -> Self {
        Self {
            generation: table.generation(),
            first_key: table.first_key().to_vec(),
            last_key: table.last_key().to_vec(),
        }
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.first_key.as_slice() <= key && key <= self.last_key.as_slice()
    }
}

/// Sampled index slot: where a sampled key sits in its table's data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SparseSlot {
    pub generation: i64,
    pub offset: i64,
}

impl ByteSize for SparseSlot {
    fn byte_size(&self) -> usize {
        16
    }
}

/// Sampling distance for a table of `n` entries.
pub fn sample_step(n: usize) -> usize {
    if n < 2 {
        1
    } else {
        (n.ilog2() as usize).max(1)
    }
}

/// Sampled key index over one SSTable.
pub struct SparseIndex {
    tree: RbTree<SparseSlot>,
}

impl SparseIndex {
    /// Sample `table`'s index; the first entry is always included.
    pub fn build(table: &SSTable) -> Self {
        let step = sample_step(table.len());
        let mut tree = RbTree::new();
        for entry in table.index().iter().step_by(step) {
            tree.put(
                entry.key.clone(),
                SparseSlot {
                    generation: table.generation(),
                    offset: entry.offset,
                },
            );
        }
        Self { tree }
    }

    /// Number of sampled keys.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Data-file window that must hold `key` if the table has it:
    /// from the nearest sample at or below `key` up to (excluding) the
    /// nearest sample above it. `None` when `key` sorts before every sample.
    pub fn window(&self, key: &[u8]) -> Option<(i64, Option<i64>)> {
        let (_, lo) = self.tree.get_near_min(key)?;
        let hi = self
            .tree
            .get_near_max(key)
            .filter(|(sample, _)| *sample != key)
            .map(|(_, slot)| slot.offset);
        Some((lo.offset, hi))
    }
}

/// Tracks all SSTables and their key ranges.
pub struct SstManager {
    dir: PathBuf,
    tables: BTreeMap<i64, SSTable>,
    /// Coarse ranges, ascending by generation.
    ranges: Vec<KeyRange>,
    sparse: BTreeMap<i64, SparseIndex>,
    use_sparse: bool,
    next_generation: i64,
    closed: bool,
}

impl SstManager {
    /// Open every complete table (`*.idx` present) under `dir`.
    pub fn open(dir: impl AsRef<Path>, use_sparse: bool) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Self::recover_temp_files(&dir)?;

        let mut generations = Vec::new();
        let mut data_files = Vec::new();
        for dirent in fs::read_dir(&dir)? {
            let path = dirent?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(generation) = sstable::parse_index_file_name(name) {
                generations.push(generation);
            } else if name.ends_with(sstable::DATA_EXT) {
                data_files.push(path);
            }
        }
        generations.sort_unstable();

        let mut manager = Self {
            dir,
            tables: BTreeMap::new(),
            ranges: Vec::new(),
            sparse: BTreeMap::new(),
            use_sparse,
            next_generation: generations.last().map_or(1, |g| g + 1),
            closed: false,
        };
        for generation in generations {
            let table = SSTable::open(&manager.dir, generation)?;
            manager.register(table);
        }

        // A data file without its index never finished writing.
        for path in data_files {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            let has_index = manager
                .tables
                .values()
                .any(|t| t.data_path().file_name().and_then(|n| n.to_str()) == Some(name));
            if !has_index {
                log::warn!("sstable: removing orphan data file {:?}", path);
                fs::remove_file(&path)?;
            }
        }

        log::info!(
            "sstable: opened {} table(s) in {:?}, next generation {}",
            manager.tables.len(),
            manager.dir,
            manager.next_generation
        );
        Ok(manager)
    }

    /// Settle `.tmp` files left by an interrupted table write.
    ///
    /// Both temp files are complete before the first rename, and the data
    /// file is renamed first. An index temp file whose data file is in
    /// place and whose data temp file is gone is renamed forward. Every
    /// other temp file is removed.
    fn recover_temp_files(dir: &Path) -> Result<()> {
        let mut temps = Vec::new();
        for dirent in fs::read_dir(dir)? {
            let path = dirent?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(target) = name
                .strip_suffix(sstable::TMP_EXT)
                .and_then(|n| n.strip_suffix('.'))
            {
                temps.push((target.to_string(), path.clone()));
            }
        }

        let pending_data: Vec<String> = temps
            .iter()
            .filter(|(target, _)| target.ends_with(sstable::DATA_EXT))
            .map(|(target, _)| target.clone())
            .collect();
        for (target, path) in temps {
            let data_committed = sstable::parse_index_file_name(&target).map_or(false, |generation| {
                let data = sstable::data_file_name(generation);
                !pending_data.contains(&data) && dir.join(&data).exists()
            });
            if data_committed {
                log::warn!("sstable: completing interrupted write of {:?}", target);
                fs::rename(&path, dir.join(&target))?;
            } else {
                log::warn!("sstable: removing unfinished file {:?}", path);
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(LsmError::FileClosed);
        }
        Ok(())
    }

    fn register(&mut self, table: SSTable) {
        let generation = table.generation();
        self.ranges.retain(|r| r.generation != generation);
        let pos = self.ranges.partition_point(|r| r.generation < generation);
        self.ranges.insert(pos, KeyRange::of(&table));
        if self.use_sparse {
            self.sparse.insert(generation, SparseIndex::build(&table));
        }
        self.next_generation = self.next_generation.max(generation + 1);
        self.tables.insert(generation, table);
    }

    fn unregister(&mut self, generation: i64) -> Option<SSTable> {
        self.ranges.retain(|r| r.generation != generation);
        self.sparse.remove(&generation);
        self.tables.remove(&generation)
    }

    /// Newest generation whose key range contains `key`.
    pub fn search_sparse(&self, key: &[u8]) -> Result<i64> {
        self.ranges
            .iter()
            .rev()
            .find(|r| r.contains(key))
            .map(|r| r.generation)
            .ok_or(LsmError::SstIndexNotFound)
    }

    /// Every generation whose range contains `key`, newest first.
    pub fn candidates(&self, key: &[u8]) -> Vec<i64> {
        self.ranges
            .iter()
            .rev()
            .filter(|r| r.contains(key))
            .map(|r| r.generation)
            .collect()
    }

    /// Latest on-disk version of `key`, which may be a tombstone.
    pub fn get(&self, key: &[u8]) -> Result<Entry> {
        self.ensure_open()?;
        for generation in self.candidates(key) {
            match self.lookup(generation, key) {
                Ok(entry) => return Ok(entry),
                Err(LsmError::SstIndexNotFound) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(LsmError::KeyNotFound)
    }

    /// Look `key` up in one table, through the sparse index when enabled.
    fn lookup(&self, generation: i64, key: &[u8]) -> Result<Entry> {
        let table = self
            .tables
            .get(&generation)
            .ok_or(LsmError::SstIndexNotFound)?;
        let Some(sparse) = self.sparse.get(&generation) else {
            return table.get(key);
        };

        let (lo, hi) = sparse.window(key).ok_or(LsmError::SstIndexNotFound)?;
        let mut found = None;
        table.scan_window(lo, hi, |_, entry| match entry.key.as_slice().cmp(key) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Equal => {
                found = Some(entry);
                false
            }
            std::cmp::Ordering::Greater => false,
        })?;
        found.ok_or(LsmError::SstIndexNotFound)
    }

    /// True when a live table older than `generation` may hold `key`.
    fn older_covers(&self, generation: i64, key: &[u8]) -> bool {
        self.ranges
            .iter()
            .take_while(|r| r.generation < generation)
            .any(|r| r.contains(key))
    }

    /// Write the memtable out as the next generation and reset it.
    /// Returns `None` when there was nothing to flush.
    pub fn flush_memtable(&mut self, memtable: &mut MemTable) -> Result<Option<i64>> {
        self.ensure_open()?;
        if memtable.is_empty() {
            return Ok(None);
        }
        let generation = self.next_generation;
        let entries = memtable.entries();
        let count = entries.len();
        let table = SSTable::write_batch(&self.dir, generation, entries)?;
        self.register(table);
        memtable.reset();
        log::info!(
            "sstable: flushed {} entries to generation {}",
            count,
            generation
        );
        Ok(Some(generation))
    }

    /// Rewrite table `generation` in place without its droppable tombstones.
    ///
    /// A tombstone is kept while an older table may still hold its key. If
    /// nothing survives, the table is removed. Returns the entries dropped.
    pub fn compact(&mut self, generation: i64) -> Result<usize> {
        self.ensure_open()?;
        let table = self
            .tables
            .get(&generation)
            .ok_or(LsmError::SstIndexNotFound)?;
        let entries = table.entries()?;
        let before = entries.len();
        let kept: Vec<Entry> = entries
            .into_iter()
            .filter(|e| !e.is_tombstone() || self.older_covers(generation, &e.key))
            .collect();
        let dropped = before - kept.len();
        if dropped == 0 {
            return Ok(0);
        }

        if kept.is_empty() {
            if let Some(old) = self.unregister(generation) {
                old.remove()?;
            }
        } else {
            // The new files replace the old ones by rename.
            let rewritten = SSTable::write_batch(&self.dir, generation, kept)?;
            if let Some(old) = self.tables.get(&generation) {
                old.close();
            }
            self.register(rewritten);
        }
        log::info!(
            "sstable: compacted generation {} ({} tombstone(s) dropped)",
            generation,
            dropped
        );
        Ok(dropped)
    }

    /// Merge two tables into generation `max(a, b) + 1`; on equal keys the
    /// newer input wins. Both inputs are removed once the output is written.
    ///
    /// The inputs must be adjacent (no live table between them) and the
    /// output generation must be free, so that the merged table ranks
    /// exactly where its inputs did. Returns `None` when every entry was a
    /// droppable tombstone and no output table was needed.
    pub fn merge(&mut self, a: i64, b: i64) -> Result<Option<i64>> {
        self.ensure_open()?;
        if a == b {
            return Err(LsmError::InvalidMerge(format!("cannot merge generation {a} with itself")));
        }
        let (older, newer) = (a.min(b), a.max(b));
        if !self.tables.contains_key(&older) || !self.tables.contains_key(&newer) {
            return Err(LsmError::SstIndexNotFound);
        }
        if self.tables.range(older + 1..newer).next().is_some() {
            return Err(LsmError::InvalidMerge(format!(
                "generations {older} and {newer} are not adjacent"
            )));
        }
        let output = newer + 1;
        if self.tables.contains_key(&output) {
            return Err(LsmError::InvalidMerge(format!(
                "output generation {output} already exists"
            )));
        }

        let mut sources = Vec::with_capacity(2);
        for generation in [older, newer] {
            if let Some(table) = self.tables.get(&generation) {
                sources.push(table.entries()?);
            }
        }
        let merged: Vec<Entry> = merge_sorted(sources)
            .into_iter()
            .filter(|e| !e.is_tombstone() || self.older_covers(older, &e.key))
            .collect();

        let produced = if merged.is_empty() {
            None
        } else {
            let table = SSTable::write_batch(&self.dir, output, merged)?;
            self.register(table);
            Some(output)
        };

        for generation in [older, newer] {
            if let Some(table) = self.unregister(generation) {
                table.remove()?;
            }
        }
        log::info!(
            "sstable: merged generations {} and {} into {:?}",
            older,
            newer,
            produced
        );
        Ok(produced)
    }

    /// Every table's entries, oldest generation first.
    pub fn all_entries(&self) -> Result<Vec<Vec<Entry>>> {
        self.ensure_open()?;
        self.tables.values().map(|t| t.entries()).collect()
    }

    /// Release all table handles. Later calls fail with `FileClosed`.
    pub fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        for table in self.tables.values() {
            table.close();
        }
        self.closed = true;
        log::debug!("sstable: closed {:?}", self.dir);
        Ok(())
    }

    pub fn table(&self, generation: i64) -> Option<&SSTable> {
        self.tables.get(&generation)
    }

    pub fn sparse_index(&self, generation: i64) -> Option<&SparseIndex> {
        self.sparse.get(&generation)
    }

    /// Live generations, ascending.
    pub fn generations(&self) -> Vec<i64> {
        self.tables.keys().copied().collect()
    }

    pub fn ranges(&self) -> &[KeyRange] {
        &self.ranges
    }

    pub fn next_generation(&self) -> i64 {
        self.next_generation
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(k: &str, v: &str) -> Entry {
        Entry::put(k.as_bytes().to_vec(), v.as_bytes().to_vec())
    }

    fn write(dir: &Path, generation: i64, entries: Vec<Entry>) {
        SSTable::write_batch(dir, generation, entries).unwrap();
    }

    fn value(manager: &SstManager, key: &str) -> Option<Vec<u8>> {
        match manager.get(key.as_bytes()) {
            Ok(entry) => entry.value,
            Err(LsmError::KeyNotFound) => None,
            Err(e) => panic!("unexpected error {e}"),
        }
    }

    #[test]
    fn test_sample_step() {
        assert_eq!(sample_step(0), 1);
        assert_eq!(sample_step(1), 1);
        assert_eq!(sample_step(2), 1);
        assert_eq!(sample_step(1000), 9);
        assert_eq!(sample_step(1024), 10);
    }

    #[test]
    fn test_sparse_window() {
        let dir = tempfile::tempdir().unwrap();
        let entries: Vec<Entry> = (0..64).map(|i| put(&format!("k{:03}", i), "v")).collect();
        let table = SSTable::write_batch(dir.path(), 1, entries).unwrap();
        let sparse = SparseIndex::build(&table);
        assert_eq!(sparse.len(), 11); // every 6th of 64

        let (lo, hi) = sparse.window(b"k007").unwrap();
        assert_eq!(lo, table.find(b"k006").unwrap());
        assert_eq!(hi, Some(table.find(b"k012").unwrap()));

        let (lo, hi) = sparse.window(b"k012").unwrap();
        // The sample itself starts the window; the scan stops on it.
        assert_eq!(lo, table.find(b"k012").unwrap());
        assert_eq!(hi, None);
        assert!(sparse.window(b"a").is_none());
    }

    #[test]
    fn test_open_discovers_tables() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), 1, vec![put("a", "1"), put("m", "1")]);
        write(dir.path(), 2, vec![put("k", "2"), put("z", "2")]);

        let manager = SstManager::open(dir.path(), true).unwrap();
        assert_eq!(manager.generations(), vec![1, 2]);
        assert_eq!(manager.next_generation(), 3);
        assert_eq!(manager.search_sparse(b"b").unwrap(), 1);
        assert_eq!(manager.search_sparse(b"l").unwrap(), 2);
        assert!(matches!(
            manager.search_sparse(b"zz"),
            Err(LsmError::SstIndexNotFound)
        ));
        assert_eq!(manager.candidates(b"l"), vec![2, 1]);
    }

    #[test]
    fn test_get_falls_back_to_older_tables() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), 1, vec![put("a", "1"), put("c", "old"), put("m", "1")]);
        write(dir.path(), 2, vec![put("b", "2"), put("c", "new"), put("z", "2")]);

        for sparse in [true, false] {
            let manager = SstManager::open(dir.path(), sparse).unwrap();
            assert_eq!(value(&manager, "c"), Some(b"new".to_vec()));
            // "m" lies in both ranges but only exists in generation 1.
            assert_eq!(value(&manager, "m"), Some(b"1".to_vec()));
            assert_eq!(value(&manager, "d"), None);
        }
    }

    #[test]
    fn test_orphans_are_cleaned() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), 1, vec![put("a", "1")]);
        fs::write(dir.path().join(sstable::data_file_name(5)), b"partial").unwrap();
        fs::write(dir.path().join("sst-0000000006.idx.tmp"), b"partial").unwrap();

        let manager = SstManager::open(dir.path(), true).unwrap();
        assert_eq!(manager.len(), 1);
        assert!(!dir.path().join(sstable::data_file_name(5)).exists());
        assert!(!dir.path().join("sst-0000000006.idx.tmp").exists());
    }

    #[test]
    fn test_compaction_interrupted_between_renames_rolls_forward() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            1,
            vec![put("a", "1"), Entry::delete(b"b".to_vec()), put("c", "3")],
        );
        let index_path = dir.path().join(sstable::index_file_name(1));
        let old_index = fs::read(&index_path).unwrap();
        {
            let mut manager = SstManager::open(dir.path(), true).unwrap();
            assert_eq!(manager.compact(1).unwrap(), 1);
        }

        // New data file in place, old index still live, new index pending.
        let index_tmp = dir.path().join("sst-0000000001.idx.tmp");
        fs::rename(&index_path, &index_tmp).unwrap();
        fs::write(&index_path, old_index).unwrap();

        let manager = SstManager::open(dir.path(), true).unwrap();
        assert!(!index_tmp.exists());
        assert_eq!(manager.table(1).unwrap().len(), 2);
        assert_eq!(value(&manager, "a"), Some(b"1".to_vec()));
        assert_eq!(value(&manager, "c"), Some(b"3".to_vec()));
        assert_eq!(value(&manager, "b"), None);
    }

    #[test]
    fn test_write_interrupted_before_renames_keeps_old_table() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), 1, vec![put("a", "old")]);
        fs::write(dir.path().join("sst-0000000001.dat.tmp"), b"partial").unwrap();
        fs::write(dir.path().join("sst-0000000001.idx.tmp"), b"partial").unwrap();

        let manager = SstManager::open(dir.path(), true).unwrap();
        assert_eq!(value(&manager, "a"), Some(b"old".to_vec()));
        assert!(!dir.path().join("sst-0000000001.dat.tmp").exists());
        assert!(!dir.path().join("sst-0000000001.idx.tmp").exists());
    }

    #[test]
    fn test_flush_memtable() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = SstManager::open(dir.path(), true).unwrap();
        let mut memtable = MemTable::new(1024);
        assert_eq!(manager.flush_memtable(&mut memtable).unwrap(), None);

        memtable.put(b"b".to_vec(), Some(b"2".to_vec()));
        memtable.put(b"a".to_vec(), Some(b"1".to_vec()));
        memtable.delete(b"c".to_vec());
        assert_eq!(manager.flush_memtable(&mut memtable).unwrap(), Some(1));
        assert!(memtable.is_empty());
        assert_eq!(value(&manager, "a"), Some(b"1".to_vec()));
        assert!(manager.get(b"c").unwrap().is_tombstone());
        assert_eq!(manager.ranges()[0].first_key, b"a".to_vec());
        assert_eq!(manager.ranges()[0].last_key, b"c".to_vec());
    }

    #[test]
    fn test_merge_newer_generation_wins() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), 1, vec![put("1", "old"), put("2", "old"), put("3", "old")]);
        write(dir.path(), 2, vec![put("2", "new"), put("4", "new")]);
        let mut manager = SstManager::open(dir.path(), true).unwrap();

        let output = manager.merge(1, 2).unwrap();
        assert_eq!(output, Some(3));
        assert_eq!(manager.generations(), vec![3]);

        let merged = manager.table(3).unwrap().entries().unwrap();
        assert_eq!(
            merged,
            vec![put("1", "old"), put("2", "new"), put("3", "old"), put("4", "new")]
        );
        assert!(!dir.path().join(sstable::index_file_name(1)).exists());
        assert!(!dir.path().join(sstable::data_file_name(2)).exists());
    }

    #[test]
    fn test_merge_validation() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), 1, vec![put("a", "1")]);
        write(dir.path(), 2, vec![put("a", "2")]);
        write(dir.path(), 3, vec![put("a", "3")]);
        let mut manager = SstManager::open(dir.path(), true).unwrap();

        assert!(matches!(manager.merge(2, 2), Err(LsmError::InvalidMerge(_))));
        assert!(matches!(manager.merge(1, 3), Err(LsmError::InvalidMerge(_))));
        // Output slot 3 is taken.
        assert!(matches!(manager.merge(1, 2), Err(LsmError::InvalidMerge(_))));
        assert!(matches!(manager.merge(3, 9), Err(LsmError::SstIndexNotFound)));

        assert_eq!(manager.merge(3, 2).unwrap(), Some(4));
        assert_eq!(manager.generations(), vec![1, 4]);
        assert_eq!(value(&manager, "a"), Some(b"3".to_vec()));
        assert_eq!(manager.next_generation(), 5);
    }

    #[test]
    fn test_tombstones_shadowing_older_tables_survive_compaction() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), 1, vec![put("a", "1")]);
        write(
            dir.path(),
            2,
            vec![Entry::delete(b"a".to_vec()), put("b", "2"), Entry::delete(b"q".to_vec())],
        );
        let mut manager = SstManager::open(dir.path(), true).unwrap();

        // "q" is outside generation 1's range and can go, "a" must stay.
        assert_eq!(manager.compact(2).unwrap(), 1);
        assert!(manager.get(b"a").unwrap().is_tombstone());
        assert_eq!(manager.table(2).unwrap().len(), 2);
        assert_eq!(manager.compact(2).unwrap(), 0);
    }

    #[test]
    fn test_compact_oldest_drops_all_tombstones() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            1,
            vec![put("a", "1"), Entry::delete(b"b".to_vec()), put("c", "3")],
        );
        let mut manager = SstManager::open(dir.path(), true).unwrap();
        assert_eq!(manager.compact(1).unwrap(), 1);
        assert_eq!(manager.table(1).unwrap().len(), 2);
        assert!(matches!(manager.get(b"b"), Err(LsmError::KeyNotFound)));

        drop(manager);
        let manager = SstManager::open(dir.path(), true).unwrap();
        assert_eq!(value(&manager, "c"), Some(b"3".to_vec()));
    }

    #[test]
    fn test_compact_removes_table_of_only_tombstones() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), 1, vec![Entry::delete(b"a".to_vec())]);
        let mut manager = SstManager::open(dir.path(), true).unwrap();
        assert_eq!(manager.compact(1).unwrap(), 1);
        assert!(manager.is_empty());
        assert!(!dir.path().join(sstable::index_file_name(1)).exists());
    }

    #[test]
    fn test_closed_manager() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = SstManager::open(dir.path(), true).unwrap();
        manager.close().unwrap();
        assert!(matches!(manager.get(b"a"), Err(LsmError::FileClosed)));
        assert!(matches!(manager.close(), Err(LsmError::FileClosed)));
    }
}
