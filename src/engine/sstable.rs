//! LSMKV - SSTable (Sorted String Table)
//! Immutable on-disk storage for flushed memtables and merge output.
//!
//! ## Files
//! ```text
//! <base>/data/sst-<generation: 10 hex>.dat   codec records, ascending by key
//! <base>/data/sst-<generation: 10 hex>.idx   (key_len, offset, key) per record
//! ```
//! The index file lists the data records one-to-one in the same order,
//! so the whole index is loaded on open and point lookups binary-search
//! it. Both files are written under a `.tmp` name and renamed into
//! place, index last: a present `.idx` marks a complete table.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::engine::codec::{self, EntryCodec};
use crate::error::{LsmError, Result};
use crate::types::{Entry, IndexEntry, Key};

const SSTABLE_PREFIX: &str = "sst-";
pub const DATA_EXT: &str = "dat";
pub const INDEX_EXT: &str = "idx";
pub const TMP_EXT: &str = "tmp";

pub fn data_file_name(generation: i64) -> String {
    format!("{SSTABLE_PREFIX}{:010x}.{DATA_EXT}", generation)
}

pub fn index_file_name(generation: i64) -> String {
    format!("{SSTABLE_PREFIX}{:010x}.{INDEX_EXT}", generation)
}

/// Generation encoded in an `sst-XXXXXXXXXX.idx` file name.
pub fn parse_index_file_name(name: &str) -> Option<i64> {
    let hex = name
        .strip_prefix(SSTABLE_PREFIX)?
        .strip_suffix(INDEX_EXT)?
        .strip_suffix('.')?;
    if hex.len() != 10 {
        return None;
    }
    i64::from_str_radix(hex, 16).ok()
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(TMP_EXT);
    PathBuf::from(name)
}

/// Sorted String Table - immutable on-disk storage.
pub struct SSTable {
    generation: i64,
    data_path: PathBuf,
    index_path: PathBuf,
    /// Full key/offset index, parallel to the data file.
    index: Vec<IndexEntry>,
    first_key: Key,
    last_key: Key,
    /// Positional read handle; `None` once closed.
    data: Mutex<Option<File>>,
}

impl SSTable {
    /// Write `batch` as table `generation` in `dir`.
    ///
    /// The batch is stable-sorted by key when needed; among equal keys the
    /// last one wins.
    pub fn write_batch(dir: &Path, generation: i64, mut batch: Vec<Entry>) -> Result<Self> {
        if batch.is_empty() {
            return Err(LsmError::BadEntry("cannot write an empty SSTable".into()));
        }
        if !batch.windows(2).all(|w| w[0].key <= w[1].key) {
            batch.sort_by(|a, b| a.key.cmp(&b.key));
        }
        let mut sorted: Vec<Entry> = Vec::with_capacity(batch.len());
        for entry in batch {
            match sorted.last_mut() {
                Some(last) if last.key == entry.key => *last = entry,
                _ => sorted.push(entry),
            }
        }

        let data_path = dir.join(data_file_name(generation));
        let index_path = dir.join(index_file_name(generation));
        let data_tmp = tmp_path(&data_path);
        let index_tmp = tmp_path(&index_path);

        let mut codec = EntryCodec::new();
        let mut index = Vec::with_capacity(sorted.len());
        {
            let mut data = BufWriter::new(File::create(&data_tmp)?);
            for entry in &sorted {
                let offset = codec.encode(&mut data, entry)?;
                index.push(IndexEntry {
                    key: entry.key.clone(),
                    offset: offset as i64,
                });
            }
            data.flush()?;
            data.get_ref().sync_all()?;
        }
        {
            let mut idx = BufWriter::new(File::create(&index_tmp)?);
            for entry in &index {
                codec::encode_index(&mut idx, entry)?;
            }
            idx.flush()?;
            idx.get_ref().sync_all()?;
        }
        fs::rename(&data_tmp, &data_path)?;
        fs::rename(&index_tmp, &index_path)?;

        log::debug!(
            "sstable: wrote generation {} ({} entries) to {:?}",
            generation,
            index.len(),
            data_path
        );
        Self::from_parts(generation, data_path, index_path, index)
    }

    /// Open an existing table, loading its index into memory.
    pub fn open(dir: &Path, generation: i64) -> Result<Self> {
        let data_path = dir.join(data_file_name(generation));
        let index_path = dir.join(index_file_name(generation));

        let mut reader = BufReader::new(File::open(&index_path)?);
        let mut index = Vec::new();
        while let Some(entry) = codec::decode_index(&mut reader)? {
            index.push(entry);
        }
        if !index.windows(2).all(|w| w[0].key < w[1].key) {
            return Err(LsmError::Corruption(format!(
                "index {:?} is not strictly ascending",
                index_path
            )));
        }
        let table = Self::from_parts(generation, data_path, index_path, index)?;

        // The pair is renamed one file at a time; make sure the data file
        // reaches the last indexed record.
        if let Some(last) = table.index.last() {
            let entry = table.read_at(last.offset)?;
            if entry.key != last.key {
                return Err(LsmError::Corruption(format!(
                    "data file {:?} does not match its index",
                    table.data_path
                )));
            }
        }
        Ok(table)
    }

    fn from_parts(
        generation: i64,
        data_path: PathBuf,
        index_path: PathBuf,
        index: Vec<IndexEntry>,
    ) -> Result<Self> {
        let (first_key, last_key) = match (index.first(), index.last()) {
            (Some(first), Some(last)) => (first.key.clone(), last.key.clone()),
            _ => {
                return Err(LsmError::Corruption(format!(
                    "SSTable {:?} has an empty index",
                    index_path
                )))
            }
        };
        let data = File::open(&data_path)?;
        Ok(Self {
            generation,
            data_path,
            index_path,
            index,
            first_key,
            last_key,
            data: Mutex::new(Some(data)),
        })
    }

    /// Binary-search the index for `key` and return its data offset.
    pub fn find(&self, key: &[u8]) -> Result<i64> {
        self.index
            .binary_search_by(|entry| entry.key.as_slice().cmp(key))
            .map(|pos| self.index[pos].offset)
            .map_err(|_| LsmError::SstIndexNotFound)
    }

    /// Decode the record at `offset` in the data file.
    pub fn read_at(&self, offset: i64) -> Result<Entry> {
        let mut guard = self.data.lock();
        let file = guard.as_mut().ok_or(LsmError::FileClosed)?;
        codec::decode_at(file, offset as u64)
    }

    /// Point lookup through the full index. Tombstones are returned as entries.
    pub fn get(&self, key: &[u8]) -> Result<Entry> {
        let offset = self.find(key)?;
        self.read_at(offset)
    }

    /// Decode the whole data file in order until `f` returns false.
    pub fn scan<F>(&self, f: F) -> Result<()>
    where
        F: FnMut(Entry) -> bool,
    {
        let mut f = f;
        self.scan_window(0, None, |_, entry| f(entry))
    }

    /// Decode records starting at `lo` and stopping before `hi` (or EOF)
    /// until `f` returns false. `f` receives each record's offset.
    pub fn scan_window<F>(&self, lo: i64, hi: Option<i64>, mut f: F) -> Result<()>
    where
        F: FnMut(i64, Entry) -> bool,
    {
        if self.data.lock().is_none() {
            return Err(LsmError::FileClosed);
        }
        let mut file = File::open(&self.data_path)?;
        file.seek(SeekFrom::Start(lo as u64))?;
        let mut reader = BufReader::new(file);
        let mut offset = lo;
        while hi.map_or(true, |hi| offset < hi) {
            let Some(entry) = codec::try_decode(&mut reader)? else {
                break;
            };
            let size = codec::encoded_len(&entry) as i64;
            if !f(offset, entry) {
                break;
            }
            offset += size;
        }
        Ok(())
    }

    /// All records in key order.
    pub fn entries(&self) -> Result<Vec<Entry>> {
        let mut out = Vec::with_capacity(self.index.len());
        self.scan(|entry| {
            out.push(entry);
            true
        })?;
        Ok(out)
    }

    /// True when `key` falls inside `[first_key, last_key]`.
    pub fn covers(&self, key: &[u8]) -> bool {
        self.first_key.as_slice() <= key && key <= self.last_key.as_slice()
    }

    pub fn generation(&self) -> i64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn first_key(&self) -> &[u8] {
        &self.first_key
    }

    pub fn last_key(&self) -> &[u8] {
        &self.last_key
    }

    pub fn index(&self) -> &[IndexEntry] {
        &self.index
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Release the data file handle.
    pub fn close(&self) {
        self.data.lock().take();
    }

    /// Close the table and delete both of its files.
    pub fn remove(self) -> Result<()> {
        self.close();
        fs::remove_file(&self.index_path)?;
        fs::remove_file(&self.data_path)?;
        Ok(())
    }
}
