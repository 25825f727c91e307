//! LSMKV - Engine Configuration
//! Defines tunable parameters for the LSM storage engine.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{LsmError, Result};

/// Name of the WAL segment directory under the base path.
pub const LOG_DIR: &str = "log";
/// Name of the SSTable directory under the base path.
pub const DATA_DIR: &str = "data";

/// Configuration for the storage engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base directory for all data files (WAL segments, SSTables).
    pub data_dir: PathBuf,

    /// Memtable size in bytes above which a flush is triggered.
    pub flush_threshold: usize,

    /// Maximum size of a single WAL segment file in bytes.
    pub max_segment_size: u64,

    /// Whether to sync WAL writes to disk immediately (fsync).
    pub sync_writes: bool,

    /// Keep a sampled key index per SSTable and use it for point lookups.
    pub sparse_index: bool,

    /// Merge the two newest SSTables once more than this many exist.
    /// Zero disables automatic merging.
    pub merge_trigger: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            flush_threshold: 4 * 1024 * 1024, // 4 MB
            max_segment_size: 16 * 1024 * 1024, // 16 MB
            sync_writes: true,
            sparse_index: true,
            merge_trigger: 8,
        }
    }
}

impl Config {
    /// Create a new Config with a custom data directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Set the memtable flush threshold.
    pub fn with_flush_threshold(mut self, bytes: usize) -> Self {
        self.flush_threshold = bytes;
        self
    }

    /// Set the maximum WAL segment size.
    pub fn with_max_segment_size(mut self, bytes: u64) -> Self {
        self.max_segment_size = bytes;
        self
    }

    pub fn with_sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    pub fn with_sparse_index(mut self, enabled: bool) -> Self {
        self.sparse_index = enabled;
        self
    }

    pub fn with_merge_trigger(mut self, tables: usize) -> Self {
        self.merge_trigger = tables;
        self
    }

    /// Directory holding WAL segments.
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join(LOG_DIR)
    }

    /// Directory holding SSTable data and index files.
    pub fn sstable_dir(&self) -> PathBuf {
        self.data_dir.join(DATA_DIR)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(LsmError::Config("data_dir must not be empty".into()));
        }
        if self.flush_threshold == 0 {
            return Err(LsmError::Config("flush_threshold must be > 0".into()));
        }
        if self.max_segment_size < crate::engine::wal::SEGMENT_TRIGGER_BYTES as u64 * 2 {
            return Err(LsmError::Config(format!(
                "max_segment_size must be at least {} bytes",
                crate::engine::wal::SEGMENT_TRIGGER_BYTES * 2
            )));
        }
        if self.merge_trigger == 1 {
            return Err(LsmError::Config(
                "merge_trigger must be 0 (disabled) or at least 2".into(),
            ));
        }
        Ok(())
    }

    /// Ensure the base, log and data directories exist.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(self.log_dir())?;
        std::fs::create_dir_all(self.sstable_dir())
    }
}
