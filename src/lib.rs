//! LSMKV - LSM-Tree Key-Value Storage Engine
//!
//! An embedded, crash-recoverable key-value store built on the
//! Log-Structured Merge-Tree architecture.
//!
//! ## Features
//! - **Write-Ahead Log**: segmented, replayed on open, truncated after flush
//! - **MemTable**: arena-backed red-black tree with byte-size accounting
//! - **SSTable**: immutable sorted data + index file pairs
//! - **Sparse index**: sampled per-table keys for windowed point lookups
//! - **Compaction & merge**: tombstone removal and newest-wins table merges
//! - **Metrics**: lock-free atomic counters for observability
//!
//! ## Example
//! ```no_run
//! use lsmkv::{Config, LsmTree};
//!
//! let tree = LsmTree::open(Config::new("/tmp/lsmkv")).unwrap();
//! tree.put(b"key".to_vec(), b"value".to_vec()).unwrap();
//! assert_eq!(tree.get(b"key").unwrap(), b"value".to_vec());
//! tree.close().unwrap();
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod types;

pub use config::Config;
pub use engine::LsmTree;
pub use error::{LsmError, Result};
