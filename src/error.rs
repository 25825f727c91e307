//! LSMKV - Custom Error Types
//! Defines the error hierarchy for the LSM storage engine.

use thiserror::Error;

/// Custom Result type for the engine.
pub type Result<T> = std::result::Result<T, LsmError>;

/// Error types for the storage engine.
#[derive(Error, Debug)]
pub enum LsmError {
    /// I/O errors from file operations (WAL, SSTable).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Data corruption detected (CRC mismatch, broken segment chain).
    #[error("Data corruption detected: {0}")]
    Corruption(String),

    /// A log index outside `[first_index, last_index]` was requested.
    #[error("Index {index} out of bounds [{first}, {last}]")]
    OutOfBounds { index: i64, first: i64, last: i64 },

    /// Key not found in the storage engine.
    #[error("Key not found")]
    KeyNotFound,

    /// The key exists but its latest version is a deletion marker.
    #[error("Key found as tombstone")]
    FoundTombstone,

    /// An entry was missing or malformed.
    #[error("Bad entry: {0}")]
    BadEntry(String),

    /// The component was already closed.
    #[error("File closed")]
    FileClosed,

    /// No SSTable (or no index slot inside one) covers the key.
    #[error("SSTable index not found")]
    SstIndexNotFound,

    /// The requested merge would break generation ordering.
    #[error("Invalid merge: {0}")]
    InvalidMerge(String),

    /// The write itself is in the WAL and the memtable, but the flush or
    /// merge it triggered failed. It is retried on the next write.
    #[error("Write applied, but the triggered flush failed: {0}")]
    FlushFailed(#[source] Box<LsmError>),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for LsmError {
    fn from(err: bincode::Error) -> Self {
        LsmError::Serialization(err.to_string())
    }
}

impl LsmError {
    /// True for results that mean "no live value", whether the key never
    /// existed or was deleted.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            LsmError::KeyNotFound | LsmError::FoundTombstone | LsmError::SstIndexNotFound
        )
    }
}
