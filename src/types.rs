//! LSMKV - Core Type Definitions
//! Defines fundamental types used across the storage engine.

/// Key type for the storage engine.
/// Using Vec<u8> allows arbitrary binary keys.
pub type Key = Vec<u8>;

/// Value type for the storage engine.
/// Using Vec<u8> allows arbitrary binary values.
pub type Value = Vec<u8>;

/// Represents a single record in the WAL, memtable or an SSTable.
/// A `None` value indicates a tombstone (deletion marker), which is
/// distinct from an empty value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Key,
    pub value: Option<Value>,
}

impl Entry {
    /// Create a new entry with a value (PUT operation).
    pub fn put(key: Key, value: Value) -> Self {
        Self {
            key,
            value: Some(value),
        }
    }

    /// Create a tombstone entry (DELETE operation).
    pub fn delete(key: Key) -> Self {
        Self { key, value: None }
    }

    /// Returns true if this entry is a tombstone.
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// Bytes accounted for this entry: key plus value (0 for a tombstone).
    pub fn size(&self) -> usize {
        self.key.len() + self.value.as_ref().map_or(0, |v| v.len())
    }
}

/// Position of one data record inside an SSTable, written to the
/// `.idx` file in the same order as the data file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub key: Key,
    pub offset: i64,
}
