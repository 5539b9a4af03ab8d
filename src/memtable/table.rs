//! MemTable implementation
//!
//! BTreeMap-based memtable guarded by a single RwLock. Reads take a shared
//! lock; writes (put/delete/clear) take an exclusive one. Size is tracked
//! incrementally so flush triggers don't require walking the whole map.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use super::MemTableEntry;

struct Inner {
    data: BTreeMap<Vec<u8>, MemTableEntry>,
    size_bytes: usize,
}

/// In-memory table for recent writes.
pub struct MemTable {
    inner: RwLock<Inner>,
}

impl MemTable {
    /// Create a new empty MemTable.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                data: BTreeMap::new(),
                size_bytes: 0,
            }),
        }
    }

    /// Get an entry by key.
    pub fn get(&self, key: &[u8]) -> Option<MemTableEntry> {
        self.inner.read().data.get(key).cloned()
    }

    /// Put a key-value pair, returning the memtable's new approximate size.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> usize {
        let mut inner = self.inner.write();
        let entry_size = key.len() + value.len();
        if let Some(old) = inner.data.insert(key.clone(), MemTableEntry::Value(value)) {
            inner.size_bytes -= entry_size_of(&key, &old);
        }
        inner.size_bytes += entry_size;
        inner.size_bytes
    }

    /// Delete a key (writes a tombstone), returning the memtable's new
    /// approximate size.
    pub fn delete(&self, key: Vec<u8>) -> usize {
        let mut inner = self.inner.write();
        let entry_size = key.len();
        if let Some(old) = inner
            .data
            .insert(key.clone(), MemTableEntry::Tombstone)
        {
            inner.size_bytes -= entry_size_of(&key, &old);
        }
        inner.size_bytes += entry_size;
        inner.size_bytes
    }

    /// Approximate size in bytes.
    pub fn size(&self) -> usize {
        self.inner.read().size_bytes
    }

    /// Number of entries (live + tombstoned).
    pub fn entry_count(&self) -> usize {
        self.inner.read().data.len()
    }

    /// Whether the memtable holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.read().data.is_empty()
    }

    /// Whether the memtable should be flushed given a size limit.
    pub fn should_flush(&self, size_limit: usize) -> bool {
        self.size() >= size_limit
    }

    /// Snapshot all entries in sorted key order, for flushing to an SSTable.
    pub fn snapshot(&self) -> Vec<(Vec<u8>, MemTableEntry)> {
        self.inner
            .read()
            .data
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Clear all entries (after a successful flush).
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.data.clear();
        inner.size_bytes = 0;
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

fn entry_size_of(key: &[u8], entry: &MemTableEntry) -> usize {
    match entry {
        MemTableEntry::Value(v) => key.len() + v.len(),
        MemTableEntry::Tombstone => key.len(),
    }
}
