//! Query-result cache: plain LRU, nothing fancier. `cache {enable|disable|
//! clear|stats}` drives this directly; there is no admission policy beyond
//! "evict the least recently used entry once `capacity` is exceeded".

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde_json::Value;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
}

struct Entry {
    key: String,
    rows: Vec<Value>,
}

struct Inner {
    enabled: bool,
    capacity: usize,
    // Front = most recently used.
    entries: VecDeque<Entry>,
    hits: u64,
    misses: u64,
}

pub struct QueryCache {
    inner: Mutex<Inner>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                enabled: true,
                capacity: DEFAULT_CAPACITY,
                entries: VecDeque::new(),
                hits: 0,
                misses: 0,
            }),
        }
    }

    pub fn enable(&self) {
        self.inner.lock().enabled = true;
    }

    pub fn disable(&self) {
        let mut inner = self.inner.lock();
        inner.enabled = false;
        inner.entries.clear();
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            size: inner.entries.len(),
        }
    }

    /// Look up `key`, promoting it to most-recently-used on a hit.
    pub fn get(&self, key: &str) -> Option<Vec<Value>> {
        let mut inner = self.inner.lock();
        if !inner.enabled {
            return None;
        }
        if let Some(pos) = inner.entries.iter().position(|e| e.key == key) {
            let entry = inner.entries.remove(pos).unwrap();
            let rows = entry.rows.clone();
            inner.entries.push_front(entry);
            inner.hits += 1;
            Some(rows)
        } else {
            inner.misses += 1;
            None
        }
    }

    pub fn put(&self, key: String, rows: Vec<Value>) {
        let mut inner = self.inner.lock();
        if !inner.enabled {
            return;
        }
        inner.entries.retain(|e| e.key != key);
        inner.entries.push_front(Entry { key, rows });
        let capacity = inner.capacity;
        while inner.entries.len() > capacity {
            inner.entries.pop_back();
        }
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}
