//! Row storage: the authoritative `row-id → document` map for one table.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;

/// A stored row: its document plus the LSN of the write that last touched
/// it, used to discard stale at-least-once replication messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowRecord {
    pub doc: Value,
    pub lsn: u64,
}

/// The authoritative row store for `(db, table)` on this node. Mutated
/// exclusively by the local writer path and by replication handlers; read
/// by the query executor.
pub struct TableStorageObject {
    path: PathBuf,
    rows: RwLock<BTreeMap<Uuid, RowRecord>>,
}

impl TableStorageObject {
    pub fn new(snapshot_path: impl Into<PathBuf>) -> Self {
        Self {
            path: snapshot_path.into(),
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn get(&self, row_id: &Uuid) -> Option<Value> {
        self.rows.read().get(row_id).map(|r| r.doc.clone())
    }

    /// Insert or replace a row if `lsn` is newer than what's already there.
    /// Returns `true` if the write was applied (used for replication
    /// idempotency: a stale message is a no-op, not an error).
    pub fn put(&self, row_id: Uuid, doc: Value, lsn: u64) -> bool {
        let mut rows = self.rows.write();
        match rows.get(&row_id) {
            Some(existing) if existing.lsn >= lsn => false,
            _ => {
                rows.insert(row_id, RowRecord { doc, lsn });
                true
            }
        }
    }

    pub fn remove(&self, row_id: &Uuid) -> Option<Value> {
        self.rows.write().remove(row_id).map(|r| r.doc)
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Snapshot every row in row-id order, for full table scans.
    pub fn scan(&self) -> Vec<(Uuid, Value)> {
        self.rows
            .read()
            .iter()
            .map(|(id, r)| (*id, r.doc.clone()))
            .collect()
    }

    pub fn last_lsn(&self, row_id: &Uuid) -> Option<u64> {
        self.rows.read().get(row_id).map(|r| r.lsn)
    }

    /// Persist the full row map to disk. Called by the Storage Scheduler,
    /// independent of LSM flushing.
    pub fn save_to_disk(&self) -> Result<()> {
        let rows = self.rows.read();
        let bytes = bincode::serialize(&*rows)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Load the row map from the last Scheduler snapshot, if one exists.
    pub fn load_from_disk(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let bytes = fs::read(&self.path)?;
        let rows: BTreeMap<Uuid, RowRecord> = bincode::deserialize(&bytes)?;
        *self.rows.write() = rows;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
