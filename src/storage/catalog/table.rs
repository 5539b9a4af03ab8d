//! Table: a schema-less document store backed by per-row placement and an
//! LSM engine, plus whatever secondary indexes have been created on it.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::Config;
use crate::engine::Engine;
use crate::error::{CoreError, Result};
use crate::index::BTreeIndex;

use super::row::TableStorageObject;

/// The primary/secondary node-ids that own a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub primary: Uuid,
    pub secondary: Uuid,
}

/// Placement map `row-id → {primary, secondary}`. Every row visible to the
/// cluster has exactly one entry here.
pub struct TableReplicaObject {
    path: PathBuf,
    placements: RwLock<BTreeMap<Uuid, Placement>>,
}

impl TableReplicaObject {
    pub fn new(snapshot_path: impl Into<PathBuf>) -> Self {
        Self {
            path: snapshot_path.into(),
            placements: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn get(&self, row_id: &Uuid) -> Option<Placement> {
        self.placements.read().get(row_id).copied()
    }

    pub fn set(&self, row_id: Uuid, placement: Placement) {
        self.placements.write().insert(row_id, placement);
    }

    pub fn update_new_primary(&self, row_id: Uuid, new_primary: Uuid) {
        let mut placements = self.placements.write();
        placements
            .entry(row_id)
            .and_modify(|p| p.primary = new_primary)
            .or_insert(Placement {
                primary: new_primary,
                secondary: new_primary,
            });
    }

    pub fn update_new_secondary(&self, row_id: Uuid, new_secondary: Uuid) {
        let mut placements = self.placements.write();
        placements
            .entry(row_id)
            .and_modify(|p| p.secondary = new_secondary)
            .or_insert(Placement {
                primary: new_secondary,
                secondary: new_secondary,
            });
    }

    /// Every row-id currently placed on `node`, either as primary or
    /// secondary — the working set for a reshuffle triggered by that node's
    /// loss.
    pub fn rows_owned_by(&self, node: Uuid) -> Vec<Uuid> {
        self.placements
            .read()
            .iter()
            .filter(|(_, p)| p.primary == node || p.secondary == node)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn save_to_disk(&self) -> Result<()> {
        let placements = self.placements.read();
        let bytes = bincode::serialize(&*placements)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn load_from_disk(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let bytes = fs::read(&self.path)?;
        let placements: BTreeMap<Uuid, Placement> = bincode::deserialize(&bytes)?;
        *self.placements.write() = placements;
        Ok(())
    }
}

/// One table within a database: a document store with secondary indexes.
pub struct Table {
    name: String,
    engine: Engine,
    storage_object: TableStorageObject,
    replica_object: TableReplicaObject,
    indexes: RwLock<HashMap<String, Arc<BTreeIndex>>>,
}

impl Table {
    pub fn open(dir: &Path, name: &str, base_config: &Config) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let mut engine_config = base_config.clone();
        engine_config.data_dir = dir.to_path_buf();
        let engine = Engine::open(engine_config)?;

        let storage_object = TableStorageObject::new(dir.join("storage.snapshot"));
        storage_object.load_from_disk()?;

        let replica_object = TableReplicaObject::new(dir.join("replica.snapshot"));
        replica_object.load_from_disk()?;

        Ok(Self {
            name: name.to_string(),
            engine,
            storage_object,
            replica_object,
            indexes: RwLock::new(HashMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storage_object(&self) -> &TableStorageObject {
        &self.storage_object
    }

    pub fn replica_object(&self) -> &TableReplicaObject {
        &self.replica_object
    }

    /// Insert a new document, generating a fresh row-id.
    pub fn insert(&self, doc: Value) -> Result<Uuid> {
        let row_id = Uuid::new_v4();
        let lsn = self.write_row(row_id, &doc)?;
        self.storage_object.put(row_id, doc.clone(), lsn);
        self.index_row(row_id, &doc);
        Ok(row_id)
    }

    /// Apply a replicated insert. Idempotent on `row_id`: a message whose
    /// LSN is not newer than what's already stored is a silent no-op.
    pub fn apply_replicated_insert(&self, row_id: Uuid, doc: Value, lsn: u64) -> Result<bool> {
        if self.storage_object.last_lsn(&row_id).unwrap_or(0) >= lsn {
            return Ok(false);
        }
        self.engine
            .put(row_id.as_bytes(), &bincode::serialize(&doc)?)?;
        let applied = self.storage_object.put(row_id, doc.clone(), lsn);
        if applied {
            self.index_row(row_id, &doc);
        }
        Ok(applied)
    }

    pub fn update(&self, row_id: Uuid, patch: Value) -> Result<bool> {
        let Some(mut existing) = self.storage_object.get(&row_id) else {
            return Ok(false);
        };
        if let (Value::Object(ref mut base), Value::Object(patch_fields)) = (&mut existing, patch)
        {
            base.extend(patch_fields);
        }
        let lsn = self.write_row(row_id, &existing)?;
        self.storage_object.put(row_id, existing.clone(), lsn);
        self.index_row(row_id, &existing);
        Ok(true)
    }

    pub fn delete(&self, row_id: Uuid) -> Result<bool> {
        let removed = self.storage_object.remove(&row_id);
        self.engine.delete(row_id.as_bytes())?;
        if let Some(doc) = removed {
            self.deindex_row(row_id, &doc);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn get(&self, row_id: Uuid) -> Option<Value> {
        self.storage_object.get(&row_id)
    }

    pub fn scan(&self) -> Vec<(Uuid, Value)> {
        self.storage_object.scan()
    }

    pub fn row_count(&self) -> usize {
        self.storage_object.len()
    }

    pub fn create_index(&self, column: &str) -> Arc<BTreeIndex> {
        let index = Arc::new(BTreeIndex::new(column));
        for (row_id, doc) in self.scan() {
            if let Some(value) = doc.get(column) {
                index.insert(value, row_id);
            }
        }
        self.indexes
            .write()
            .insert(column.to_string(), Arc::clone(&index));
        index
    }

    pub fn drop_index(&self, column: &str) -> bool {
        self.indexes.write().remove(column).is_some()
    }

    pub fn index(&self, column: &str) -> Option<Arc<BTreeIndex>> {
        self.indexes.read().get(column).cloned()
    }

    pub fn index_columns(&self) -> Vec<String> {
        self.indexes.read().keys().cloned().collect()
    }

    fn index_row(&self, row_id: Uuid, doc: &Value) {
        for (column, index) in self.indexes.read().iter() {
            if let Some(value) = doc.get(column) {
                index.insert(value, row_id);
            }
        }
    }

    fn deindex_row(&self, row_id: Uuid, doc: &Value) {
        for (column, index) in self.indexes.read().iter() {
            if let Some(value) = doc.get(column) {
                index.remove(value, row_id);
            }
        }
    }

    /// Write through the LSM engine and return the LSN the write landed at.
    fn write_row(&self, row_id: Uuid, doc: &Value) -> Result<u64> {
        let bytes = bincode::serialize(doc)
            .map_err(|e| CoreError::Serialization(e.to_string()))?;
        self.engine.put(row_id.as_bytes(), &bytes)
    }

    /// Flush Scheduler-owned snapshots for this table (storage + replica
    /// objects), independent of LSM flushing.
    pub fn save_snapshots(&self) -> Result<()> {
        self.storage_object.save_to_disk()?;
        self.replica_object.save_to_disk()?;
        Ok(())
    }
}
