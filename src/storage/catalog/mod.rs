//! Catalog
//!
//! The process-wide registry of databases and tables. This is the "Storage"
//! component from the design: it owns placement decisions' targets (via
//! each table's `TableReplicaObject`) and is what the Storage Scheduler
//! walks to snapshot everything to disk.

mod database;
mod row;
mod table;

pub use database::{Database, DatabaseObject};
pub use row::{RowRecord, TableStorageObject};
pub use table::{Placement, Table, TableReplicaObject};

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::Config;
use crate::error::{CoreError, Result};

/// Owns every database on this node.
pub struct Catalog {
    data_dir: PathBuf,
    config: Config,
    databases: RwLock<BTreeMap<String, Arc<Database>>>,
}

impl Catalog {
    /// Open the catalog, loading every `<db>.meta` file found in
    /// `config.data_dir`.
    pub fn open(config: Config) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;

        let mut databases = BTreeMap::new();
        for entry in fs::read_dir(&config.data_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("meta") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let db = Database::load(&config.data_dir, stem, &config)?;
            databases.insert(stem.to_string(), Arc::new(db));
        }

        Ok(Self {
            data_dir: config.data_dir.clone(),
            config,
            databases: RwLock::new(databases),
        })
    }

    pub fn create_database(&self, name: &str) -> Result<()> {
        let mut databases = self.databases.write();
        if databases.contains_key(name) {
            return Err(CoreError::DatabaseExists(name.to_string()));
        }
        let db = Database::create(&self.data_dir, name)?;
        databases.insert(name.to_string(), Arc::new(db));
        Ok(())
    }

    pub fn drop_database(&self, name: &str) -> Result<()> {
        let mut databases = self.databases.write();
        if databases.remove(name).is_none() {
            return Err(CoreError::DatabaseNotFound(name.to_string()));
        }
        let meta_path = self.data_dir.join(format!("{name}.meta"));
        let _ = fs::remove_file(meta_path);
        let _ = fs::remove_dir_all(self.data_dir.join(name));
        Ok(())
    }

    pub fn database(&self, name: &str) -> Option<Arc<Database>> {
        self.databases.read().get(name).cloned()
    }

    pub fn database_names(&self) -> Vec<String> {
        self.databases.read().keys().cloned().collect()
    }

    pub fn databases(&self) -> Vec<Arc<Database>> {
        self.databases.read().values().cloned().collect()
    }

    pub fn create_table(&self, db: &str, table: &str) -> Result<Arc<Table>> {
        let database = self
            .database(db)
            .ok_or_else(|| CoreError::DatabaseNotFound(db.to_string()))?;
        let created = database.create_table(table, &self.config)?;
        database.save_meta(&self.data_dir)?;
        Ok(created)
    }

    pub fn drop_table(&self, db: &str, table: &str) -> Result<()> {
        let database = self
            .database(db)
            .ok_or_else(|| CoreError::DatabaseNotFound(db.to_string()))?;
        database.drop_table(table)?;
        database.save_meta(&self.data_dir)?;
        Ok(())
    }

    pub fn table(&self, db: &str, table: &str) -> Result<Arc<Table>> {
        let database = self
            .database(db)
            .ok_or_else(|| CoreError::DatabaseNotFound(db.to_string()))?;
        database
            .table(table)
            .ok_or_else(|| CoreError::TableNotFound(db.to_string(), table.to_string()))
    }

    /// Snapshot every database's metadata and every table's storage and
    /// replica objects, in that order. Used by the Storage Scheduler.
    pub fn save_all(&self) -> Result<()> {
        for database in self.databases() {
            database.save_meta(&self.data_dir)?;
            for table in database.tables() {
                table.save_snapshots()?;
            }
        }
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
