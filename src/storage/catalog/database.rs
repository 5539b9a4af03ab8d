//! Database: a named collection of tables, persisted as one metadata blob.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{CoreError, Result};

use super::table::Table;

/// Serialized `{name, tables[]}` written to `<db>.meta`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseObject {
    pub name: String,
    pub tables: Vec<String>,
}

/// A database: an ordered set of tables, each backed by its own directory
/// and `Engine`.
pub struct Database {
    name: String,
    dir: PathBuf,
    tables: RwLock<BTreeMap<String, Arc<Table>>>,
}

impl Database {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn meta_path(data_dir: &Path, name: &str) -> PathBuf {
        data_dir.join(format!("{name}.meta"))
    }

    /// Create a brand new, empty database.
    pub fn create(data_dir: &Path, name: &str) -> Result<Self> {
        let dir = data_dir.join(name);
        fs::create_dir_all(&dir)?;

        let db = Self {
            name: name.to_string(),
            dir,
            tables: RwLock::new(BTreeMap::new()),
        };
        db.save_meta(data_dir)?;
        Ok(db)
    }

    /// Load an existing database from its metadata blob and reopen each of
    /// its tables.
    pub fn load(data_dir: &Path, name: &str, base_config: &Config) -> Result<Self> {
        let meta_path = Self::meta_path(data_dir, name);
        let bytes = fs::read(&meta_path)?;
        let object: DatabaseObject = serde_json::from_slice(&bytes)?;

        let dir = data_dir.join(name);
        let mut tables = BTreeMap::new();
        for table_name in &object.tables {
            let table_dir = dir.join(table_name);
            let table = Table::open(&table_dir, table_name, base_config)?;
            tables.insert(table_name.clone(), Arc::new(table));
        }

        Ok(Self {
            name: object.name,
            dir,
            tables: RwLock::new(tables),
        })
    }

    pub fn save_meta(&self, data_dir: &Path) -> Result<()> {
        let object = DatabaseObject {
            name: self.name.clone(),
            tables: self.tables.read().keys().cloned().collect(),
        };
        let bytes = serde_json::to_vec_pretty(&object)?;
        let meta_path = Self::meta_path(data_dir, &self.name);
        let tmp = meta_path.with_extension("meta.tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &meta_path)?;
        Ok(())
    }

    pub fn create_table(&self, name: &str, base_config: &Config) -> Result<Arc<Table>> {
        let mut tables = self.tables.write();
        if tables.contains_key(name) {
            return Err(CoreError::TableExists(self.name.clone(), name.to_string()));
        }
        let table_dir = self.dir.join(name);
        let table = Arc::new(Table::open(&table_dir, name, base_config)?);
        tables.insert(name.to_string(), Arc::clone(&table));
        Ok(table)
    }

    pub fn drop_table(&self, name: &str) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.remove(name).is_none() {
            return Err(CoreError::TableNotFound(self.name.clone(), name.to_string()));
        }
        let table_dir = self.dir.join(name);
        let _ = fs::remove_dir_all(table_dir);
        Ok(())
    }

    pub fn table(&self, name: &str) -> Option<Arc<Table>> {
        self.tables.read().get(name).cloned()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }

    pub fn tables(&self) -> Vec<Arc<Table>> {
        self.tables.read().values().cloned().collect()
    }
}
