//! Engine Module
//!
//! The per-table LSM storage primitive: a byte-keyed WAL + MemTable +
//! leveled SSTable store. `storage::catalog::Table` is built on top of one
//! `Engine` per table, using the row-id as the key and a serialized
//! document as the value.
//!
//! ## Responsibilities
//! - Coordinate WAL, MemTable, and the leveled StorageManager
//! - Handle concurrent read/write access
//! - Trigger flushes when the MemTable is full
//! - Replay the WAL and make recovered data durable again on startup

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::memtable::{MemTable, MemTableEntry};
use crate::storage::StorageManager;
use crate::wal::{Operation, WalRecovery, WalWriter};

/// The core storage engine for one byte-keyed keyspace.
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (put/delete/flush): serialized by `write_lock` — only one
///   write operation at a time, acquiring write_lock → WAL → memtable →
///   storage in that order.
/// - **Reads** (get): concurrent at the MemTable level (internal RwLock);
///   StorageManager currently takes its own lock per SSTable lookup since
///   `SSTableReader::get` needs `&mut self` to seek the file.
pub struct Engine {
    config: Config,
    storage_dir: PathBuf,
    wal: Mutex<WalWriter>,
    memtable: MemTable,
    storage: StorageManager,
    write_lock: Mutex<()>,
}

impl Engine {
    const WAL_FILENAME: &'static str = "wal.log";
    const SSTABLE_DIR: &'static str = "sstables";

    /// Open or create an engine with the given config.
    ///
    /// On startup: create the data directory, load existing SSTables,
    /// replay and truncate the WAL if one exists, and flush any recovered
    /// entries immediately so they're durable before the WAL is reused.
    pub fn open(config: Config) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;

        let storage_dir = config.data_dir.join(Self::SSTABLE_DIR);
        let wal_path = config.data_dir.join(Self::WAL_FILENAME);

        fs::create_dir_all(&storage_dir)?;

        let storage = StorageManager::open(&storage_dir, &config)?;
        let memtable = MemTable::new();

        let wal = if wal_path.exists() {
            let (entries, recovery_result) = WalRecovery::recover(&wal_path)?;

            if recovery_result.entries_recovered > 0 || recovery_result.entries_corrupted > 0 {
                info!(
                    recovered = recovery_result.entries_recovered,
                    corrupted = recovery_result.entries_corrupted,
                    last_lsn = recovery_result.last_lsn,
                    "WAL recovery complete"
                );
            }
            if recovery_result.was_truncated {
                warn!("WAL tail was torn and has been truncated to the last good record");
            }

            for entry in entries {
                match entry.operation {
                    Operation::Put { key, value } => {
                        memtable.put(key, value);
                    }
                    Operation::Delete { key } => {
                        memtable.delete(key);
                    }
                }
            }

            if !memtable.is_empty() {
                info!(
                    entries = memtable.entry_count(),
                    "flushing recovered entries to SSTable"
                );
                storage.flush(&memtable)?;
                memtable.clear();
            }

            WalWriter::open(&wal_path, config.wal_sync_strategy)?
        } else {
            WalWriter::open(&wal_path, config.wal_sync_strategy)?
        };

        Ok(Self {
            config,
            storage_dir,
            wal: Mutex::new(wal),
            memtable,
            storage,
            write_lock: Mutex::new(()),
        })
    }

    /// Open with a path (convenience method) using default config.
    pub fn open_path(path: &Path) -> Result<Self> {
        let mut config = Config::default();
        config.data_dir = path.to_path_buf();
        Self::open(config)
    }

    /// Get a value by key.
    ///
    /// Search order: MemTable (most recent writes), then SSTables newest to
    /// oldest.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(entry) = self.memtable.get(key) {
            return match entry {
                MemTableEntry::Value(value) => Ok(Some(value)),
                MemTableEntry::Tombstone => Ok(None),
            };
        }

        match self.storage.get(key) {
            Ok(value) => Ok(value),
            Err(crate::error::CoreError::KeyNotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Put a key-value pair. Returns the LSN the write was recorded at.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<u64> {
        let _write_guard = self.write_lock.lock().map_err(|e| {
            crate::CoreError::LockPoisoned(format!("write lock poisoned: {}", e))
        })?;

        let lsn = {
            let mut wal = self.wal.lock().map_err(|e| {
                crate::CoreError::LockPoisoned(format!("WAL lock poisoned: {}", e))
            })?;

            wal.append(Operation::Put {
                key: key.to_vec(),
                value: value.to_vec(),
            })?
        };

        let new_size = self.memtable.put(key.to_vec(), value.to_vec());

        if new_size >= self.config.memtable_size_limit {
            self.flush_internal()?;
        }

        Ok(lsn)
    }

    /// Delete a key (writes a tombstone). Returns the LSN the delete was
    /// recorded at.
    pub fn delete(&self, key: &[u8]) -> Result<u64> {
        let _write_guard = self.write_lock.lock().map_err(|e| {
            crate::CoreError::LockPoisoned(format!("write lock poisoned: {}", e))
        })?;

        let lsn = {
            let mut wal = self.wal.lock().map_err(|e| {
                crate::CoreError::LockPoisoned(format!("WAL lock poisoned: {}", e))
            })?;

            wal.append(Operation::Delete {
                key: key.to_vec(),
            })?
        };

        let new_size = self.memtable.delete(key.to_vec());

        if new_size >= self.config.memtable_size_limit {
            self.flush_internal()?;
        }

        Ok(lsn)
    }

    /// Force a flush regardless of memtable size.
    pub fn flush(&self) -> Result<()> {
        let _write_guard = self.write_lock.lock().map_err(|e| {
            crate::CoreError::LockPoisoned(format!("write lock poisoned: {}", e))
        })?;

        self.flush_internal()
    }

    fn flush_internal(&self) -> Result<()> {
        if self.memtable.is_empty() {
            return Ok(());
        }

        self.storage.flush(&self.memtable)?;
        self.memtable.clear();

        {
            let mut wal = self.wal.lock().map_err(|e| {
                crate::CoreError::LockPoisoned(format!("WAL lock poisoned: {}", e))
            })?;
            wal.truncate()?;
        }

        Ok(())
    }

    /// Close the engine gracefully: flush any pending data and sync the WAL.
    pub fn close(self) -> Result<()> {
        if !self.memtable.is_empty() {
            self.flush()?;
        }

        {
            let mut wal = self.wal.lock().map_err(|e| {
                crate::CoreError::LockPoisoned(format!("WAL lock poisoned: {}", e))
            })?;
            wal.sync()?;
        }

        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn memtable_size(&self) -> usize {
        self.memtable.size()
    }

    pub fn memtable_entry_count(&self) -> usize {
        self.memtable.entry_count()
    }

    pub fn sstable_count(&self) -> usize {
        self.storage.sstable_count()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
