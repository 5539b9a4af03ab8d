//! Manifest
//!
//! Durable record of which SSTables belong to a table's LSM tree and at
//! which level. Every mutation (flush, compaction) writes a new numbered
//! manifest generation file and then atomically renames a `CURRENT` pointer
//! to it — readers that already opened a generation keep a consistent view
//! even while a writer is publishing the next one.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::storage::sstable::SSTableMeta;

const CURRENT_FILE: &str = "CURRENT";

/// On-disk representation of a manifest generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestState {
    pub generation: u64,
    pub next_seqno: u64,
    /// `levels[n]` holds every table at level `n`.
    pub levels: Vec<Vec<ManifestEntry>>,
}

/// A single SSTable's manifest record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub file_name: String,
    pub entry_count: u64,
    pub tombstone_count: u64,
    pub min_key: Vec<u8>,
    pub max_key: Vec<u8>,
    pub file_size: u64,
    pub creation_ts: u64,
    pub level: u8,
    pub seqno: u64,
}

impl From<&SSTableMeta> for ManifestEntry {
    fn from(meta: &SSTableMeta) -> Self {
        Self {
            file_name: meta
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            entry_count: meta.entry_count,
            tombstone_count: meta.tombstone_count,
            min_key: meta.min_key.clone(),
            max_key: meta.max_key.clone(),
            file_size: meta.file_size,
            creation_ts: meta.creation_ts,
            level: meta.level,
            seqno: meta.seqno,
        }
    }
}

impl ManifestEntry {
    pub fn to_meta(&self, dir: &Path) -> SSTableMeta {
        SSTableMeta {
            path: dir.join(&self.file_name),
            entry_count: self.entry_count,
            tombstone_count: self.tombstone_count,
            min_key: self.min_key.clone(),
            max_key: self.max_key.clone(),
            file_size: self.file_size,
            creation_ts: self.creation_ts,
            level: self.level,
            seqno: self.seqno,
        }
    }
}

/// Manages manifest generations for one table's storage directory.
pub struct Manifest {
    dir: PathBuf,
}

impl Manifest {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn generation_path(&self, generation: u64) -> PathBuf {
        self.dir.join(format!("manifest.{generation}.json"))
    }

    /// Load the current manifest state, or a fresh empty one if none exists
    /// yet (first open of a new table).
    pub fn load(&self, max_level: u8) -> Result<ManifestState> {
        let current_path = self.dir.join(CURRENT_FILE);
        if !current_path.exists() {
            return Ok(ManifestState {
                generation: 0,
                next_seqno: 1,
                levels: vec![Vec::new(); max_level as usize + 1],
            });
        }

        let generation_name = fs::read_to_string(&current_path)?;
        let generation_path = self.dir.join(generation_name.trim());
        let bytes = fs::read(&generation_path)?;
        let state: ManifestState = serde_json::from_slice(&bytes)?;
        Ok(state)
    }

    /// Write a new manifest generation and atomically publish it via
    /// `CURRENT`.
    pub fn publish(&self, state: &ManifestState) -> Result<()> {
        let path = self.generation_path(state.generation);
        let bytes = serde_json::to_vec_pretty(state)?;

        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, &bytes)?;
        fs::rename(&tmp_path, &path)?;

        let current_tmp = self.dir.join("CURRENT.tmp");
        fs::write(
            &current_tmp,
            path.file_name()
                .ok_or_else(|| CoreError::Manifest("manifest path has no file name".to_string()))?
                .to_string_lossy()
                .as_bytes(),
        )?;
        fs::rename(&current_tmp, self.dir.join(CURRENT_FILE))?;

        Ok(())
    }
}
