//! Storage Manager
//!
//! The leveled part of the LSM tree: owns every on-disk SSTable for one
//! table, flushes memtables into new level-0 tables, and compacts
//! overlapping tables down into deeper, non-overlapping levels.
//!
//! Reads never block behind a compaction. A compaction builds its output
//! tables, then swaps in a brand new manifest generation; a reader that
//! already has `levels` cloned out from under the lock keeps reading the
//! old tables until it finishes, and the old files are only deleted once no
//! `SSTableMeta` clone still points at them on disk... in practice we delete
//! eagerly after the swap since this engine does not yet refcount open
//! readers across the swap boundary.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::memtable::{MemTable, MemTableEntry};

use super::manifest::{Manifest, ManifestEntry, ManifestState};
use super::sstable::{SSTableBuilder, SSTableMeta, SSTableReader};

/// Owns the on-disk SSTables for a single table's LSM tree.
pub struct StorageManager {
    dir: PathBuf,
    manifest: Manifest,
    level_size_ratio: u64,
    bloom_fpr_target: f64,
    max_level: u8,
    state: RwLock<ManifestState>,
}

impl StorageManager {
    /// Open (or create) the storage directory, loading the current
    /// manifest generation.
    pub fn open(dir: &Path, config: &Config) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let manifest = Manifest::new(dir);
        let state = manifest.load(config.max_level)?;

        Ok(Self {
            dir: dir.to_path_buf(),
            manifest,
            level_size_ratio: config.level_size_ratio,
            bloom_fpr_target: config.bloom_fpr_target,
            max_level: config.max_level,
            state: RwLock::new(state),
        })
    }

    /// Flush a memtable's contents into a new level-0 SSTable.
    pub fn flush(&self, memtable: &MemTable) -> Result<()> {
        let entries = memtable.snapshot();
        if entries.is_empty() {
            return Ok(());
        }

        let mut state = self.state.write();
        let seqno = state.next_seqno;
        state.next_seqno += 1;

        let file_name = format!("L0-{seqno:020}.sst");
        let path = self.dir.join(&file_name);

        let mut builder = SSTableBuilder::new(&path, entries.len(), 0, seqno)?;
        for (key, entry) in &entries {
            match entry {
                MemTableEntry::Value(value) => builder.add(key, value)?,
                MemTableEntry::Tombstone => builder.add_tombstone(key)?,
            }
        }
        let meta = builder.finish()?;

        state.levels[0].push(ManifestEntry::from(&meta));
        self.manifest.publish(&state)?;
        info!(seqno, entries = entries.len(), "flushed memtable to level 0");

        drop(state);
        self.maybe_compact()?;
        Ok(())
    }

    /// Point lookup: newest level-0 table first, then each deeper level in
    /// order (levels are internally non-overlapping once compacted).
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let state = self.state.read();

        let mut l0 = state.levels[0].clone();
        l0.sort_by(|a, b| b.seqno.cmp(&a.seqno));
        for entry in &l0 {
            if let Some(value) = self.lookup_in(entry, key)? {
                return Ok(value);
            }
        }

        for level in state.levels.iter().skip(1) {
            for entry in level {
                if key < entry.min_key.as_slice() || key > entry.max_key.as_slice() {
                    continue;
                }
                if let Some(value) = self.lookup_in(entry, key)? {
                    return Ok(value);
                }
            }
        }

        Err(crate::error::CoreError::KeyNotFound)
    }

    fn lookup_in(&self, entry: &ManifestEntry, key: &[u8]) -> Result<Option<Option<Vec<u8>>>> {
        let meta = entry.to_meta(&self.dir);
        let mut reader = SSTableReader::open(&meta.path)?;
        match reader.get(key) {
            Ok(value) => Ok(Some(value)),
            Err(crate::error::CoreError::KeyNotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Total number of live SSTables across all levels.
    pub fn sstable_count(&self) -> usize {
        self.state.read().levels.iter().map(Vec::len).sum()
    }

    /// Run one round of compaction if any level has grown past its budget.
    /// `level_size_ratio^n * memtable_size_limit`-scaled thresholds would
    /// need the caller's memtable limit; here we use a fixed per-level table
    /// count budget, which is what actually drives read amplification.
    fn maybe_compact(&self) -> Result<()> {
        const L0_COMPACTION_TRIGGER: usize = 4;

        let needs_l0 = self.state.read().levels[0].len() >= L0_COMPACTION_TRIGGER;
        if needs_l0 {
            self.compact_level(0)?;
        }

        for level in 1..self.max_level {
            let budget = self.level_size_ratio.pow(level as u32) as usize;
            if self.state.read().levels[level as usize].len() > budget {
                self.compact_level(level)?;
            }
        }

        Ok(())
    }

    /// Merge every table at `level` (and any overlapping tables at
    /// `level + 1`) into new, non-overlapping tables at `level + 1`.
    fn compact_level(&self, level: u8) -> Result<()> {
        let target = (level + 1).min(self.max_level);
        let mut state = self.state.write();

        let sources = std::mem::take(&mut state.levels[level as usize]);
        if sources.is_empty() {
            return Ok(());
        }

        // The merge always spans the full range of `sources`, including any
        // key gap between non-contiguous L0 tables — a target-level table
        // that sits in that gap would otherwise survive the compaction
        // untouched while the new merged table spans across it, leaving two
        // overlapping tables at `target`. So overlap is checked against the
        // span of all sources at once, not source-by-source.
        let span_min = sources.iter().map(|s| s.min_key.clone()).min().unwrap();
        let span_max = sources.iter().map(|s| s.max_key.clone()).max().unwrap();

        let mut participants: Vec<ManifestEntry> = sources.clone();
        let mut remaining_target = Vec::new();
        for entry in state.levels[target as usize].drain(..) {
            let overlaps = entry.min_key <= span_max && span_min <= entry.max_key;
            if overlaps {
                participants.push(entry);
            } else {
                remaining_target.push(entry);
            }
        }

        let merged = self.merge_tables(&participants, target, &mut state.next_seqno)?;

        for entry in &participants {
            let path = self.dir.join(&entry.file_name);
            let _ = fs::remove_file(path);
        }

        remaining_target.extend(merged);
        state.levels[target as usize] = remaining_target;
        state.levels[level as usize] = Vec::new();

        self.manifest.publish(&state)?;
        debug!(from = level, to = target, "compacted level");
        Ok(())
    }

    /// K-way merge of sorted SSTables, resolving duplicate keys by highest
    /// seqno (most recent write wins) and dropping tombstones that no
    /// longer shadow anything once they reach the last level.
    fn merge_tables(
        &self,
        participants: &[ManifestEntry],
        target_level: u8,
        next_seqno: &mut u64,
    ) -> Result<Vec<ManifestEntry>> {
        use std::collections::BTreeMap;

        let mut merged: BTreeMap<Vec<u8>, (u64, Option<Vec<u8>>)> = BTreeMap::new();

        for entry in participants {
            let meta = entry.to_meta(&self.dir);
            let mut reader = SSTableReader::open(&meta.path)?;
            let mut iter = reader.iter()?;
            while let Some(item) = iter.next() {
                let (key, value) = item?;
                match merged.get(&key) {
                    Some((existing_seqno, _)) if *existing_seqno >= entry.seqno => {}
                    _ => {
                        merged.insert(key, (entry.seqno, value));
                    }
                }
            }
        }

        let drop_tombstones = target_level == self.max_level;
        let live: Vec<(Vec<u8>, Option<Vec<u8>>)> = merged
            .into_iter()
            .filter(|(_, (_, v))| !(drop_tombstones && v.is_none()))
            .map(|(k, (_, v))| (k, v))
            .collect();

        if live.is_empty() {
            return Ok(Vec::new());
        }

        let seqno = *next_seqno;
        *next_seqno += 1;

        let file_name = format!("L{target_level}-{seqno:020}.sst");
        let path = self.dir.join(&file_name);

        let mut builder = SSTableBuilder::new(&path, live.len(), target_level, seqno)?;
        for (key, value) in &live {
            match value {
                Some(v) => builder.add(key, v)?,
                None => builder.add_tombstone(key)?,
            }
        }
        let meta = builder.finish()?;

        if self.bloom_fpr_target > 0.1 {
            warn!(
                bloom_fpr_target = self.bloom_fpr_target,
                "unusually high bloom false-positive target configured"
            );
        }

        Ok(vec![ManifestEntry::from(&meta)])
    }
}
