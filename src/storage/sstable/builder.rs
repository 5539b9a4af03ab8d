//! SSTable Builder
//!
//! Writes sorted key-value entries to a new SSTable file: data blocks, a
//! bloom filter, a sparse index, and a footer. Call `add`/`add_tombstone` in
//! strictly ascending key order, then `finish` to fsync and atomically
//! install the file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};

use super::{BloomFilter, SSTableMeta, ENTRIES_PER_BLOCK, HEADER_SIZE, MAGIC, TOMBSTONE_MARKER, VERSION};

/// Builder for creating new SSTables from sorted entries.
pub struct SSTableBuilder {
    /// Final destination path (the file is built under a `.tmp` path and
    /// atomically renamed into place on `finish`).
    final_path: PathBuf,
    tmp_path: PathBuf,
    writer: BufWriter<File>,
    entry_count: u64,
    tombstone_count: u64,
    current_offset: u64,
    /// Sparse index: (first key of block, block start offset).
    sparse_index: Vec<(Vec<u8>, u64)>,
    entries_in_block: u64,
    min_key: Option<Vec<u8>>,
    max_key: Option<Vec<u8>>,
    data_hasher: crc32fast::Hasher,
    bloom: BloomFilter,
    level: u8,
    seqno: u64,
}

impl SSTableBuilder {
    /// Create a new builder. `expected_entries` sizes the bloom filter;
    /// `level`/`seqno` are recorded in the footer for the LSM engine's
    /// manifest.
    pub fn new(path: &Path, expected_entries: usize, level: u8, seqno: u64) -> Result<Self> {
        let tmp_path = path.with_extension("sst.tmp");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;

        let mut writer = BufWriter::new(file);

        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&0u64.to_le_bytes())?; // entry count placeholder

        Ok(Self {
            final_path: path.to_path_buf(),
            tmp_path,
            writer,
            entry_count: 0,
            tombstone_count: 0,
            current_offset: HEADER_SIZE,
            sparse_index: Vec::new(),
            entries_in_block: 0,
            min_key: None,
            max_key: None,
            data_hasher: crc32fast::Hasher::new(),
            bloom: BloomFilter::new(expected_entries.max(1), 0.01),
            level,
            seqno,
        })
    }

    /// Add a key-value pair (must be called in sorted key order).
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.write_entry(key, Some(value))
    }

    /// Add a tombstone (must be called in sorted key order).
    pub fn add_tombstone(&mut self, key: &[u8]) -> Result<()> {
        self.write_entry(key, None)
    }

    fn write_entry(&mut self, key: &[u8], value: Option<&[u8]>) -> Result<()> {
        if self.entries_in_block == 0 {
            self.sparse_index.push((key.to_vec(), self.current_offset));
        }

        if self.min_key.is_none() {
            self.min_key = Some(key.to_vec());
        }
        self.max_key = Some(key.to_vec());
        self.bloom.insert(key);

        let key_len = key.len() as u32;
        let val_len = match value {
            Some(v) => v.len() as u32,
            None => TOMBSTONE_MARKER,
        };

        let key_len_bytes = key_len.to_le_bytes();
        let val_len_bytes = val_len.to_le_bytes();

        self.writer.write_all(&key_len_bytes)?;
        self.writer.write_all(&val_len_bytes)?;
        self.writer.write_all(key)?;

        self.data_hasher.update(&key_len_bytes);
        self.data_hasher.update(&val_len_bytes);
        self.data_hasher.update(key);

        let mut entry_size: u64 = 8 + key.len() as u64;

        if let Some(v) = value {
            self.writer.write_all(v)?;
            self.data_hasher.update(v);
            entry_size += v.len() as u64;
        } else {
            self.tombstone_count += 1;
        }

        self.current_offset += entry_size;
        self.entry_count += 1;
        self.entries_in_block = (self.entries_in_block + 1) % ENTRIES_PER_BLOCK;

        Ok(())
    }

    /// Finish building: write the bloom filter, sparse index, and footer;
    /// fsync; atomically rename into place.
    pub fn finish(mut self) -> Result<SSTableMeta> {
        let data_end_offset = self.current_offset;
        let data_crc = self.data_hasher.finalize();

        let bloom_offset = self.current_offset;
        self.bloom.write_to(&mut self.writer)?;
        self.current_offset += self.bloom.serialized_size();

        let index_offset = self.current_offset;
        for (key, offset) in &self.sparse_index {
            let key_len = key.len() as u32;
            self.writer.write_all(&key_len.to_le_bytes())?;
            self.writer.write_all(&offset.to_le_bytes())?;
            self.writer.write_all(key)?;
        }

        let creation_ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let min_key = self.min_key.clone().unwrap_or_default();
        let max_key = self.max_key.clone().unwrap_or_default();

        let mut footer = Vec::new();
        footer.extend_from_slice(&HEADER_SIZE.to_le_bytes());
        footer.extend_from_slice(&data_end_offset.to_le_bytes());
        footer.extend_from_slice(&data_crc.to_le_bytes());
        footer.extend_from_slice(&bloom_offset.to_le_bytes());
        footer.extend_from_slice(&index_offset.to_le_bytes());
        footer.extend_from_slice(&(min_key.len() as u32).to_le_bytes());
        footer.extend_from_slice(&min_key);
        footer.extend_from_slice(&(max_key.len() as u32).to_le_bytes());
        footer.extend_from_slice(&max_key);
        footer.extend_from_slice(&self.entry_count.to_le_bytes());
        footer.extend_from_slice(&self.tombstone_count.to_le_bytes());
        footer.extend_from_slice(&creation_ts.to_le_bytes());
        footer.push(self.level);
        footer.extend_from_slice(&self.seqno.to_le_bytes());

        self.writer.write_all(&footer)?;
        self.writer.write_all(&(footer.len() as u32).to_le_bytes())?;
        self.writer.flush()?;

        let mut file = self
            .writer
            .into_inner()
            .map_err(|e| CoreError::Storage(format!("failed to flush SSTable: {}", e)))?;

        file.seek(SeekFrom::Start(6))?; // after magic + version
        file.write_all(&self.entry_count.to_le_bytes())?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&self.tmp_path, &self.final_path)?;
        let file_size = std::fs::metadata(&self.final_path)?.len();

        Ok(SSTableMeta {
            path: self.final_path,
            entry_count: self.entry_count,
            tombstone_count: self.tombstone_count,
            min_key,
            max_key,
            file_size,
            creation_ts,
            level: self.level,
            seqno: self.seqno,
        })
    }
}
