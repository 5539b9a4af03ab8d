//! SSTable Reader
//!
//! Opens SSTable files, loads the bloom filter and sparse index into memory,
//! and resolves point lookups with at most one data-block scan.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{CoreError, Result};

use super::iterator::SSTableIterator;
use super::{BloomFilter, ENTRIES_PER_BLOCK, HEADER_SIZE, MAGIC, TOMBSTONE_MARKER, VERSION};

/// Reader for SSTable files with an in-memory bloom filter and sparse index.
pub struct SSTableReader {
    pub(super) file: BufReader<File>,
    bloom: BloomFilter,
    /// Sparse index: first key of each block → block start offset.
    sparse_index: BTreeMap<Vec<u8>, u64>,
    entry_count: u64,
    min_key: Vec<u8>,
    max_key: Vec<u8>,
    /// Offset where the data section ends (start of the bloom section).
    pub(super) data_end_offset: u64,
}

impl SSTableReader {
    /// Open an SSTable for reading, loading its bloom filter and index.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;

        if &header[0..4] != MAGIC {
            return Err(CoreError::Storage(format!(
                "invalid SSTable magic: {:?}",
                &header[0..4]
            )));
        }

        let version = u16::from_le_bytes(header[4..6].try_into().unwrap());
        if version != VERSION {
            return Err(CoreError::Storage(format!(
                "unsupported SSTable version: {}",
                version
            )));
        }

        file.seek(SeekFrom::End(-4))?;
        let mut footer_len_buf = [0u8; 4];
        file.read_exact(&mut footer_len_buf)?;
        let footer_len = u32::from_le_bytes(footer_len_buf) as u64;

        if footer_len + 4 > file_size {
            return Err(CoreError::Storage(
                "SSTable footer length exceeds file size".to_string(),
            ));
        }

        file.seek(SeekFrom::End(-(footer_len as i64 + 4)))?;
        let mut footer = vec![0u8; footer_len as usize];
        file.read_exact(&mut footer)?;

        let mut pos = 0usize;
        let read_u64 = |buf: &[u8], pos: &mut usize| -> u64 {
            let v = u64::from_le_bytes(buf[*pos..*pos + 8].try_into().unwrap());
            *pos += 8;
            v
        };
        let read_u32 = |buf: &[u8], pos: &mut usize| -> u32 {
            let v = u32::from_le_bytes(buf[*pos..*pos + 4].try_into().unwrap());
            *pos += 4;
            v
        };

        let _data_offset = read_u64(&footer, &mut pos);
        let data_end_offset = read_u64(&footer, &mut pos);
        let _data_crc = read_u32(&footer, &mut pos);
        let bloom_offset = read_u64(&footer, &mut pos);
        let index_offset = read_u64(&footer, &mut pos);

        let min_key_len = read_u32(&footer, &mut pos) as usize;
        let min_key = footer[pos..pos + min_key_len].to_vec();
        pos += min_key_len;

        let max_key_len = read_u32(&footer, &mut pos) as usize;
        let max_key = footer[pos..pos + max_key_len].to_vec();
        pos += max_key_len;

        let entry_count = read_u64(&footer, &mut pos);
        let _tombstone_count = read_u64(&footer, &mut pos);
        let _creation_ts = read_u64(&footer, &mut pos);

        file.seek(SeekFrom::Start(bloom_offset))?;
        let bloom = BloomFilter::read_from(&mut file)?;

        let index_block_len = file_size - footer_len - 4 - index_offset;
        file.seek(SeekFrom::Start(index_offset))?;
        let mut index_data = vec![0u8; index_block_len as usize];
        file.read_exact(&mut index_data)?;

        let mut sparse_index = BTreeMap::new();
        let mut ipos = 0usize;
        while ipos < index_data.len() {
            if ipos + 4 > index_data.len() {
                break;
            }
            let key_len =
                u32::from_le_bytes(index_data[ipos..ipos + 4].try_into().unwrap()) as usize;
            ipos += 4;

            if ipos + 8 > index_data.len() {
                break;
            }
            let offset = u64::from_le_bytes(index_data[ipos..ipos + 8].try_into().unwrap());
            ipos += 8;

            if ipos + key_len > index_data.len() {
                break;
            }
            let key = index_data[ipos..ipos + key_len].to_vec();
            ipos += key_len;

            sparse_index.insert(key, offset);
        }

        file.seek(SeekFrom::Start(0))?;

        Ok(Self {
            file: BufReader::new(file),
            bloom,
            sparse_index,
            entry_count,
            min_key,
            max_key,
            data_end_offset,
        })
    }

    /// Get a value by key.
    ///
    /// - `Ok(Some(value))` — key found with a value
    /// - `Ok(None)` — key found but tombstoned (deleted)
    /// - `Err(KeyNotFound)` — key definitely absent from this table
    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if !self.bloom.may_contain(key) {
            return Err(CoreError::KeyNotFound);
        }
        if !self.might_contain(key) {
            return Err(CoreError::KeyNotFound);
        }

        let block_offset = match self.sparse_index.range(..=key.to_vec()).next_back() {
            Some((_, &offset)) => offset,
            None => return Err(CoreError::KeyNotFound),
        };

        self.file.seek(SeekFrom::Start(block_offset))?;

        for _ in 0..ENTRIES_PER_BLOCK {
            if self.file.stream_position()? >= self.data_end_offset {
                break;
            }

            let mut header = [0u8; 8];
            if self.file.read_exact(&mut header).is_err() {
                break;
            }
            let key_len = u32::from_le_bytes(header[0..4].try_into().unwrap()) as usize;
            let val_len = u32::from_le_bytes(header[4..8].try_into().unwrap());

            let mut entry_key = vec![0u8; key_len];
            self.file.read_exact(&mut entry_key)?;

            if entry_key.as_slice() == key {
                if val_len == TOMBSTONE_MARKER {
                    return Ok(None);
                }
                let mut value = vec![0u8; val_len as usize];
                self.file.read_exact(&mut value)?;
                return Ok(Some(value));
            }

            if entry_key.as_slice() > key {
                break;
            }

            if val_len == TOMBSTONE_MARKER {
                continue;
            }
            self.file.seek(SeekFrom::Current(val_len as i64))?;
        }

        Err(CoreError::KeyNotFound)
    }

    /// Total entry count (live + tombstoned).
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Smallest key in this table.
    pub fn min_key(&self) -> &[u8] {
        &self.min_key
    }

    /// Largest key in this table.
    pub fn max_key(&self) -> &[u8] {
        &self.max_key
    }

    /// Quick range check: `false` only if `key` is definitely outside
    /// `[min_key, max_key]`.
    pub fn might_contain(&self, key: &[u8]) -> bool {
        if self.min_key.is_empty() && self.max_key.is_empty() && self.entry_count == 0 {
            return false;
        }
        key >= self.min_key.as_slice() && key <= self.max_key.as_slice()
    }

    /// Iterate over all entries in key order (used by compaction).
    pub fn iter(&mut self) -> Result<SSTableIterator<'_>> {
        SSTableIterator::new(&mut self.file, self.data_end_offset)
    }
}
