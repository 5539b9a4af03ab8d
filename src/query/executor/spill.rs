//! Spill-to-disk for hash-join builds and sorts that exceed the per-query
//! memory budget. Backed by `tempfile::NamedTempFile`, so a spill file is
//! deleted on drop regardless of how the query exits — success, error, or
//! panic unwind.

use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};

use tempfile::NamedTempFile;

use crate::error::{CoreError, Result};
use crate::query::executor::operator::Row;

/// A partition of rows written to a temp file, read back in one pass.
pub struct SpillPartition {
    file: NamedTempFile,
}

impl SpillPartition {
    pub fn new() -> Result<Self> {
        Ok(Self {
            file: NamedTempFile::new()?,
        })
    }

    /// Append rows, each length-prefixed via bincode.
    pub fn write_rows(&mut self, rows: &[Row]) -> Result<()> {
        let mut writer = BufWriter::new(self.file.as_file_mut());
        for row in rows {
            let bytes = bincode::serialize(row)?;
            writer.write_all(&(bytes.len() as u64).to_le_bytes())?;
            writer.write_all(&bytes)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Read every row back, rewinding first so repeated calls are safe.
    pub fn read_rows(&mut self) -> Result<Vec<Row>> {
        self.file.as_file_mut().seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(self.file.as_file_mut());
        let mut rows = Vec::new();
        let mut len_buf = [0u8; 8];
        loop {
            match reader.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(CoreError::Io(e)),
            }
            let len = u64::from_le_bytes(len_buf) as usize;
            let mut buf = vec![0u8; len];
            reader.read_exact(&mut buf)?;
            rows.push(bincode::deserialize(&buf)?);
        }
        Ok(rows)
    }
}

/// Partitions a row set across `partition_count` spill files by a hash of
/// the join key, for a hash join whose build side doesn't fit in budget.
pub struct SpillSet {
    partitions: Vec<SpillPartition>,
}

impl SpillSet {
    pub fn new(partition_count: usize) -> Result<Self> {
        let mut partitions = Vec::with_capacity(partition_count);
        for _ in 0..partition_count {
            partitions.push(SpillPartition::new()?);
        }
        Ok(Self { partitions })
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Route `rows` into partitions by `key_fn`, appending to each
    /// partition's spill file.
    pub fn distribute(&mut self, rows: Vec<Row>, key_fn: impl Fn(&Row) -> u64) -> Result<()> {
        let mut buckets: Vec<Vec<Row>> = vec![Vec::new(); self.partitions.len()];
        for row in rows {
            let idx = (key_fn(&row) as usize) % self.partitions.len();
            buckets[idx].push(row);
        }
        for (partition, bucket) in self.partitions.iter_mut().zip(buckets) {
            partition.write_rows(&bucket)?;
        }
        Ok(())
    }

    pub fn partition(&mut self, index: usize) -> &mut SpillPartition {
        &mut self.partitions[index]
    }
}
