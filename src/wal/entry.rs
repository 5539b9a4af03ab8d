//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries and their on-disk
//! encoding.
//!
//! ## Record format
//! ```text
//! ┌─────────┬─────────┬──────────┬────────┬─────────┬─────────┐
//! │ LSN (8) │Type (1) │ Rsvd (3) │Len (4) │ Payload │ CRC (4) │
//! └─────────┴─────────┴──────────┴────────┴─────────┴─────────┘
//! ```
//! `Payload` is the bincode encoding of `(timestamp, Operation)`. `CRC` is a
//! CRC32 of the payload bytes only, checked on read so a corrupt tail record
//! can be detected and the log truncated at the last good LSN.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Size of the fixed header preceding the payload: lsn(8) + type(1) +
/// reserved(3) + len(4).
pub const HEADER_SIZE: usize = 16;

/// Size of the trailing CRC32.
pub const CRC_SIZE: usize = 4;

/// A single entry in the WAL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing.
    pub lsn: u64,

    /// The operation to perform.
    pub operation: Operation,

    /// Timestamp (unix millis) when entry was created.
    pub timestamp: u64,
}

/// Operations that can be logged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Operation {
    /// Put a key-value pair.
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key (writes a tombstone).
    Delete { key: Vec<u8> },
}

impl Operation {
    /// The type byte recorded in the header, kept for parity with the wire
    /// format even though decoding goes through the bincode payload.
    fn type_byte(&self) -> u8 {
        match self {
            Operation::Put { .. } => 0x01,
            Operation::Delete { .. } => 0x02,
        }
    }
}

impl WalEntry {
    /// Build a new entry with the current wall-clock timestamp.
    pub fn new(lsn: u64, operation: Operation) -> Self {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            lsn,
            operation,
            timestamp,
        }
    }

    /// Serialize this entry to its on-disk record format.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(&(self.timestamp, &self.operation))?;
        let len = payload.len() as u32;

        let mut header = Vec::with_capacity(HEADER_SIZE);
        header.extend_from_slice(&self.lsn.to_le_bytes());
        header.push(self.operation.type_byte());
        header.extend_from_slice(&[0u8; 3]); // reserved
        header.extend_from_slice(&len.to_le_bytes());

        let crc = crc32fast::hash(&payload);

        let mut out = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        out.extend_from_slice(&header);
        out.extend_from_slice(&payload);
        out.extend_from_slice(&crc.to_le_bytes());
        Ok(out)
    }

    /// Deserialize an entry from a full record buffer (header + payload +
    /// crc). Returns [`CoreError::WalCorruption`] if the CRC does not match.
    pub fn deserialize(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE + CRC_SIZE {
            return Err(CoreError::WalCorruption(
                "record shorter than header + crc".to_string(),
            ));
        }

        let lsn = u64::from_le_bytes(buf[0..8].try_into().unwrap());
        let _type_byte = buf[8];
        let len = u32::from_le_bytes(buf[12..16].try_into().unwrap()) as usize;

        if buf.len() != HEADER_SIZE + len + CRC_SIZE {
            return Err(CoreError::WalCorruption(format!(
                "record length mismatch: expected {} bytes, got {}",
                HEADER_SIZE + len + CRC_SIZE,
                buf.len()
            )));
        }

        let payload = &buf[HEADER_SIZE..HEADER_SIZE + len];
        let crc_bytes = &buf[HEADER_SIZE + len..HEADER_SIZE + len + CRC_SIZE];
        let stored_crc = u32::from_le_bytes(crc_bytes.try_into().unwrap());
        let actual_crc = crc32fast::hash(payload);

        if stored_crc != actual_crc {
            return Err(CoreError::WalCorruption(format!(
                "CRC mismatch at lsn {}: stored {:#x}, computed {:#x}",
                lsn, stored_crc, actual_crc
            )));
        }

        let (timestamp, operation): (u64, Operation) = bincode::deserialize(payload)?;

        Ok(Self {
            lsn,
            operation,
            timestamp,
        })
    }
}
