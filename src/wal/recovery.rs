//! WAL Recovery
//!
//! Handles crash recovery by replaying the WAL: read every valid record in
//! order, and when a record's CRC fails to validate (or the file ends
//! mid-record), stop there and report a truncation instead of treating it as
//! a hard failure. A torn tail write is an expected crash artifact, not
//! corruption of the log as a whole.

use std::fs::{File, OpenOptions};
use std::io::Read;
use std::path::Path;

use crate::error::Result;
use super::entry::{CRC_SIZE, HEADER_SIZE};
use super::WalEntry;

/// Handles WAL recovery after crash.
pub struct WalRecovery;

/// Result of a recovery operation.
#[derive(Debug)]
pub struct RecoveryResult {
    /// Number of entries successfully recovered.
    pub entries_recovered: u64,

    /// Number of corrupted entries skipped.
    pub entries_corrupted: u64,

    /// Last valid LSN.
    pub last_lsn: u64,

    /// Whether the WAL was truncated (partial writes removed).
    pub was_truncated: bool,
}

/// Outcome of scanning a WAL file from the start.
struct ScanResult {
    entries: Vec<WalEntry>,
    corrupted: u64,
    /// Byte offset of the first unreadable record (end of valid data).
    valid_end: u64,
    file_size: u64,
}

fn scan(path: &Path) -> Result<ScanResult> {
    let mut file = File::open(path)?;
    let file_size = file.metadata()?.len();

    let mut entries = Vec::new();
    let mut corrupted = 0u64;
    let mut position = 0u64;

    loop {
        if position + HEADER_SIZE as u64 > file_size {
            // Partial header at EOF: an in-progress write, not corruption.
            break;
        }

        let mut header = [0u8; HEADER_SIZE];
        file.read_exact(&mut header)?;

        let len = u32::from_le_bytes(header[12..16].try_into().unwrap()) as u64;
        let record_len = HEADER_SIZE as u64 + len + CRC_SIZE as u64;

        if position + record_len > file_size {
            // Partial record at EOF.
            break;
        }

        let mut rest = vec![0u8; (record_len - HEADER_SIZE as u64) as usize];
        file.read_exact(&mut rest)?;

        let mut full = Vec::with_capacity(record_len as usize);
        full.extend_from_slice(&header);
        full.extend_from_slice(&rest);

        match WalEntry::deserialize(&full) {
            Ok(entry) => {
                entries.push(entry);
                position += record_len;
            }
            Err(_) => {
                // Bad CRC on a complete-length record: the tail is corrupt.
                // Stop here; everything before `position` is good.
                corrupted += 1;
                break;
            }
        }
    }

    Ok(ScanResult {
        entries,
        corrupted,
        valid_end: position,
        file_size,
    })
}

impl WalRecovery {
    /// Recover entries from a WAL file.
    ///
    /// Reads all valid entries, truncates the file at the last good record
    /// if a partial or corrupt tail is found, and returns the entries plus a
    /// summary for the caller to log.
    pub fn recover(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let scan_result = scan(path)?;
        let last_lsn = scan_result.entries.last().map(|e| e.lsn).unwrap_or(0);
        let was_truncated = scan_result.valid_end < scan_result.file_size;

        if was_truncated {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(scan_result.valid_end)?;
            file.sync_all()?;
        }

        let entries_recovered = scan_result.entries.len() as u64;
        Ok((
            scan_result.entries,
            RecoveryResult {
                entries_recovered,
                entries_corrupted: scan_result.corrupted,
                last_lsn,
                was_truncated,
            },
        ))
    }

    /// Verify integrity of a WAL file without modifying it.
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        let scan_result = scan(path)?;
        let last_lsn = scan_result.entries.last().map(|e| e.lsn).unwrap_or(0);
        Ok(RecoveryResult {
            entries_recovered: scan_result.entries.len() as u64,
            entries_corrupted: scan_result.corrupted,
            last_lsn,
            was_truncated: scan_result.valid_end < scan_result.file_size,
        })
    }
}
