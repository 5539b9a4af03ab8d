//! Error types for the storage and persistence core.
//!
//! Provides a unified error type for every operation in the crate. Kinds map
//! to the error taxonomy in the design: invariant violations panic instead of
//! appearing here; everything recoverable gets a variant.

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Unified error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    #[error("WAL write failed: {0}")]
    WalWrite(String),

    // -------------------------------------------------------------------------
    // Storage / LSM Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Key not found")]
    KeyNotFound,

    #[error("Manifest error: {0}")]
    Manifest(String),

    // -------------------------------------------------------------------------
    // Catalog Errors
    // -------------------------------------------------------------------------
    #[error("Database not found: {0}")]
    DatabaseNotFound(String),

    #[error("Database already exists: {0}")]
    DatabaseExists(String),

    #[error("Table not found: {0}.{1}")]
    TableNotFound(String, String),

    #[error("Table already exists: {0}.{1}")]
    TableExists(String, String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Network / Replication Errors
    // -------------------------------------------------------------------------
    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Replication conflict: {0}")]
    ReplicationConflict(String),

    #[error("No placement available: {0}")]
    PlacementUnavailable(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    // -------------------------------------------------------------------------
    // Scheduler
    // -------------------------------------------------------------------------
    /// Concurrency reject, not treated as an error by callers: another
    /// persist is already in flight. Kept as a variant so `?` still works;
    /// the scheduler surfaces this as a non-error status instead
    /// (`scheduler::PersistOutcome::Skipped`).
    #[error("Scheduler is already persisting")]
    SchedulerBusy,

    // -------------------------------------------------------------------------
    // Query Errors
    // -------------------------------------------------------------------------
    #[error("Query planning error: {0}")]
    Plan(String),

    #[error("Query execution error: {0}")]
    Execution(String),

    #[error("Syntax error: {0}")]
    Syntax(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Concurrency Errors
    // -------------------------------------------------------------------------
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

impl From<bincode::Error> for CoreError {
    fn from(e: bincode::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}
