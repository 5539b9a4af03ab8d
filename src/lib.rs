//! # serengeti-core
//!
//! A distributed key-document database with:
//! - Write-Ahead Logging (WAL) for durability and crash recovery
//! - An LSM-tree storage engine (MemTable → leveled SSTables)
//! - Row-level replication across primary/secondary placements
//! - A cost-based query planner and operator-DAG executor
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                              │
//! │                  (Multiple Clients)                          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │            Query Planner / Executor (Runtime)                │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┼────────────┬──────────────┐
//!          │            │            │              │
//!          ▼            ▼            ▼              ▼
//!   ┌─────────────┐ ┌─────────┐ ┌──────────┐ ┌──────────────┐
//!   │  Catalog    │ │  LSM    │ │ Replica-  │ │  Scheduler / │
//!   │ (Databases) │ │ Engine  │ │  tion     │ │  Reshuffle   │
//!   └─────────────┘ └─────────┘ └──────────┘ └──────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod wal;
pub mod memtable;
pub mod storage;
pub mod index;
pub mod replication;
pub mod scheduler;
pub mod reshuffle;
pub mod statistics;
pub mod query;
pub mod network;
pub mod protocol;
pub mod runtime;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{CoreError, Result};
pub use config::Config;
pub use engine::Engine;
pub use runtime::Runtime;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of serengeti-core.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
