//! Configuration for the storage and persistence core.
//!
//! Centralized configuration with sensible defaults. Every tunable the
//! design pins as a default (level size ratio, bloom filter false-positive
//! target, node grace period, beacon interval, scheduler tick) lives here so
//! it can be overridden from a single place rather than scattered as magic
//! numbers.

use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for a node instance.
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory for all data files.
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// WAL file path (relative to data_dir).
    pub wal_path: PathBuf,

    /// Sync strategy: how often to fsync WAL. Defaults to `EveryWrite` —
    /// `append()`'s contract is that the returned LSN is already durable;
    /// `EveryNEntries` trades that away for throughput and is opt-in.
    pub wal_sync_strategy: WalSyncStrategy,

    // -------------------------------------------------------------------------
    // MemTable / LSM Configuration
    // -------------------------------------------------------------------------
    /// Max size of memtable before flush (in bytes).
    pub memtable_size_limit: usize,

    /// Size ratio between adjacent LSM levels (L(n+1) holds up to this many
    /// times as many bytes as L(n)). Default 10 per the design's pinned
    /// defaults.
    pub level_size_ratio: u64,

    /// Target false-positive rate for SSTable bloom filters. Default 1%.
    pub bloom_fpr_target: f64,

    /// Number of levels managed below L0 before the last level absorbs
    /// everything (L1..=max_level).
    pub max_level: u8,

    // -------------------------------------------------------------------------
    // Replication / Cluster Configuration
    // -------------------------------------------------------------------------
    /// Grace period after a node is declared `lost` during which it may
    /// re-appear and abort any in-flight reshuffle for its rows.
    pub node_grace_period: Duration,

    /// Interval between discovery beacons.
    pub beacon_interval: Duration,

    /// Consecutive missed beacons before a peer enters `suspect`.
    pub missed_beacons_for_suspect: u32,

    /// Additional time after `suspect` before a peer is declared `lost`.
    pub suspect_to_lost: Duration,

    /// Bounded retry count for reshuffle transfers to an unreachable
    /// replacement replica.
    pub reshuffle_max_retries: u32,

    // -------------------------------------------------------------------------
    // Scheduler Configuration
    // -------------------------------------------------------------------------
    /// Interval between Storage Scheduler persistence ticks. Default 60s.
    pub scheduler_tick: Duration,

    // -------------------------------------------------------------------------
    // Query Configuration
    // -------------------------------------------------------------------------
    /// Per-query memory budget (bytes) before operators are asked to spill.
    pub query_memory_budget: usize,

    /// Default selectivity assumed when statistics are unavailable.
    pub default_selectivity: f64,

    /// Selectivity threshold below which an index scan is preferred over a
    /// full table scan, when an index exists.
    pub index_selectivity_threshold: f64,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address for the client-facing query protocol.
    pub listen_addr: String,

    /// TCP listen address for the inter-node replication RPC receiver
    /// (`ReplicateInsertObject`/`TableReplicaObjectInsertOrReplace`/etc.) —
    /// separate from `listen_addr` since that one only ever speaks the
    /// client `Command`/`Response` protocol.
    pub replication_addr: String,

    /// UDP address used for subnet discovery beacons.
    pub discovery_addr: String,

    /// Max concurrent client connections.
    pub max_connections: usize,

    /// Connection read timeout (milliseconds).
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds).
    pub write_timeout_ms: u64,
}

/// WAL sync strategy.
#[derive(Debug, Clone, Copy)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest).
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance).
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./serengeti_data"),
            wal_path: PathBuf::from("wal.log"),
            wal_sync_strategy: WalSyncStrategy::EveryWrite,
            memtable_size_limit: 64 * 1024 * 1024, // 64 MB
            level_size_ratio: 10,
            bloom_fpr_target: 0.01,
            max_level: 6,
            node_grace_period: Duration::from_secs(10),
            beacon_interval: Duration::from_secs(5),
            missed_beacons_for_suspect: 2,
            suspect_to_lost: Duration::from_secs(10),
            reshuffle_max_retries: 3,
            scheduler_tick: Duration::from_secs(60),
            query_memory_budget: 64 * 1024 * 1024,
            default_selectivity: 0.1,
            index_selectivity_threshold: 0.2,
            listen_addr: "127.0.0.1:1985".to_string(),
            replication_addr: "127.0.0.1:1986".to_string(),
            discovery_addr: "0.0.0.0:19850".to_string(),
            max_connections: 1024,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Create a new config builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for [`Config`].
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    pub fn discovery_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.discovery_addr = addr.into();
        self
    }

    pub fn replication_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.replication_addr = addr.into();
        self
    }

    pub fn memtable_size_limit(mut self, bytes: usize) -> Self {
        self.config.memtable_size_limit = bytes;
        self
    }

    pub fn scheduler_tick(mut self, interval: Duration) -> Self {
        self.config.scheduler_tick = interval;
        self
    }

    pub fn query_memory_budget(mut self, bytes: usize) -> Self {
        self.config.query_memory_budget = bytes;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
