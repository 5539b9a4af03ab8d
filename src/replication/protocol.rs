//! Replication RPC message shapes.
//!
//! Delivery is at-least-once; receivers are idempotent on `row_id` via the
//! LSN tag (`TableStorageObject::put` discards a message whose LSN is not
//! newer than what's already applied for that row).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::storage::catalog::Placement;

/// A message exchanged between nodes for replication and cluster-wide
/// coordination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ReplicationMessage {
    /// Wipe all local state. Used only for coordinated, cluster-wide
    /// resets.
    DeleteEverything,

    /// Insert (or idempotently re-insert) a row into the receiver's
    /// `TableStorageObject`.
    ReplicateInsertObject {
        db: String,
        table: String,
        row_id: Uuid,
        doc: Value,
        lsn: u64,
    },

    /// Update the receiver's placement map for one row.
    TableReplicaObjectInsertOrReplace {
        db: String,
        table: String,
        row_id: Uuid,
        placement: Placement,
    },

    /// Broadcast for distributed query execution / logging.
    QueryLog {
        query: String,
        node_id: Uuid,
        lsn: u64,
    },
}

/// Applies a received [`ReplicationMessage`] to local state. Implemented by
/// `Runtime`, the only thing that owns the `Catalog` these messages mutate.
pub trait ReplicationSink: Send + Sync {
    fn apply(&self, message: ReplicationMessage);
}

impl ReplicationMessage {
    pub fn name(&self) -> &'static str {
        match self {
            ReplicationMessage::DeleteEverything => "DeleteEverything",
            ReplicationMessage::ReplicateInsertObject { .. } => "ReplicateInsertObject",
            ReplicationMessage::TableReplicaObjectInsertOrReplace { .. } => {
                "TableReplicaObjectInsertOrReplace"
            }
            ReplicationMessage::QueryLog { .. } => "QueryLog",
        }
    }
}
