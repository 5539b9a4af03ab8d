//! Network Module
//!
//! Peer discovery (UDP beacon + suspect/lost state machine), the
//! replication RPC transport, and the client-facing TCP server.
//!
//! ## Architecture
//! - Single acceptor thread, worker thread pool for client connections
//! - A background beacon sender/listener pair tracks cluster membership
//! - Commands routed through the `Runtime`

pub mod discovery;
pub mod rpc;
mod server;
mod connection;

pub use server::Server;
pub use connection::Connection;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use serde_json::Value;
use uuid::Uuid;

use crate::config::Config;
use crate::error::Result;
use crate::replication::ReplicationMessage;
use crate::reshuffle::PlacementTransport;
use crate::storage::catalog::Placement;

use discovery::PeerTable;

/// This node's view of the cluster: who it is, who else it's heard from,
/// and how to reach them.
pub struct Network {
    node_id: Uuid,
    replication_addr: String,
    peers: Arc<PeerTable>,
    cancel: Arc<AtomicBool>,
    handles: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl Network {
    pub fn new(node_id: Uuid, config: &Config) -> Self {
        Self {
            node_id,
            replication_addr: config.replication_addr.clone(),
            peers: Arc::new(PeerTable::new(node_id, config)),
            cancel: Arc::new(AtomicBool::new(false)),
            handles: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn node_id(&self) -> Uuid {
        self.node_id
    }

    /// Address this node's replication RPC receiver listens on.
    pub fn replication_addr(&self) -> &str {
        &self.replication_addr
    }

    /// Start the beacon sender and listener background threads. The beacon
    /// advertises `replication_addr`, not the client-facing `listen_addr` —
    /// it's the only address anything in this module ever dials a peer at
    /// (`ship_row`/`broadcast_placement`, both RPC, not client traffic).
    pub fn start_discovery(&self, config: &Config) {
        let sender = discovery::spawn_beacon(
            self.node_id,
            self.replication_addr.clone(),
            config.discovery_addr.clone(),
            config.beacon_interval,
            Arc::clone(&self.cancel),
        );
        let listener = discovery::spawn_listener(
            config.discovery_addr.clone(),
            Arc::clone(&self.peers),
            Arc::clone(&self.cancel),
        );
        let mut handles = self.handles.lock();
        handles.push(sender);
        handles.push(listener);
    }

    /// Re-evaluate peer liveness. Returns node-ids that just transitioned
    /// to `lost` — the Reshuffle trigger.
    pub fn evaluate_peers(&self) -> Vec<Uuid> {
        self.peers.evaluate()
    }

    pub fn shutdown(&self) {
        self.cancel.store(true, Ordering::Relaxed);
        for handle in self.handles.lock().drain(..) {
            let _ = handle.join();
        }
    }
}

impl PlacementTransport for Network {
    fn online_nodes(&self) -> Vec<Uuid> {
        self.peers.online_nodes()
    }

    fn is_online(&self, node: Uuid) -> bool {
        self.peers.is_online(node)
    }

    fn ship_row(
        &self,
        target: Uuid,
        db: &str,
        table: &str,
        row_id: Uuid,
        doc: &Value,
        lsn: u64,
    ) -> Result<()> {
        if target == self.node_id {
            return Ok(());
        }
        let Some(addr) = self.peers.tcp_addr_of(target) else {
            return Err(crate::error::CoreError::Network(format!(
                "no known address for node {target}"
            )));
        };
        rpc::send_message(
            &addr,
            &ReplicationMessage::ReplicateInsertObject {
                db: db.to_string(),
                table: table.to_string(),
                row_id,
                doc: doc.clone(),
                lsn,
            },
        )
    }

    fn broadcast_placement(
        &self,
        db: &str,
        table: &str,
        row_id: Uuid,
        placement: Placement,
    ) -> Result<()> {
        let message = ReplicationMessage::TableReplicaObjectInsertOrReplace {
            db: db.to_string(),
            table: table.to_string(),
            row_id,
            placement,
        };
        for node in self.peers.online_nodes() {
            if node == self.node_id {
                continue;
            }
            if let Some(addr) = self.peers.tcp_addr_of(node) {
                if let Err(e) = rpc::send_message(&addr, &message) {
                    tracing::warn!("broadcast_placement to {node} failed: {e}");
                }
            }
        }
        Ok(())
    }
}
