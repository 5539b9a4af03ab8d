//! Subnet discovery: a UDP beacon announcing this node's presence, and the
//! suspect/lost state machine that watches peers go quiet.

use std::collections::HashMap;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;

/// `{node-id, replication RPC address, epoch}` broadcast on the discovery
/// socket — `tcp_addr` is where peers should dial this node for replication
/// traffic, not the client-facing query port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Beacon {
    pub node_id: Uuid,
    pub tcp_addr: String,
    pub epoch: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerStatus {
    Online,
    Suspect,
    Lost,
}

#[derive(Debug, Clone)]
pub struct PeerState {
    pub tcp_addr: String,
    pub last_seen: Instant,
    pub status: PeerStatus,
}

/// Tracks every peer this node has heard a beacon from, and classifies
/// silence into `suspect` then `lost` per the configured thresholds.
pub struct PeerTable {
    node_id: Uuid,
    peers: RwLock<HashMap<Uuid, PeerState>>,
    beacon_interval: Duration,
    missed_beacons_for_suspect: u32,
    suspect_to_lost: Duration,
}

impl PeerTable {
    pub fn new(node_id: Uuid, config: &Config) -> Self {
        Self {
            node_id,
            peers: RwLock::new(HashMap::new()),
            beacon_interval: config.beacon_interval,
            missed_beacons_for_suspect: config.missed_beacons_for_suspect,
            suspect_to_lost: config.suspect_to_lost,
        }
    }

    pub fn node_id(&self) -> Uuid {
        self.node_id
    }

    /// Record a beacon just received from a peer. A peer heard from at all
    /// is always `Online`, even if it had previously gone `Suspect`.
    pub fn record_beacon(&self, beacon: &Beacon) {
        if beacon.node_id == self.node_id {
            return;
        }
        self.peers.write().insert(
            beacon.node_id,
            PeerState {
                tcp_addr: beacon.tcp_addr.clone(),
                last_seen: Instant::now(),
                status: PeerStatus::Online,
            },
        );
    }

    /// Re-evaluate every known peer's status against elapsed silence.
    /// Returns node-ids that transitioned to `Lost` on this call (the
    /// Reshuffle trigger).
    pub fn evaluate(&self) -> Vec<Uuid> {
        let suspect_after = self.beacon_interval * self.missed_beacons_for_suspect;
        let mut newly_lost = Vec::new();
        let mut peers = self.peers.write();
        for (node_id, state) in peers.iter_mut() {
            let silence = state.last_seen.elapsed();
            match state.status {
                PeerStatus::Online if silence >= suspect_after => {
                    state.status = PeerStatus::Suspect;
                }
                PeerStatus::Suspect if silence >= suspect_after + self.suspect_to_lost => {
                    state.status = PeerStatus::Lost;
                    newly_lost.push(*node_id);
                }
                _ => {}
            }
        }
        newly_lost
    }

    pub fn is_online(&self, node_id: Uuid) -> bool {
        if node_id == self.node_id {
            return true;
        }
        self.peers
            .read()
            .get(&node_id)
            .is_some_and(|p| p.status == PeerStatus::Online)
    }

    /// Every node this one considers online, including itself.
    pub fn online_nodes(&self) -> Vec<Uuid> {
        let mut nodes: Vec<Uuid> = self
            .peers
            .read()
            .iter()
            .filter(|(_, p)| p.status == PeerStatus::Online)
            .map(|(id, _)| *id)
            .collect();
        nodes.push(self.node_id);
        nodes
    }

    pub fn tcp_addr_of(&self, node_id: Uuid) -> Option<String> {
        self.peers.read().get(&node_id).map(|p| p.tcp_addr.clone())
    }
}

/// Spawn the beacon sender: broadcasts `Beacon` on `discovery_addr` every
/// `beacon_interval` until `cancel` is set.
pub fn spawn_beacon(
    node_id: Uuid,
    tcp_addr: String,
    discovery_addr: String,
    interval: Duration,
    cancel: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name("serengeti-beacon".into())
        .spawn(move || {
            let socket = match UdpSocket::bind("0.0.0.0:0") {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!("beacon socket bind failed: {e}");
                    return;
                }
            };
            if let Err(e) = socket.set_broadcast(true) {
                tracing::warn!("failed to enable UDP broadcast: {e}");
            }

            let mut epoch = 0u64;
            while !cancel.load(Ordering::Relaxed) {
                let beacon = Beacon {
                    node_id,
                    tcp_addr: tcp_addr.clone(),
                    epoch,
                };
                epoch += 1;
                match bincode::serialize(&beacon) {
                    Ok(bytes) => {
                        if let Err(e) = socket.send_to(&bytes, &discovery_addr) {
                            tracing::debug!("beacon send failed: {e}");
                        }
                    }
                    Err(e) => tracing::warn!("beacon encode failed: {e}"),
                }
                thread::sleep(interval);
            }
        })
        .expect("failed to spawn beacon thread")
}

/// Spawn the beacon listener: binds `discovery_addr` and records every
/// beacon heard into `peers`.
pub fn spawn_listener(
    discovery_addr: String,
    peers: Arc<PeerTable>,
    cancel: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name("serengeti-discovery-listener".into())
        .spawn(move || {
            let socket = match UdpSocket::bind(&discovery_addr) {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!("discovery listener bind failed on {discovery_addr}: {e}");
                    return;
                }
            };
            if let Err(e) = socket.set_read_timeout(Some(Duration::from_millis(200))) {
                tracing::warn!("failed to set discovery read timeout: {e}");
            }

            let mut buf = [0u8; 4096];
            while !cancel.load(Ordering::Relaxed) {
                match socket.recv_from(&mut buf) {
                    Ok((len, _from)) => {
                        if let Ok(beacon) = bincode::deserialize::<Beacon>(&buf[..len]) {
                            peers.record_beacon(&beacon);
                        }
                    }
                    Err(ref e)
                        if e.kind() == std::io::ErrorKind::WouldBlock
                            || e.kind() == std::io::ErrorKind::TimedOut => {}
                    Err(e) => tracing::debug!("discovery recv error: {e}"),
                }
            }
        })
        .expect("failed to spawn discovery listener thread")
}
