//! Replication RPC transport: carries a [`ReplicationMessage`] over a TCP
//! connection to a peer, framed the same way `protocol::codec` frames
//! client commands.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{CoreError, Result};
use crate::replication::{ReplicationMessage, ReplicationSink};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const STREAM_READ_TIMEOUT: Duration = Duration::from_secs(5);

pub fn encode_message(message: &ReplicationMessage) -> Result<Vec<u8>> {
    let payload = bincode::serialize(message)?;
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

pub fn decode_message(bytes: &[u8]) -> Result<ReplicationMessage> {
    if bytes.len() < 4 {
        return Err(CoreError::Protocol("RPC frame shorter than length prefix".into()));
    }
    let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let payload = bytes
        .get(4..4 + len)
        .ok_or_else(|| CoreError::Protocol("RPC frame shorter than declared length".into()))?;
    Ok(bincode::deserialize(payload)?)
}

/// Open a one-shot connection to `addr`, send `message`, and return without
/// waiting for a reply — replication delivery is at-least-once and fire-
/// and-forget by design.
pub fn send_message(addr: &str, message: &ReplicationMessage) -> Result<()> {
    let socket_addr: std::net::SocketAddr = addr
        .parse()
        .map_err(|e| CoreError::Network(format!("invalid peer address {addr}: {e}")))?;
    let mut stream = TcpStream::connect_timeout(&socket_addr, CONNECT_TIMEOUT)
        .map_err(|e| CoreError::Network(format!("connect to {addr} failed: {e}")))?;
    let frame = encode_message(message)?;
    stream
        .write_all(&frame)
        .map_err(|e| CoreError::Network(format!("send to {addr} failed: {e}")))?;
    Ok(())
}

/// Read one length-prefixed RPC frame from an already-accepted stream.
pub fn read_message(stream: &mut TcpStream) -> Result<ReplicationMessage> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload)?;
    Ok(bincode::deserialize(&payload)?)
}

/// Accept replication connections on `addr` until `cancel` is set. Each
/// connection carries exactly one length-prefixed `ReplicationMessage`
/// frame (the sender side is fire-and-forget, one connection per message),
/// which is handed to `sink` on receipt.
pub fn spawn_receiver(
    addr: String,
    sink: Arc<dyn ReplicationSink>,
    cancel: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name("serengeti-replication-listener".into())
        .spawn(move || {
            let listener = match TcpListener::bind(&addr) {
                Ok(l) => l,
                Err(e) => {
                    tracing::error!("replication listener bind failed on {addr}: {e}");
                    return;
                }
            };
            if let Err(e) = listener.set_nonblocking(true) {
                tracing::warn!("failed to set replication listener non-blocking: {e}");
            }

            while !cancel.load(Ordering::Relaxed) {
                match listener.accept() {
                    Ok((mut stream, peer)) => {
                        if let Err(e) = stream.set_read_timeout(Some(STREAM_READ_TIMEOUT)) {
                            tracing::warn!("failed to set replication stream timeout: {e}");
                        }
                        match read_message(&mut stream) {
                            Ok(message) => sink.apply(message),
                            Err(e) => {
                                tracing::warn!("failed to read replication message from {peer}: {e}")
                            }
                        }
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(50));
                    }
                    Err(e) => {
                        if !cancel.load(Ordering::Relaxed) {
                            tracing::warn!("replication accept error: {e}");
                        }
                    }
                }
            }
        })
        .expect("failed to spawn replication listener thread")
}
