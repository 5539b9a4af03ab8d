//! TCP Server
//!
//! Accepts client connections and dispatches them to a worker thread pool,
//! each worker driving commands through the shared `Runtime`.

use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, Sender};

use crate::config::Config;
use crate::error::{CoreError, Result};
use crate::runtime::Runtime;

use super::Connection;

enum WorkerMessage {
    NewConnection(TcpStream),
    Shutdown,
}

/// TCP server for the client-facing query protocol.
///
/// - Main thread accepts connections
/// - Worker thread pool handles client I/O
/// - Shared `Runtime` reference for all workers
pub struct Server {
    config: Config,
    runtime: Arc<Runtime>,
    listener: Option<TcpListener>,
    work_sender: Option<Sender<WorkerMessage>>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    active_connections: Arc<AtomicUsize>,
}

impl Server {
    pub fn new(config: Config, runtime: Arc<Runtime>) -> Self {
        Self {
            config,
            runtime,
            listener: None,
            work_sender: None,
            workers: Vec::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
            active_connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Start the server (blocking). Binds, spawns workers, accepts
    /// connections until shutdown is signaled.
    pub fn run(&mut self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr).map_err(|e| {
            CoreError::Network(format!(
                "Failed to bind to {}: {}",
                self.config.listen_addr, e
            ))
        })?;

        listener.set_nonblocking(true)?;

        tracing::info!("Server listening on {}", self.config.listen_addr);
        self.listener = Some(listener);

        let num_workers = num_cpus();
        let (sender, receiver) = bounded::<WorkerMessage>(self.config.max_connections);
        self.work_sender = Some(sender);

        tracing::info!("Starting {} worker threads", num_workers);

        for worker_id in 0..num_workers {
            let worker = Worker::new(
                worker_id,
                receiver.clone(),
                Arc::clone(&self.runtime),
                Arc::clone(&self.active_connections),
                self.config.read_timeout_ms,
                self.config.write_timeout_ms,
            );
            let handle = thread::Builder::new()
                .name(format!("serengeti-worker-{}", worker_id))
                .spawn(move || worker.run())
                .map_err(|e| CoreError::Network(format!("Failed to spawn worker: {}", e)))?;

            self.workers.push(handle);
        }

        self.accept_loop()?;
        self.cleanup();

        Ok(())
    }

    fn accept_loop(&mut self) -> Result<()> {
        let listener = self.listener.as_ref().unwrap();
        let sender = self.work_sender.as_ref().unwrap();

        while !self.shutdown.load(Ordering::Relaxed) {
            match listener.accept() {
                Ok((stream, addr)) => {
                    let current = self.active_connections.load(Ordering::Relaxed);
                    if current >= self.config.max_connections {
                        tracing::warn!(
                            "Connection limit reached ({}/{}), rejecting {}",
                            current,
                            self.config.max_connections,
                            addr
                        );
                        drop(stream);
                        continue;
                    }

                    tracing::debug!("Accepted connection from {}", addr);

                    if let Err(e) = sender.send(WorkerMessage::NewConnection(stream)) {
                        tracing::error!("Failed to dispatch connection: {}", e);
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(10));
                }
                Err(e) => {
                    if !self.shutdown.load(Ordering::Relaxed) {
                        tracing::error!("Accept error: {}", e);
                    }
                }
            }
        }

        Ok(())
    }

    fn cleanup(&mut self) {
        tracing::info!("Shutting down server...");

        if let Some(sender) = &self.work_sender {
            for _ in 0..self.workers.len() {
                let _ = sender.send(WorkerMessage::Shutdown);
            }
        }

        for handle in self.workers.drain(..) {
            if let Err(e) = handle.join() {
                tracing::error!("Worker thread panicked: {:?}", e);
            }
        }

        tracing::info!("Server shutdown complete");
    }

    pub fn shutdown(&self) {
        tracing::info!("Shutdown signal received");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.load(Ordering::Relaxed)
    }

    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }
}

struct Worker {
    id: usize,
    receiver: Receiver<WorkerMessage>,
    runtime: Arc<Runtime>,
    active_connections: Arc<AtomicUsize>,
    read_timeout_ms: u64,
    write_timeout_ms: u64,
}

impl Worker {
    fn new(
        id: usize,
        receiver: Receiver<WorkerMessage>,
        runtime: Arc<Runtime>,
        active_connections: Arc<AtomicUsize>,
        read_timeout_ms: u64,
        write_timeout_ms: u64,
    ) -> Self {
        Self {
            id,
            receiver,
            runtime,
            active_connections,
            read_timeout_ms,
            write_timeout_ms,
        }
    }

    fn run(self) {
        tracing::debug!("Worker {} started", self.id);

        loop {
            match self.receiver.recv() {
                Ok(WorkerMessage::NewConnection(stream)) => {
                    self.handle_connection(stream);
                }
                Ok(WorkerMessage::Shutdown) => {
                    tracing::debug!("Worker {} received shutdown signal", self.id);
                    break;
                }
                Err(_) => {
                    tracing::debug!("Worker {} channel closed", self.id);
                    break;
                }
            }
        }

        tracing::debug!("Worker {} stopped", self.id);
    }

    fn handle_connection(&self, stream: TcpStream) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);

        let mut conn = match Connection::new(stream, Arc::clone(&self.runtime)) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!("Failed to create connection: {}", e);
                self.active_connections.fetch_sub(1, Ordering::Relaxed);
                return;
            }
        };

        if let Err(e) = conn.set_timeouts(self.read_timeout_ms, self.write_timeout_ms) {
            tracing::warn!("Failed to set connection timeouts: {}", e);
        }

        if let Err(e) = conn.handle() {
            tracing::debug!("Connection {} ended with error: {}", conn.peer_addr(), e);
        }

        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(4)
}
