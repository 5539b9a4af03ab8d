//! Storage Scheduler
//!
//! Singleton background persister. Periodically (and on-demand, e.g. at
//! shutdown) snapshots the catalog's metadata and every table's storage
//! and replica objects to disk, independent of LSM flushing.
//!
//! The "running flag" is a single process-wide atomic boolean acquired via
//! CAS — this is the only mechanism allowed to gate `perform_persist`, per
//! the at-most-one-in-flight invariant.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{info, warn};

use crate::storage::catalog::Catalog;

/// Outcome of a `perform_persist` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    /// The snapshot completed successfully.
    Success,
    /// Nothing to persist — every database was empty.
    NothingToPersist,
    /// Rejected without side effects.
    Skipped(SkipReason),
    /// The snapshot started but an I/O error aborted it; the flag was
    /// still cleared.
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NetworkOffline,
    AlreadyRunning,
}

/// Guard that clears the running flag on drop — including on panic — so a
/// failed or cancelled persist never leaves the scheduler stuck in
/// `PERSISTING`.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The Storage Scheduler singleton.
pub struct Scheduler {
    running: AtomicBool,
    tick_interval: Duration,
}

impl Scheduler {
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            running: AtomicBool::new(false),
            tick_interval,
        }
    }

    /// Whether a persist is currently in flight.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// `perform_persist`: snapshot the catalog if the network is online and
    /// no other persist is already running.
    ///
    /// Concurrent callers race on the same atomic boolean; exactly one
    /// acquires it and the rest return `Skipped(AlreadyRunning)` without
    /// touching disk.
    pub fn perform_persist(&self, catalog: &Catalog, network_online: bool) -> PersistOutcome {
        if !network_online {
            return PersistOutcome::Skipped(SkipReason::NetworkOffline);
        }

        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return PersistOutcome::Skipped(SkipReason::AlreadyRunning);
        }
        let _guard = RunningGuard(&self.running);

        let databases = catalog.databases();
        if databases.is_empty() {
            info!("nothing to persist");
            return PersistOutcome::NothingToPersist;
        }

        match catalog.save_all() {
            Ok(()) => {
                info!(databases = databases.len(), "persisted catalog snapshot");
                PersistOutcome::Success
            }
            Err(e) => {
                warn!(error = %e, "scheduler persist failed");
                PersistOutcome::Failed(e.to_string())
            }
        }
    }

    /// Spawn the periodic background tick. Stops cooperatively when
    /// `cancel` is set, checked at least once per tick interval.
    pub fn spawn_periodic(
        self: Arc<Self>,
        catalog: Arc<Catalog>,
        network_online: Arc<AtomicBool>,
        cancel: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        thread::Builder::new()
            .name("scheduler-tick".to_string())
            .spawn(move || {
                while !cancel.load(Ordering::Relaxed) {
                    thread::sleep(self.tick_interval);
                    if cancel.load(Ordering::Relaxed) {
                        break;
                    }
                    let online = network_online.load(Ordering::Relaxed);
                    let _ = self.perform_persist(&catalog, online);
                }
            })
            .expect("failed to spawn scheduler thread")
    }
}
