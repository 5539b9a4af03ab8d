//! Storage Reshuffle
//!
//! Repairs row placement after Network declares a node `lost`: every row
//! this node holds where the lost node was primary or secondary gets a
//! fresh replacement replica.

use std::sync::atomic::{AtomicU32, Ordering};

use tracing::{info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::replication::{select_primary_secondary, select_replacement};
use crate::storage::catalog::{Catalog, Placement};

/// What Reshuffle needs from Network: who's online, whether the lost node
/// has reappeared, and the means to ship a row and broadcast a placement
/// change. Kept as a trait so the procedure can be exercised without a
/// real socket.
pub trait PlacementTransport {
    fn online_nodes(&self) -> Vec<Uuid>;
    fn is_online(&self, node: Uuid) -> bool;
    fn ship_row(
        &self,
        target: Uuid,
        db: &str,
        table: &str,
        row_id: Uuid,
        doc: &serde_json::Value,
        lsn: u64,
    ) -> Result<()>;
    fn broadcast_placement(
        &self,
        db: &str,
        table: &str,
        row_id: Uuid,
        placement: Placement,
    ) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    Repaired,
    UnderRepaired,
}

#[derive(Debug, Default)]
pub struct ReshuffleReport {
    pub repaired: u64,
    pub under_repaired: u64,
    pub aborted: bool,
}

/// Run the reshuffle procedure for `lost_node` across every local database
/// and table. `max_retries` bounds how many times a single row retries a
/// failed ship before being marked `under-repaired`.
pub fn reshuffle_node(
    catalog: &Catalog,
    lost_node: Uuid,
    transport: &dyn PlacementTransport,
    max_retries: u32,
) -> ReshuffleReport {
    let mut report = ReshuffleReport::default();

    if transport.is_online(lost_node) {
        info!(node = %lost_node, "node reappeared within grace window, aborting reshuffle");
        report.aborted = true;
        return report;
    }

    for database in catalog.databases() {
        for table in database.tables() {
            let rows = table.replica_object().rows_owned_by(lost_node);
            for row_id in rows {
                if transport.is_online(lost_node) {
                    info!(node = %lost_node, row = %row_id, "node reappeared mid-run, aborting remainder");
                    report.aborted = true;
                    return report;
                }

                let Some(placement) = table.replica_object().get(&row_id) else {
                    continue;
                };
                let Some(doc) = table.get(row_id) else {
                    continue;
                };
                let lsn = table
                    .storage_object()
                    .last_lsn(&row_id)
                    .unwrap_or_default();

                let surviving = if placement.primary == lost_node {
                    placement.secondary
                } else {
                    placement.primary
                };

                let outcome = reshuffle_row(
                    transport,
                    max_retries,
                    database.name(),
                    table.name(),
                    row_id,
                    &doc,
                    lsn,
                    lost_node,
                    surviving,
                );

                match outcome {
                    Some(new_node) => {
                        let new_placement = if placement.primary == lost_node {
                            table.replica_object().update_new_primary(row_id, new_node);
                            Placement {
                                primary: new_node,
                                secondary: surviving,
                            }
                        } else {
                            table
                                .replica_object()
                                .update_new_secondary(row_id, new_node);
                            Placement {
                                primary: surviving,
                                secondary: new_node,
                            }
                        };

                        if let Err(e) = transport.broadcast_placement(
                            database.name(),
                            table.name(),
                            row_id,
                            new_placement,
                        ) {
                            warn!(error = %e, row = %row_id, "failed to broadcast new placement");
                        }
                        report.repaired += 1;
                    }
                    None => {
                        warn!(row = %row_id, "row left under-repaired after exhausting retries");
                        report.under_repaired += 1;
                    }
                }
            }
        }
    }

    report
}

/// Attempt to ship `row_id` to a freshly elected replacement, retrying with
/// a new candidate on failure. Returns the node the row finally landed on,
/// or `None` if every attempt (up to `max_retries` beyond the first) failed.
#[allow(clippy::too_many_arguments)]
fn reshuffle_row(
    transport: &dyn PlacementTransport,
    max_retries: u32,
    db: &str,
    table: &str,
    row_id: Uuid,
    doc: &serde_json::Value,
    lsn: u64,
    lost_node: Uuid,
    surviving: Uuid,
) -> Option<Uuid> {
    let mut excluded = vec![lost_node, surviving];
    let attempts = AtomicU32::new(0);

    loop {
        let online = transport.online_nodes();
        let candidate = select_replacement(&online, &excluded)
            .or_else(|| select_primary_secondary(&online).map(|p| p.primary))?;

        match transport.ship_row(candidate, db, table, row_id, doc, lsn) {
            Ok(()) => return Some(candidate),
            Err(e) => {
                warn!(error = %e, target = %candidate, row = %row_id, "replacement unreachable, retrying");
                excluded.push(candidate);
                let count = attempts.fetch_add(1, Ordering::Relaxed) + 1;
                if count > max_retries {
                    return None;
                }
            }
        }
    }
}
