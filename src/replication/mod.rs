//! Replication
//!
//! Row-level replication: choosing a primary/secondary placement for each
//! row, and the RPC message shapes used to propagate inserts and placement
//! changes around the cluster.

mod placement;
mod protocol;

pub use placement::{select_primary_secondary, select_replacement};
pub use protocol::{ReplicationMessage, ReplicationSink};
