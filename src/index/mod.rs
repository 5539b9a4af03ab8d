//! B-tree secondary index
//!
//! Maps a column value to the set of row-ids holding it, so the planner can
//! choose an index scan instead of a full table scan when selectivity is
//! low. Kept entirely in memory; rebuilt from the table's rows on load
//! since it is a derived structure, not a source of truth.

mod btree;

pub use btree::{BTreeIndex, IndexStats};
