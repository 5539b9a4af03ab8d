//! In-memory secondary index: `column value → {row-id}`.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

/// A secondary index over one column of one table.
pub struct BTreeIndex {
    column: String,
    map: RwLock<BTreeMap<String, BTreeSet<Uuid>>>,
}

/// Cardinality stats derived from an index, used by the planner's
/// selectivity estimate when no `ColumnStatistics` entry exists yet.
#[derive(Debug, Clone, Copy)]
pub struct IndexStats {
    /// Number of distinct values (NDV).
    pub distinct_values: usize,
    /// Total number of indexed row-ids.
    pub row_count: usize,
}

impl BTreeIndex {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            map: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    /// Record that `row_id`'s value for this column is `value`.
    pub fn insert(&self, value: &Value, row_id: Uuid) {
        self.map
            .write()
            .entry(sort_key(value))
            .or_default()
            .insert(row_id);
    }

    /// Remove a row-id's entry, e.g. before re-indexing an updated value or
    /// on delete.
    pub fn remove(&self, value: &Value, row_id: Uuid) {
        let mut map = self.map.write();
        let key = sort_key(value);
        if let Some(set) = map.get_mut(&key) {
            set.remove(&row_id);
            if set.is_empty() {
                map.remove(&key);
            }
        }
    }

    /// Exact-match lookup.
    pub fn lookup(&self, value: &Value) -> Vec<Uuid> {
        self.map
            .read()
            .get(&sort_key(value))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Inclusive range lookup over the index's sort key.
    pub fn range(&self, low: Option<&Value>, high: Option<&Value>) -> Vec<Uuid> {
        let map = self.map.read();
        let low_key = low.map(sort_key).unwrap_or_default();
        let high_key = high.map(sort_key);

        map.range(low_key..)
            .take_while(|(k, _)| high_key.as_ref().map(|h| *k <= h).unwrap_or(true))
            .flat_map(|(_, set)| set.iter().copied())
            .collect()
    }

    pub fn stats(&self) -> IndexStats {
        let map = self.map.read();
        IndexStats {
            distinct_values: map.len(),
            row_count: map.values().map(BTreeSet::len).sum(),
        }
    }

    /// Sort keys in ascending order, each repeated once per row-id it
    /// covers — the weighting a histogram builder needs to produce
    /// equi-depth (not equi-width) buckets.
    pub fn sorted_keys(&self) -> Vec<String> {
        self.map
            .read()
            .iter()
            .flat_map(|(key, rows)| std::iter::repeat(key.clone()).take(rows.len()))
            .collect()
    }
}

/// Produces a string that sorts the same way the original JSON scalar would.
/// Numbers are zero-padded so lexical and numeric order agree for the
/// non-negative range this index is expected to carry; this is a known
/// limitation for negative numbers, which sort after positives.
fn sort_key(value: &Value) -> String {
    match value {
        Value::String(s) => format!("s:{s}"),
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                format!("n:{:020.6}", f)
            } else {
                format!("n:{n}")
            }
        }
        Value::Bool(b) => format!("b:{b}"),
        Value::Null => "z:".to_string(),
        other => format!("o:{other}"),
    }
}
