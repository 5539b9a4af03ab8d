//! Statistics Manager
//!
//! Per-table row counts and per-column NDV/histograms, kept approximate and
//! cheap to update so the query planner always has something to estimate
//! selectivity from.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;

use crate::index::BTreeIndex;

const HISTOGRAM_BUCKETS: usize = 16;

/// One equi-depth bucket: an inclusive upper bound and the running count of
/// values that fall at or below it relative to the previous bucket.
#[derive(Debug, Clone)]
pub struct HistogramBucket {
    pub upper_bound: String,
    pub count: u64,
}

/// Statistics for a single column, derived from a sorted sample of its
/// values (in practice, a secondary index's key set).
#[derive(Debug, Clone, Default)]
pub struct ColumnStatistics {
    pub ndv: u64,
    pub histogram: Vec<HistogramBucket>,
}

impl ColumnStatistics {
    /// Equality selectivity: `1/NDV`, or the default when there is nothing
    /// to estimate from.
    pub fn equality_selectivity(&self, default_selectivity: f64) -> f64 {
        if self.ndv == 0 {
            default_selectivity
        } else {
            1.0 / self.ndv as f64
        }
    }

    /// Range selectivity from the histogram: fraction of buckets whose
    /// upper bound falls within `[low, high]` (both optional / open-ended).
    pub fn range_selectivity(
        &self,
        low: Option<&str>,
        high: Option<&str>,
        default_selectivity: f64,
    ) -> f64 {
        if self.histogram.is_empty() {
            return default_selectivity;
        }
        let total: u64 = self.histogram.iter().map(|b| b.count).sum();
        if total == 0 {
            return default_selectivity;
        }
        let matched: u64 = self
            .histogram
            .iter()
            .filter(|b| {
                let above_low = match low {
                    Some(lo) => b.upper_bound.as_str() >= lo,
                    None => true,
                };
                let below_high = match high {
                    Some(hi) => b.upper_bound.as_str() <= hi,
                    None => true,
                };
                above_low && below_high
            })
            .map(|b| b.count)
            .sum();
        matched as f64 / total as f64
    }
}

/// Row count and per-column statistics for one table.
#[derive(Debug, Clone, Default)]
pub struct TableStatistics {
    pub row_count: u64,
    pub columns: HashMap<String, ColumnStatistics>,
}

/// Process-wide statistics store, keyed by `"db.table"`. A mutex per table
/// keeps critical sections brief: collection reads a snapshot of rows or an
/// index, computes stats, then swaps them in under the lock.
#[derive(Default)]
pub struct StatisticsManager {
    tables: Mutex<HashMap<String, TableStatistics>>,
}

impl StatisticsManager {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
        }
    }

    fn key(db: &str, table: &str) -> String {
        format!("{db}.{table}")
    }

    pub fn table_stats(&self, db: &str, table: &str) -> Option<TableStatistics> {
        self.tables.lock().get(&Self::key(db, table)).cloned()
    }

    pub fn set_row_count(&self, db: &str, table: &str, row_count: u64) {
        let mut tables = self.tables.lock();
        tables.entry(Self::key(db, table)).or_default().row_count = row_count;
    }

    /// Rebuild a column's NDV and histogram from a secondary index's
    /// current key distribution. No-op if no index is present — the
    /// planner falls back to defaults in that case.
    pub fn collect_column(&self, db: &str, table: &str, index: &BTreeIndex) {
        let stats = index.stats();
        let sorted_keys = index.sorted_keys();

        let histogram = build_histogram(&sorted_keys, HISTOGRAM_BUCKETS);

        let mut tables = self.tables.lock();
        let entry = tables.entry(Self::key(db, table)).or_default();
        entry.columns.insert(
            index.column().to_string(),
            ColumnStatistics {
                ndv: stats.distinct_values as u64,
                histogram,
            },
        );
    }

    /// Best-effort row-count + document-field collection pass over a full
    /// row set when no index exists for a column of interest.
    pub fn collect_rows(&self, db: &str, table: &str, rows: &[(uuid::Uuid, Value)]) {
        self.set_row_count(db, table, rows.len() as u64);
    }
}

fn build_histogram(sorted_keys: &[String], buckets: usize) -> Vec<HistogramBucket> {
    if sorted_keys.is_empty() || buckets == 0 {
        return Vec::new();
    }
    let bucket_size = (sorted_keys.len() + buckets - 1) / buckets;
    sorted_keys
        .chunks(bucket_size)
        .filter_map(|chunk| {
            chunk.last().map(|upper| HistogramBucket {
                upper_bound: upper.clone(),
                count: chunk.len() as u64,
            })
        })
        .collect()
}
