//! Query Executor
//!
//! Builds an operator tree from a `Plan` and drives it to completion.
//! Table/index/range scans are resolved through a `RowSource` so the
//! executor never talks to the catalog directly.

pub mod memory;
pub mod operator;
pub mod spill;

use std::collections::HashMap;

use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;
use crate::query::planner::{JoinSpec, PlanNode};
use memory::MemoryManager;
use operator::{
    AggregateOp, BuildHashTableOp, DistinctOp, FilterOp, HashJoinProbeOp, LimitOp,
    NestedLoopJoinOp, Operator, ProjectOp, Row, SortOp, VecScan,
};
use spill::SpillSet;

/// Resolves leaf scans against the catalog. Implemented by the runtime
/// layer that owns `storage::catalog::Table`.
pub trait RowSource {
    fn scan_table(&self, table: &str) -> Vec<Row>;
    fn index_lookup(&self, table: &str, column: &str, value: &Value) -> Vec<Row>;
    fn range_lookup(
        &self,
        table: &str,
        column: &str,
        low: Option<&Value>,
        high: Option<&Value>,
    ) -> Vec<Row>;
}

/// Rows per spill partition past which a hash join's build side is
/// considered "doesn't fit in budget" and gets partitioned to disk.
const SPILL_PARTITIONS: usize = 8;
const BYTES_PER_ROW_ESTIMATE: usize = 256;

/// Execute `plan` against `source`, returning every resulting row.
/// Equivalent to driving the root operator to exhaustion.
pub fn execute(plan: &PlanNode, source: &dyn RowSource, memory: &MemoryManager) -> Result<Vec<Row>> {
    let mut operator = build_operator(plan, source, memory)?;
    let mut rows = Vec::new();
    while let Some(row) = operator.next()? {
        rows.push(row);
    }
    Ok(rows)
}

fn build_operator(
    plan: &PlanNode,
    source: &dyn RowSource,
    memory: &MemoryManager,
) -> Result<Box<dyn Operator>> {
    let op: Box<dyn Operator> = match plan {
        PlanNode::TableScan { table } => Box::new(VecScan::new(source.scan_table(table))),
        PlanNode::IndexScan { table, column, value } => {
            Box::new(VecScan::new(source.index_lookup(table, column, value)))
        }
        PlanNode::RangeScan {
            table,
            column,
            low,
            high,
        } => Box::new(VecScan::new(
            source.range_lookup(table, column, low.as_ref(), high.as_ref()),
        )),
        PlanNode::Filter { input, predicate } => Box::new(FilterOp::new(
            build_operator(input, source, memory)?,
            predicate.clone(),
        )),
        PlanNode::Project { input, columns } => Box::new(ProjectOp::new(
            build_operator(input, source, memory)?,
            columns.clone(),
        )),
        PlanNode::NestedLoopJoin { left, right, join } => Box::new(NestedLoopJoinOp::new(
            build_operator(left, source, memory)?,
            build_operator(right, source, memory)?,
            join.clone(),
        )),
        PlanNode::BuildHashTable { input, key_column } => {
            // A bare BuildHashTable root (no probe side) just materializes
            // and replays its input — the real work happens when it's
            // nested under HashJoinProbe below.
            let _ = key_column;
            let rows = drain(build_operator(input, source, memory)?)?;
            Box::new(VecScan::new(rows))
        }
        PlanNode::HashJoinProbe { build, probe, join } => {
            let build_rows = drain_build_side(build, source, memory)?;
            let probe_rows = drain(build_operator(probe, source, memory)?)?;
            let joined = hash_join(build_rows, probe_rows, join, memory)?;
            Box::new(VecScan::new(joined))
        }
        PlanNode::Sort { input, column } => {
            Box::new(SortOp::new(build_operator(input, source, memory)?, column.clone())?)
        }
        PlanNode::Aggregate {
            input,
            function,
            column,
        } => Box::new(AggregateOp::new(
            build_operator(input, source, memory)?,
            *function,
            column.clone(),
        )?),
        PlanNode::Distinct { input } => {
            Box::new(DistinctOp::new(build_operator(input, source, memory)?))
        }
        PlanNode::Limit { input, count } => {
            Box::new(LimitOp::new(build_operator(input, source, memory)?, *count))
        }
    };
    Ok(op)
}

fn drain(mut op: Box<dyn Operator>) -> Result<Vec<Row>> {
    let mut rows = Vec::new();
    while let Some(row) = op.next()? {
        rows.push(row);
    }
    Ok(rows)
}

/// `build` is always a `BuildHashTable` node wrapping the actual build-side
/// plan; peel it to get the key column and underlying rows.
fn drain_build_side(
    build: &PlanNode,
    source: &dyn RowSource,
    memory: &MemoryManager,
) -> Result<(String, Vec<Row>)> {
    match build {
        PlanNode::BuildHashTable { input, key_column } => {
            let rows = drain(build_operator(input, source, memory)?)?;
            Ok((key_column.clone(), rows))
        }
        other => {
            let rows = drain(build_operator(other, source, memory)?)?;
            Ok((String::new(), rows))
        }
    }
}

fn hash_join(
    build: (String, Vec<Row>),
    probe_rows: Vec<Row>,
    join: &JoinSpec,
    memory: &MemoryManager,
) -> Result<Vec<Row>> {
    let (key_column, build_rows) = build;
    let estimated_bytes = build_rows.len() * BYTES_PER_ROW_ESTIMATE;

    if memory.would_spill(estimated_bytes) {
        hash_join_spilled(key_column, build_rows, probe_rows, join)
    } else {
        let table = BuildHashTableOp::new(Box::new(VecScan::new(build_rows)), key_column.clone())
            .build()?;
        let probe_column = if key_column.is_empty() {
            join.right_column.clone()
        } else {
            join.left_column.clone()
        };
        let probe_op = HashJoinProbeOp::new(Box::new(VecScan::new(probe_rows)), table, probe_column);
        drain(Box::new(probe_op))
    }
}

/// Hash join whose build side doesn't fit in the query's memory budget:
/// partition both sides to disk by a hash of the join key, then join one
/// partition pair at a time. All spill files are `tempfile::NamedTempFile`s
/// and are deleted on drop — on success or on an early `?` return alike.
fn hash_join_spilled(
    key_column: String,
    build_rows: Vec<Row>,
    probe_rows: Vec<Row>,
    join: &JoinSpec,
) -> Result<Vec<Row>> {
    let mut build_set = SpillSet::new(SPILL_PARTITIONS)?;
    let mut probe_set = SpillSet::new(SPILL_PARTITIONS)?;

    let hash_key = |row: &Row, column: &str| -> u64 {
        row.1
            .get(column)
            .map(|v| v.to_string())
            .map(|s| fnv1a(s.as_bytes()))
            .unwrap_or(0)
    };

    let build_key_col = if key_column.is_empty() {
        join.left_column.clone()
    } else {
        key_column
    };
    build_set.distribute(build_rows, |row| hash_key(row, &build_key_col))?;
    probe_set.distribute(probe_rows, |row| hash_key(row, &join.right_column))?;

    let mut results = Vec::new();
    for i in 0..SPILL_PARTITIONS {
        let build_partition = build_set.partition(i).read_rows()?;
        let probe_partition = probe_set.partition(i).read_rows()?;
        if build_partition.is_empty() || probe_partition.is_empty() {
            continue;
        }

        let mut table: HashMap<String, Vec<Row>> = HashMap::new();
        for row in build_partition {
            let key = row
                .1
                .get(&build_key_col)
                .map(|v| v.to_string())
                .unwrap_or_default();
            table.entry(key).or_default().push(row);
        }

        for (_, probe_doc) in probe_partition {
            let key = probe_doc
                .get(&join.right_column)
                .map(|v| v.to_string())
                .unwrap_or_default();
            if let Some(matches) = table.get(&key) {
                for (_, build_doc) in matches {
                    let mut merged = serde_json::Map::new();
                    if let Value::Object(p) = &probe_doc {
                        merged.extend(p.clone());
                    }
                    if let Value::Object(b) = build_doc {
                        merged.extend(b.clone());
                    }
                    results.push((Uuid::new_v4(), Value::Object(merged)));
                }
            }
        }
    }

    Ok(results)
}

fn fnv1a(data: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in data {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}
