//! Query Planner
//!
//! Turns an already-parsed select request into a cost-estimated plan tree.
//! Parsing the query language's surface grammar happens upstream of this
//! module; the planner only ever sees structured requests.

mod cost;
mod plan;

pub use plan::{AggregateFunction, CompareOp, JoinSpec, OptimizationLevel, Plan, PlanNode, Predicate};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::index::BTreeIndex;
use crate::statistics::StatisticsManager;

/// A parsed `select` request: the planner's sole input shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectRequest {
    pub db: String,
    pub table: String,
    /// Empty means `select *`.
    pub columns: Vec<String>,
    pub predicate: Option<Predicate>,
    pub join: Option<JoinSpec>,
    pub order_by: Option<String>,
    pub limit: Option<usize>,
    pub distinct: bool,
    pub aggregate: Option<(AggregateFunction, Option<String>)>,
}

/// What the planner needs about a table besides its row-count statistics:
/// whether a usable secondary index exists for a given column.
pub trait IndexCatalog {
    fn index_for(&self, table: &str, column: &str) -> Option<std::sync::Arc<BTreeIndex>>;
}

const INDEX_SELECTIVITY_THRESHOLD: f64 = 0.20;

/// Produce a plan for `request`. `query_memory_budget` gates the
/// HIGH-level memory annotation pass.
pub fn plan_select(
    request: &SelectRequest,
    stats: &StatisticsManager,
    indexes: &dyn IndexCatalog,
    level: OptimizationLevel,
    query_memory_budget: usize,
    default_selectivity: f64,
) -> Plan {
    let table_stats = stats.table_stats(&request.db, &request.table);
    let row_count = table_stats.as_ref().map(|s| s.row_count).unwrap_or(0);

    let mut plan = match &request.predicate {
        None => Plan::leaf(
            PlanNode::TableScan {
                table: request.table.clone(),
            },
            row_count,
            cost::table_scan_cost(row_count),
        ),
        Some(predicate) => plan_single_predicate(
            request,
            predicate,
            row_count,
            &table_stats,
            indexes,
            default_selectivity,
        ),
    };

    if let Some(join) = &request.join {
        plan = plan_join(plan, join, stats, request, level);
    }

    if !request.columns.is_empty() {
        plan.root = PlanNode::Project {
            input: Box::new(plan.root),
            columns: request.columns.clone(),
        };
    }

    if let Some(order_by) = &request.order_by {
        plan.root = PlanNode::Sort {
            input: Box::new(plan.root),
            column: order_by.clone(),
        };
    }

    if request.distinct {
        plan.root = PlanNode::Distinct {
            input: Box::new(plan.root),
        };
    }

    if let Some((function, column)) = &request.aggregate {
        plan.root = PlanNode::Aggregate {
            input: Box::new(plan.root),
            function: *function,
            column: column.clone(),
        };
    }

    if let Some(limit) = request.limit {
        plan.root = PlanNode::Limit {
            input: Box::new(plan.root),
            count: limit,
        };
    }

    if level >= OptimizationLevel::High {
        annotate_memory(&mut plan, query_memory_budget);
    }

    plan
}

fn plan_single_predicate(
    request: &SelectRequest,
    predicate: &Predicate,
    row_count: u64,
    table_stats: &Option<crate::statistics::TableStatistics>,
    indexes: &dyn IndexCatalog,
    default_selectivity: f64,
) -> Plan {
    let column_stats = table_stats
        .as_ref()
        .and_then(|s| s.columns.get(&predicate.column));

    let selectivity = match (predicate.op, column_stats) {
        (CompareOp::Eq, Some(cs)) => cs.equality_selectivity(default_selectivity),
        (CompareOp::Eq, None) => default_selectivity,
        (_, Some(cs)) => cs.range_selectivity(None, None, default_selectivity),
        (_, None) => default_selectivity,
    };

    let has_index = indexes
        .index_for(&request.table, &predicate.column)
        .is_some();
    let matched_rows = ((row_count as f64) * selectivity).round() as u64;

    let mut candidates: Vec<Plan> = vec![Plan::leaf(
        PlanNode::TableScan {
            table: request.table.clone(),
        },
        row_count,
        cost::table_scan_cost(row_count),
    )];

    if has_index && selectivity < INDEX_SELECTIVITY_THRESHOLD {
        let node = if predicate.op == CompareOp::Eq {
            PlanNode::IndexScan {
                table: request.table.clone(),
                column: predicate.column.clone(),
                value: predicate.value.clone(),
            }
        } else {
            let (low, high) = range_bounds(predicate);
            PlanNode::RangeScan {
                table: request.table.clone(),
                column: predicate.column.clone(),
                low,
                high,
            }
        };
        candidates.push(Plan::leaf(
            node,
            matched_rows,
            cost::index_scan_cost(row_count, matched_rows),
        ));
    }

    // `candidates[0]` is always the table scan; an index/range candidate,
    // when present, is pushed after it. `<=` lets a later candidate win a
    // tied cost so ties resolve index/range > scan, per plan preference
    // (mirrors the `<=` hash-vs-nested-loop tie-break in `plan_join` below).
    let mut best = candidates.remove(0);
    for candidate in candidates {
        if candidate.estimated_cost <= best.estimated_cost {
            best = candidate;
        }
    }

    best.root = PlanNode::Filter {
        input: Box::new(best.root),
        predicate: predicate.clone(),
    };
    best
}

fn range_bounds(predicate: &Predicate) -> (Option<Value>, Option<Value>) {
    match predicate.op {
        CompareOp::Lt | CompareOp::Lte => (None, Some(predicate.value.clone())),
        CompareOp::Gt | CompareOp::Gte => (Some(predicate.value.clone()), None),
        _ => (None, None),
    }
}

fn plan_join(
    left: Plan,
    join: &JoinSpec,
    stats: &StatisticsManager,
    request: &SelectRequest,
    level: OptimizationLevel,
) -> Plan {
    let right_rows = stats
        .table_stats(&request.db, &join.right_table)
        .map(|s| s.row_count)
        .unwrap_or(0);
    let right = Plan::leaf(
        PlanNode::TableScan {
            table: join.right_table.clone(),
        },
        right_rows,
        cost::table_scan_cost(right_rows),
    );

    let nested_cost = cost::nested_loop_cost(left.estimated_rows, right.estimated_rows);
    let hash_cost = cost::hash_join_cost(left.estimated_rows, right.estimated_rows);

    // At MEDIUM and above, consider swapping build/probe sides (a minimal
    // stand-in for full join-order search: smaller side builds).
    let (build, probe, build_first) = if level >= OptimizationLevel::Medium
        && right.estimated_rows < left.estimated_rows
    {
        (right.clone(), left.clone(), false)
    } else {
        (left.clone(), right.clone(), true)
    };

    if hash_cost <= nested_cost {
        let estimated_rows = left.estimated_rows.max(right.estimated_rows);
        Plan::leaf(
            PlanNode::HashJoinProbe {
                build: Box::new(PlanNode::BuildHashTable {
                    input: Box::new(build.root),
                    key_column: if build_first {
                        join.left_column.clone()
                    } else {
                        join.right_column.clone()
                    },
                }),
                probe: Box::new(probe.root),
                join: join.clone(),
            },
            estimated_rows,
            hash_cost,
        )
    } else {
        Plan::leaf(
            PlanNode::NestedLoopJoin {
                left: Box::new(left.root),
                right: Box::new(right.root),
                join: join.clone(),
            },
            left.estimated_rows.saturating_mul(right.estimated_rows.max(1)),
            nested_cost,
        )
    }
}

fn annotate_memory(plan: &mut Plan, query_memory_budget: usize) {
    // Rough per-row footprint estimate; good enough to decide spill, not
    // to size an allocator.
    const BYTES_PER_ROW: usize = 256;
    plan.estimated_memory_usage = plan.estimated_rows as usize * BYTES_PER_ROW;
    plan.spill = plan.estimated_memory_usage > query_memory_budget;
}
