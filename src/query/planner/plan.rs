//! Plan tree types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison operator recognized in a `where` clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Predicate {
    pub column: String,
    pub op: CompareOp,
    pub value: Value,
}

/// A join between two already-resolved tables on an equality column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinSpec {
    pub left_table: String,
    pub right_table: String,
    pub left_column: String,
    pub right_column: String,
}

/// Optimizer aggressiveness. Ordered: higher levels are supersets of the
/// rewrites enabled by lower ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OptimizationLevel {
    None,
    Low,
    Medium,
    High,
    Experimental,
}

impl Default for OptimizationLevel {
    fn default() -> Self {
        OptimizationLevel::Medium
    }
}

/// One node of the plan tree. Operators are composed bottom-up; the root
/// is what the executor drives.
#[derive(Debug, Clone)]
pub enum PlanNode {
    TableScan {
        table: String,
    },
    IndexScan {
        table: String,
        column: String,
        value: Value,
    },
    RangeScan {
        table: String,
        column: String,
        low: Option<Value>,
        high: Option<Value>,
    },
    Filter {
        input: Box<PlanNode>,
        predicate: Predicate,
    },
    Project {
        input: Box<PlanNode>,
        columns: Vec<String>,
    },
    NestedLoopJoin {
        left: Box<PlanNode>,
        right: Box<PlanNode>,
        join: JoinSpec,
    },
    BuildHashTable {
        input: Box<PlanNode>,
        key_column: String,
    },
    HashJoinProbe {
        build: Box<PlanNode>,
        probe: Box<PlanNode>,
        join: JoinSpec,
    },
    Sort {
        input: Box<PlanNode>,
        column: String,
    },
    Aggregate {
        input: Box<PlanNode>,
        function: AggregateFunction,
        column: Option<String>,
    },
    Distinct {
        input: Box<PlanNode>,
    },
    Limit {
        input: Box<PlanNode>,
        count: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

/// A candidate or chosen plan, annotated with its estimated cost and
/// whether memory pressure forces a spill.
#[derive(Debug, Clone)]
pub struct Plan {
    pub root: PlanNode,
    pub estimated_rows: u64,
    pub estimated_cost: f64,
    pub estimated_memory_usage: usize,
    pub spill: bool,
}

impl Plan {
    pub fn leaf(root: PlanNode, estimated_rows: u64, estimated_cost: f64) -> Self {
        Self {
            root,
            estimated_rows,
            estimated_cost,
            estimated_memory_usage: 0,
            spill: false,
        }
    }
}
