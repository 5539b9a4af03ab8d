//! Executor operators: lazy, finite, restartable row iterators that
//! together execute a plan tree.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;
use crate::query::planner::{AggregateFunction, CompareOp, JoinSpec, Predicate};

/// One row flowing through the executor: the row-id plus its document.
pub type Row = (Uuid, Value);

/// An operator produces rows one at a time. `None` signals a finished,
/// restartable-from-`reset` stream.
pub trait Operator: Send {
    fn next(&mut self) -> Result<Option<Row>>;

    fn reset(&mut self) -> Result<()>;
}

/// Backed by a pre-fetched row set — `TABLE_SCAN`, `INDEX_SCAN` and
/// `RANGE_SCAN` all reduce to "iterate this set of rows" once the planner
/// has already chosen which rows to fetch from the catalog.
pub struct VecScan {
    rows: Vec<Row>,
    position: usize,
}

impl VecScan {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows, position: 0 }
    }
}

impl Operator for VecScan {
    fn next(&mut self) -> Result<Option<Row>> {
        if self.position >= self.rows.len() {
            return Ok(None);
        }
        let row = self.rows[self.position].clone();
        self.position += 1;
        Ok(Some(row))
    }

    fn reset(&mut self) -> Result<()> {
        self.position = 0;
        Ok(())
    }
}

pub struct FilterOp {
    input: Box<dyn Operator>,
    predicate: Predicate,
}

impl FilterOp {
    pub fn new(input: Box<dyn Operator>, predicate: Predicate) -> Self {
        Self { input, predicate }
    }

    fn matches(&self, doc: &Value) -> bool {
        let Some(field) = doc.get(&self.predicate.column) else {
            return false;
        };
        compare(field, &self.predicate.value, self.predicate.op)
    }
}

impl Operator for FilterOp {
    fn next(&mut self) -> Result<Option<Row>> {
        while let Some((row_id, doc)) = self.input.next()? {
            if self.matches(&doc) {
                return Ok(Some((row_id, doc)));
            }
        }
        Ok(None)
    }

    fn reset(&mut self) -> Result<()> {
        self.input.reset()
    }
}

fn compare(field: &Value, target: &Value, op: CompareOp) -> bool {
    let ord = match (field.as_f64(), target.as_f64()) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => field.as_str().and_then(|a| {
            target
                .as_str()
                .map(|b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        }),
    };

    match op {
        CompareOp::Eq => field == target,
        CompareOp::Ne => field != target,
        CompareOp::Lt => ord == Some(std::cmp::Ordering::Less),
        CompareOp::Lte => matches!(ord, Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)),
        CompareOp::Gt => ord == Some(std::cmp::Ordering::Greater),
        CompareOp::Gte => matches!(
            ord,
            Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
        ),
    }
}

/// Inserted values travel as JSON strings end to end (the wire protocol has
/// no numeric literal), so aggregates need to parse them back out.
fn numeric_value(v: &Value) -> Option<f64> {
    v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

pub struct ProjectOp {
    input: Box<dyn Operator>,
    columns: Vec<String>,
}

impl ProjectOp {
    pub fn new(input: Box<dyn Operator>, columns: Vec<String>) -> Self {
        Self { input, columns }
    }
}

impl Operator for ProjectOp {
    fn next(&mut self) -> Result<Option<Row>> {
        let Some((row_id, doc)) = self.input.next()? else {
            return Ok(None);
        };
        let mut projected = serde_json::Map::new();
        if let Value::Object(fields) = &doc {
            for column in &self.columns {
                if let Some(v) = fields.get(column) {
                    projected.insert(column.clone(), v.clone());
                }
            }
        }
        Ok(Some((row_id, Value::Object(projected))))
    }

    fn reset(&mut self) -> Result<()> {
        self.input.reset()
    }
}

/// Nested-loop join: for each left row, rescan the right side.
pub struct NestedLoopJoinOp {
    left: Box<dyn Operator>,
    right: Box<dyn Operator>,
    join: JoinSpec,
    current_left: Option<Row>,
}

impl NestedLoopJoinOp {
    pub fn new(left: Box<dyn Operator>, right: Box<dyn Operator>, join: JoinSpec) -> Self {
        Self {
            left,
            right,
            join,
            current_left: None,
        }
    }
}

impl Operator for NestedLoopJoinOp {
    fn next(&mut self) -> Result<Option<Row>> {
        loop {
            if self.current_left.is_none() {
                self.current_left = self.left.next()?;
                if self.current_left.is_none() {
                    return Ok(None);
                }
                self.right.reset()?;
            }
            let (left_id, left_doc) = self.current_left.clone().unwrap();
            match self.right.next()? {
                Some((_, right_doc)) => {
                    if join_matches(&left_doc, &right_doc, &self.join) {
                        return Ok(Some((left_id, merge_docs(&left_doc, &right_doc))));
                    }
                }
                None => {
                    self.current_left = None;
                }
            }
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.current_left = None;
        self.left.reset()?;
        self.right.reset()
    }
}

fn join_matches(left: &Value, right: &Value, join: &JoinSpec) -> bool {
    match (left.get(&join.left_column), right.get(&join.right_column)) {
        (Some(l), Some(r)) => l == r,
        _ => false,
    }
}

fn merge_docs(left: &Value, right: &Value) -> Value {
    let mut merged = serde_json::Map::new();
    if let Value::Object(l) = left {
        merged.extend(l.clone());
    }
    if let Value::Object(r) = right {
        merged.extend(r.clone());
    }
    Value::Object(merged)
}

/// Materializes the build side into a hash table keyed by the join column.
pub struct BuildHashTableOp {
    input: Box<dyn Operator>,
    key_column: String,
}

impl BuildHashTableOp {
    pub fn new(input: Box<dyn Operator>, key_column: String) -> Self {
        Self { input, key_column }
    }

    /// Drains the input and returns the built table. Consumes the operator
    /// — building is a one-shot materialization step, not a row stream.
    pub fn build(mut self) -> Result<HashMap<String, Vec<Row>>> {
        let mut table: HashMap<String, Vec<Row>> = HashMap::new();
        while let Some((row_id, doc)) = self.input.next()? {
            let key = doc
                .get(&self.key_column)
                .map(|v| v.to_string())
                .unwrap_or_default();
            table.entry(key).or_default().push((row_id, doc));
        }
        Ok(table)
    }
}

/// Probes a pre-built hash table with rows from the probe side.
pub struct HashJoinProbeOp {
    probe: Box<dyn Operator>,
    build_table: HashMap<String, Vec<Row>>,
    probe_column: String,
    pending: Vec<Row>,
    current_probe_doc: Option<Value>,
}

impl HashJoinProbeOp {
    pub fn new(
        probe: Box<dyn Operator>,
        build_table: HashMap<String, Vec<Row>>,
        probe_column: String,
    ) -> Self {
        Self {
            probe,
            build_table,
            probe_column,
            pending: Vec::new(),
            current_probe_doc: None,
        }
    }
}

impl Operator for HashJoinProbeOp {
    fn next(&mut self) -> Result<Option<Row>> {
        loop {
            if let Some((_, build_doc)) = self.pending.pop() {
                let probe_doc = self.current_probe_doc.clone().unwrap();
                return Ok(Some((Uuid::new_v4(), merge_docs(&probe_doc, &build_doc))));
            }

            let Some((_, probe_doc)) = self.probe.next()? else {
                return Ok(None);
            };
            let key = probe_doc
                .get(&self.probe_column)
                .map(|v| v.to_string())
                .unwrap_or_default();
            self.current_probe_doc = Some(probe_doc);
            self.pending = self.build_table.get(&key).cloned().unwrap_or_default();
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.pending.clear();
        self.current_probe_doc = None;
        self.probe.reset()
    }
}

pub struct SortOp {
    rows: Vec<Row>,
    position: usize,
}

impl SortOp {
    pub fn new(mut input: Box<dyn Operator>, column: String) -> Result<Self> {
        let mut rows = Vec::new();
        while let Some(row) = input.next()? {
            rows.push(row);
        }
        rows.sort_by(|(_, a), (_, b)| {
            let a = a.get(&column).map(|v| v.to_string()).unwrap_or_default();
            let b = b.get(&column).map(|v| v.to_string()).unwrap_or_default();
            a.cmp(&b)
        });
        Ok(Self { rows, position: 0 })
    }
}

impl Operator for SortOp {
    fn next(&mut self) -> Result<Option<Row>> {
        if self.position >= self.rows.len() {
            return Ok(None);
        }
        let row = self.rows[self.position].clone();
        self.position += 1;
        Ok(Some(row))
    }

    fn reset(&mut self) -> Result<()> {
        self.position = 0;
        Ok(())
    }
}

pub struct DistinctOp {
    input: Box<dyn Operator>,
    seen: HashSet<String>,
}

impl DistinctOp {
    pub fn new(input: Box<dyn Operator>) -> Self {
        Self {
            input,
            seen: HashSet::new(),
        }
    }
}

impl Operator for DistinctOp {
    fn next(&mut self) -> Result<Option<Row>> {
        while let Some((row_id, doc)) = self.input.next()? {
            let key = doc.to_string();
            if self.seen.insert(key) {
                return Ok(Some((row_id, doc)));
            }
        }
        Ok(None)
    }

    fn reset(&mut self) -> Result<()> {
        self.seen.clear();
        self.input.reset()
    }
}

pub struct AggregateOp {
    result: Option<Row>,
    emitted: bool,
}

impl AggregateOp {
    pub fn new(mut input: Box<dyn Operator>, function: AggregateFunction, column: Option<String>) -> Result<Self> {
        let mut count = 0u64;
        let mut sum = 0f64;
        let mut min: Option<f64> = None;
        let mut max: Option<f64> = None;

        while let Some((_, doc)) = input.next()? {
            count += 1;
            if let Some(col) = &column {
                if let Some(v) = doc.get(col).and_then(numeric_value) {
                    sum += v;
                    min = Some(min.map_or(v, |m: f64| m.min(v)));
                    max = Some(max.map_or(v, |m: f64| m.max(v)));
                }
            }
        }

        let value = match function {
            AggregateFunction::Count => Value::from(count),
            AggregateFunction::Sum => Value::from(sum),
            AggregateFunction::Avg => {
                Value::from(if count == 0 { 0.0 } else { sum / count as f64 })
            }
            AggregateFunction::Min => min.map(Value::from).unwrap_or(Value::Null),
            AggregateFunction::Max => max.map(Value::from).unwrap_or(Value::Null),
        };

        let mut doc = serde_json::Map::new();
        doc.insert("result".to_string(), value);
        Ok(Self {
            result: Some((Uuid::nil(), Value::Object(doc))),
            emitted: false,
        })
    }
}

impl Operator for AggregateOp {
    fn next(&mut self) -> Result<Option<Row>> {
        if self.emitted {
            return Ok(None);
        }
        self.emitted = true;
        Ok(self.result.clone())
    }

    fn reset(&mut self) -> Result<()> {
        self.emitted = false;
        Ok(())
    }
}

pub struct LimitOp {
    input: Box<dyn Operator>,
    limit: usize,
    taken: usize,
}

impl LimitOp {
    pub fn new(input: Box<dyn Operator>, limit: usize) -> Self {
        Self {
            input,
            limit,
            taken: 0,
        }
    }
}

impl Operator for LimitOp {
    fn next(&mut self) -> Result<Option<Row>> {
        if self.taken >= self.limit {
            return Ok(None);
        }
        let next = self.input.next()?;
        if next.is_some() {
            self.taken += 1;
        }
        Ok(next)
    }

    fn reset(&mut self) -> Result<()> {
        self.taken = 0;
        self.input.reset()
    }
}
