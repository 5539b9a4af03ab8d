//! Cost models for candidate plans, straight out of the decision policy:
//! table-scan = rows; index-scan = log2(rows) + matched-rows;
//! nested-loop = |L|*|R|; hash-join = |L|+|R|.

pub fn table_scan_cost(rows: u64) -> f64 {
    rows as f64
}

pub fn index_scan_cost(rows: u64, matched_rows: u64) -> f64 {
    let log_term = if rows == 0 {
        0.0
    } else {
        (rows as f64).log2()
    };
    log_term + matched_rows as f64
}

pub fn range_scan_cost(rows: u64, matched_rows: u64) -> f64 {
    // Same shape as an index scan: a sparse index narrows to a range,
    // then the matched rows are scanned in order.
    index_scan_cost(rows, matched_rows)
}

pub fn nested_loop_cost(left_rows: u64, right_rows: u64) -> f64 {
    left_rows as f64 * right_rows as f64
}

pub fn hash_join_cost(left_rows: u64, right_rows: u64) -> f64 {
    left_rows as f64 + right_rows as f64
}
