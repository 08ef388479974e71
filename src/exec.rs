//! Query execution pipeline.
//!
//! Stages run in a fixed order, each fully materializing its output:
//! join/scan builds the working relation, WHERE filters it, grouping
//! partitions and reduces, HAVING filters groups, projection computes the
//! SELECT list, and sort & limit order and truncate the result. Binding has
//! already resolved every reference, so stages index rows positionally.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::ast::{Direction, Query};
use crate::binder::{self, BoundExpr, BoundQuery};
use crate::error::Result;
use crate::eval::{eval, EvalRow};
use crate::functions::compute_aggregate;
use crate::table::Table;
use crate::types::{compare_values, KeyValue, Value};

/// Evaluate a query against a name-indexed set of loaded tables.
pub fn evaluate(query: &Query, tables: &HashMap<String, Table>) -> Result<Table> {
    let bound = binder::bind(query, tables)?;

    let rows = scan_and_join(&bound, tables)?;
    let rows = apply_filter(rows, bound.where_clause.as_ref())?;

    let columns: Vec<String> = bound.select.iter().map(|(_, label)| label.clone()).collect();

    let mut output = match &bound.grouping {
        None => project_rows(&bound, &rows)?,
        Some(grouping) => {
            let groups = partition(&rows, &grouping.keys)?;
            let mut output = Vec::with_capacity(groups.len());
            for group in &groups {
                let row_refs: Vec<&[Value]> = group.rows.iter().map(|r| r.as_slice()).collect();
                let mut aggs = Vec::with_capacity(grouping.aggregates.len());
                for spec in &grouping.aggregates {
                    aggs.push(compute_aggregate(spec, &row_refs)?);
                }
                let ctx = EvalRow::Group {
                    keys: &group.keys,
                    aggs: &aggs,
                };
                if let Some(having) = &bound.having {
                    if !eval(having, ctx)?.is_true() {
                        continue;
                    }
                }
                output.push(project_one(&bound, ctx)?);
            }
            output
        }
    };

    sort_and_limit(&mut output, &bound)?;

    Ok(Table::new(
        columns,
        output.into_iter().map(|row| row.values).collect(),
    ))
}

/// A projected output row together with its evaluated ORDER BY keys.
struct OutputRow {
    values: Vec<Value>,
    sort_keys: Vec<Value>,
}

/// Nested-loop join over the FROM list, leftmost table outermost, original
/// row order preserved. Join predicates drop candidate rows that do not
/// evaluate to true.
fn scan_and_join(bound: &BoundQuery, tables: &HashMap<String, Table>) -> Result<Vec<Vec<Value>>> {
    let mut rows: Vec<Vec<Value>> = Vec::new();
    for (k, source) in bound.sources.iter().enumerate() {
        // The binder already checked presence.
        let table = &tables[&source.name];
        if k == 0 {
            rows = table.rows.clone();
            continue;
        }
        let mut joined = Vec::new();
        for left in &rows {
            for right in &table.rows {
                let mut candidate = left.clone();
                candidate.extend(right.iter().cloned());
                if let Some(on) = &source.on {
                    if !eval(on, EvalRow::Base(&candidate))?.is_true() {
                        continue;
                    }
                }
                joined.push(candidate);
            }
        }
        rows = joined;
    }
    Ok(rows)
}

/// Keep rows whose predicate evaluates to Boolean true; false and Null both
/// drop the row. Relative order is preserved.
fn apply_filter(rows: Vec<Vec<Value>>, predicate: Option<&BoundExpr>) -> Result<Vec<Vec<Value>>> {
    let predicate = match predicate {
        Some(p) => p,
        None => return Ok(rows),
    };
    let mut kept = Vec::with_capacity(rows.len());
    for row in rows {
        if eval(predicate, EvalRow::Base(&row))?.is_true() {
            kept.push(row);
        }
    }
    Ok(kept)
}

struct Group {
    keys: Vec<Value>,
    rows: Vec<Vec<Value>>,
}

/// Partition rows by their evaluated key tuple, enumerating groups in order
/// of first appearance. Hash iteration order is not deterministic, so a side
/// list carries the enumeration order. Null keys group together, a
/// documented departure from predicate Null semantics. With no GROUP BY
/// expressions there is a single implicit group, present even for zero
/// input rows.
fn partition(rows: &[Vec<Value>], key_exprs: &[BoundExpr]) -> Result<Vec<Group>> {
    if key_exprs.is_empty() {
        return Ok(vec![Group {
            keys: Vec::new(),
            rows: rows.to_vec(),
        }]);
    }
    let mut index: HashMap<Vec<KeyValue>, usize> = HashMap::new();
    let mut groups: Vec<Group> = Vec::new();
    for row in rows {
        let mut keys = Vec::with_capacity(key_exprs.len());
        for expr in key_exprs {
            keys.push(eval(expr, EvalRow::Base(row))?);
        }
        let hashable: Vec<KeyValue> = keys.iter().map(KeyValue::from_value).collect();
        match index.get(&hashable) {
            Some(&i) => groups[i].rows.push(row.clone()),
            None => {
                index.insert(hashable, groups.len());
                groups.push(Group {
                    keys,
                    rows: vec![row.clone()],
                });
            }
        }
    }
    Ok(groups)
}

fn project_rows(bound: &BoundQuery, rows: &[Vec<Value>]) -> Result<Vec<OutputRow>> {
    rows.iter()
        .map(|row| project_one(bound, EvalRow::Base(row)))
        .collect()
}

/// Evaluate the SELECT list and ORDER BY keys against the same working row,
/// so ORDER BY may reference expressions that are not projected.
fn project_one(bound: &BoundQuery, ctx: EvalRow<'_>) -> Result<OutputRow> {
    let mut values = Vec::with_capacity(bound.select.len());
    for (expr, _) in &bound.select {
        values.push(eval(expr, ctx)?);
    }
    let mut sort_keys = Vec::with_capacity(bound.order_by.len());
    for (expr, _) in &bound.order_by {
        sort_keys.push(eval(expr, ctx)?);
    }
    Ok(OutputRow { values, sort_keys })
}

/// Multi-key stable sort followed by truncation. Null sorts before all
/// non-Null values regardless of direction; ties keep input order.
fn sort_and_limit(output: &mut Vec<OutputRow>, bound: &BoundQuery) -> Result<()> {
    if !bound.order_by.is_empty() {
        // Incomparable key types must fail the query before sorting starts;
        // the comparator handed to sort_by must be a total order.
        check_sort_keys(output, bound.order_by.len())?;
        output.sort_by(|a, b| {
            compare_sort_keys(&a.sort_keys, &b.sort_keys, &bound.order_by)
                .unwrap_or(Ordering::Equal)
        });
    }
    if let Some(limit) = bound.limit {
        output.truncate(limit);
    }
    Ok(())
}

/// Check each sort-key column for a comparable type mix. Comparability is
/// by type class (Integer and Float compare with each other) and transitive
/// within a class, so comparing every non-Null value against the first one
/// found is enough.
fn check_sort_keys(output: &[OutputRow], key_count: usize) -> Result<()> {
    for i in 0..key_count {
        let mut witness: Option<&Value> = None;
        for row in output {
            let value = &row.sort_keys[i];
            if value.is_null() {
                continue;
            }
            match witness {
                None => witness = Some(value),
                Some(first) => {
                    compare_values("order by", first, value)?;
                }
            }
        }
    }
    Ok(())
}

fn compare_sort_keys(
    a: &[Value],
    b: &[Value],
    order: &[(BoundExpr, Direction)],
) -> Result<Ordering> {
    for (i, (_, dir)) in order.iter().enumerate() {
        let ord = match (a[i].is_null(), b[i].is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => {
                let ord = compare_values("order by", &a[i], &b[i])?;
                match dir {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            }
        };
        if ord != Ordering::Equal {
            return Ok(ord);
        }
    }
    Ok(Ordering::Equal)
}
