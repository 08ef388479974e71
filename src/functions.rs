//! Aggregate function reduction.

use std::collections::HashSet;

use crate::ast::AggregateFunc;
use crate::binder::AggregateSpec;
use crate::error::{Error, Result};
use crate::eval::{eval, EvalRow};
use crate::types::{compare_values, KeyValue, Value};

/// Compute one aggregate over a group's rows.
///
/// Null inputs are ignored by every function; SUM/AVG/MIN/MAX over an empty
/// or all-Null input yield Null while COUNT yields 0. COUNT with no
/// argument counts rows outright. DISTINCT restricts the input multiset to
/// distinct values (under grouping equality, so 1 and 1.0 collapse) before
/// reducing.
pub fn compute_aggregate(spec: &AggregateSpec, rows: &[&[Value]]) -> Result<Value> {
    let arg = match &spec.arg {
        Some(arg) => arg,
        None => return Ok(Value::Integer(rows.len() as i64)),
    };

    let mut values = Vec::with_capacity(rows.len());
    for row in rows {
        let value = eval(arg, EvalRow::Base(row))?;
        if !value.is_null() {
            values.push(value);
        }
    }

    if spec.distinct {
        let mut seen = HashSet::new();
        values.retain(|v| seen.insert(KeyValue::from_value(v)));
    }

    match spec.func {
        AggregateFunc::Count => Ok(Value::Integer(values.len() as i64)),
        AggregateFunc::Sum => sum(&values),
        AggregateFunc::Avg => avg(&values),
        AggregateFunc::Min => extremum(&values, std::cmp::Ordering::Less, "min"),
        AggregateFunc::Max => extremum(&values, std::cmp::Ordering::Greater, "max"),
    }
}

/// Integer inputs sum to Integer; any Float input promotes the total.
fn sum(values: &[Value]) -> Result<Value> {
    if values.is_empty() {
        return Ok(Value::Null);
    }
    let mut int_total: i64 = 0;
    let mut float_total: f64 = 0.0;
    let mut is_float = false;
    for value in values {
        match value {
            Value::Integer(i) => {
                int_total += i;
                float_total += *i as f64;
            }
            Value::Float(f) => {
                is_float = true;
                float_total += f;
            }
            other => {
                return Err(Error::UnaryType {
                    op: "sum".to_string(),
                    operand: other.type_name(),
                })
            }
        }
    }
    if is_float {
        Ok(Value::Float(float_total))
    } else {
        Ok(Value::Integer(int_total))
    }
}

fn avg(values: &[Value]) -> Result<Value> {
    if values.is_empty() {
        return Ok(Value::Null);
    }
    let mut total = 0.0;
    for value in values {
        match value {
            Value::Integer(i) => total += *i as f64,
            Value::Float(f) => total += f,
            other => {
                return Err(Error::UnaryType {
                    op: "avg".to_string(),
                    operand: other.type_name(),
                })
            }
        }
    }
    Ok(Value::Float(total / values.len() as f64))
}

fn extremum(values: &[Value], keep: std::cmp::Ordering, op: &str) -> Result<Value> {
    let mut best: Option<&Value> = None;
    for value in values {
        best = Some(match best {
            None => value,
            Some(current) => {
                if compare_values(op, value, current)? == keep {
                    value
                } else {
                    current
                }
            }
        });
    }
    Ok(best.cloned().unwrap_or(Value::Null))
}
