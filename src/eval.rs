//! Scalar expression evaluation.
//!
//! Evaluates a bound expression against one row of the working relation, or
//! against one group's result (key tuple plus computed aggregate values).
//! Null follows three-valued semantics throughout: it propagates through
//! arithmetic and comparisons, and AND/OR/NOT treat it as unknown.

use std::cmp::Ordering;

use crate::ast::{BinaryOp, UnaryOp};
use crate::binder::BoundExpr;
use crate::error::{Error, Result};
use crate::types::{compare_values, Value};

/// The evaluation context: a base row, or one group's result.
#[derive(Debug, Clone, Copy)]
pub enum EvalRow<'a> {
    Base(&'a [Value]),
    Group {
        keys: &'a [Value],
        aggs: &'a [Value],
    },
}

impl EvalRow<'_> {
    fn column(&self, i: usize) -> &Value {
        match self {
            EvalRow::Base(row) => &row[i],
            // The binder rewrites every column reference in grouped output
            // expressions into Key/Agg slots.
            EvalRow::Group { .. } => {
                unreachable!("base column reference in grouped context")
            }
        }
    }

    fn key(&self, i: usize) -> &Value {
        match self {
            EvalRow::Group { keys, .. } => &keys[i],
            EvalRow::Base(_) => unreachable!("group key reference in base context"),
        }
    }

    fn agg(&self, i: usize) -> &Value {
        match self {
            EvalRow::Group { aggs, .. } => &aggs[i],
            EvalRow::Base(_) => unreachable!("aggregate reference in base context"),
        }
    }
}

/// Evaluate a bound expression to a value.
pub fn eval(expr: &BoundExpr, row: EvalRow<'_>) -> Result<Value> {
    match expr {
        BoundExpr::Column(i) => Ok(row.column(*i).clone()),
        BoundExpr::Key(i) => Ok(row.key(*i).clone()),
        BoundExpr::Agg(i) => Ok(row.agg(*i).clone()),
        BoundExpr::Literal(value) => Ok(value.clone()),

        BoundExpr::Unary { op, operand } => {
            let value = eval(operand, row)?;
            eval_unary(*op, value)
        }

        BoundExpr::Binary { op, left, right } => {
            let lhs = eval(left, row)?;
            let rhs = eval(right, row)?;
            eval_binary(*op, lhs, rhs)
        }

        BoundExpr::Case {
            branches,
            else_branch,
        } => {
            for (when, then) in branches {
                let cond = eval(when, row)?;
                match cond {
                    Value::Boolean(true) => return eval(then, row),
                    Value::Boolean(false) | Value::Null => continue,
                    other => {
                        return Err(Error::UnaryType {
                            op: "case".to_string(),
                            operand: other.type_name(),
                        })
                    }
                }
            }
            match else_branch {
                Some(e) => eval(e, row),
                None => Ok(Value::Null),
            }
        }
    }
}

fn eval_unary(op: UnaryOp, value: Value) -> Result<Value> {
    match op {
        UnaryOp::Neg => match value {
            Value::Null => Ok(Value::Null),
            Value::Integer(i) => Ok(Value::Integer(-i)),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(Error::UnaryType {
                op: "-".to_string(),
                operand: other.type_name(),
            }),
        },
        UnaryOp::Not => match value {
            Value::Null => Ok(Value::Null),
            Value::Boolean(b) => Ok(Value::Boolean(!b)),
            other => Err(Error::UnaryType {
                op: "not".to_string(),
                operand: other.type_name(),
            }),
        },
    }
}

fn eval_binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value> {
    match op {
        BinaryOp::And | BinaryOp::Or => eval_logical(op, lhs, rhs),

        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            if lhs.is_null() || rhs.is_null() {
                return Ok(Value::Null);
            }
            eval_arithmetic(op, &lhs, &rhs)
        }

        BinaryOp::Eq
        | BinaryOp::NotEq
        | BinaryOp::Lt
        | BinaryOp::LtEq
        | BinaryOp::Gt
        | BinaryOp::GtEq => {
            if lhs.is_null() || rhs.is_null() {
                return Ok(Value::Null);
            }
            let ord = compare_values(&op.to_string(), &lhs, &rhs)?;
            Ok(Value::Boolean(match op {
                BinaryOp::Eq => ord == Ordering::Equal,
                BinaryOp::NotEq => ord != Ordering::Equal,
                BinaryOp::Lt => ord == Ordering::Less,
                BinaryOp::LtEq => ord != Ordering::Greater,
                BinaryOp::Gt => ord == Ordering::Greater,
                BinaryOp::GtEq => ord != Ordering::Less,
                _ => unreachable!(),
            }))
        }
    }
}

/// Three-valued AND/OR. Both operands are evaluated before combining, so a
/// type error on either side fails the query even when the other side would
/// decide the result.
fn eval_logical(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value> {
    let as_bool = |v: &Value| -> Result<Option<bool>> {
        match v {
            Value::Null => Ok(None),
            Value::Boolean(b) => Ok(Some(*b)),
            _ => Err(Error::Type {
                op: op.to_string(),
                left: lhs.type_name(),
                right: rhs.type_name(),
            }),
        }
    };
    let l = as_bool(&lhs)?;
    let r = as_bool(&rhs)?;
    let result = match op {
        BinaryOp::And => match (l, r) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        },
        BinaryOp::Or => match (l, r) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        },
        _ => unreachable!(),
    };
    Ok(match result {
        Some(b) => Value::Boolean(b),
        None => Value::Null,
    })
}

/// Numeric arithmetic: Integer op Integer stays Integer, any Float operand
/// promotes the result to Float. Division or modulo with no representable
/// result, a zero divisor or `i64::MIN / -1`, is Null.
fn eval_arithmetic(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value> {
    match (lhs, rhs) {
        (Value::Integer(a), Value::Integer(b)) => Ok(match op {
            BinaryOp::Add => Value::Integer(a + b),
            BinaryOp::Sub => Value::Integer(a - b),
            BinaryOp::Mul => Value::Integer(a * b),
            // checked_div/checked_rem also cover i64::MIN / -1, which has
            // no representable quotient.
            BinaryOp::Div => match a.checked_div(*b) {
                Some(q) => Value::Integer(q),
                None => Value::Null,
            },
            BinaryOp::Mod => match a.checked_rem(*b) {
                Some(r) => Value::Integer(r),
                None => Value::Null,
            },
            _ => unreachable!(),
        }),
        (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
            let a = as_f64(lhs);
            let b = as_f64(rhs);
            Ok(match op {
                BinaryOp::Add => Value::Float(a + b),
                BinaryOp::Sub => Value::Float(a - b),
                BinaryOp::Mul => Value::Float(a * b),
                BinaryOp::Div => {
                    if b == 0.0 {
                        Value::Null
                    } else {
                        Value::Float(a / b)
                    }
                }
                BinaryOp::Mod => {
                    if b == 0.0 {
                        Value::Null
                    } else {
                        Value::Float(a % b)
                    }
                }
                _ => unreachable!(),
            })
        }
        _ => Err(Error::Type {
            op: op.to_string(),
            left: lhs.type_name(),
            right: rhs.type_name(),
        }),
    }
}

fn as_f64(v: &Value) -> f64 {
    match v {
        Value::Integer(i) => *i as f64,
        Value::Float(f) => *f,
        _ => unreachable!("checked numeric"),
    }
}
