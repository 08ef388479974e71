use std::cmp::Ordering;
use std::fmt;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Scalar value types.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Boolean(_) => "boolean",
        }
    }

    /// Whether the value is true under three-valued logic. Null and false
    /// are both not-true, which is what filtering cares about.
    pub fn is_true(&self) -> bool {
        matches!(self, Value::Boolean(true))
    }
}

/// Compare two non-Null values under the query comparison rules.
///
/// Integer and Float compare numerically with Integer promotion, Text
/// compares lexicographically by code point, Boolean orders false < true.
/// Any other pairing is a type error; callers supply the operator name for
/// the message. Null never reaches here: predicate comparisons involving
/// Null yield Null before ordering is consulted, and sort/grouping handle
/// Null with their own documented rules.
pub fn compare_values(op: &str, left: &Value, right: &Value) -> Result<Ordering> {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => Ok(a.cmp(b)),
        (Value::Integer(a), Value::Float(b)) => Ok(total_float_cmp(*a as f64, *b)),
        (Value::Float(a), Value::Integer(b)) => Ok(total_float_cmp(*a, *b as f64)),
        (Value::Float(a), Value::Float(b)) => Ok(total_float_cmp(*a, *b)),
        (Value::Text(a), Value::Text(b)) => Ok(a.cmp(b)),
        (Value::Boolean(a), Value::Boolean(b)) => Ok(a.cmp(b)),
        _ => Err(Error::Type {
            op: op.to_string(),
            left: left.type_name(),
            right: right.type_name(),
        }),
    }
}

fn total_float_cmp(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Normalized key for grouping and DISTINCT, with hashing and equality.
///
/// Grouping deliberately diverges from predicate semantics: two Nulls key
/// the same group, and 1 and 1.0 are the same key (integral floats are
/// folded back to Integer so the numeric promotion rule survives hashing).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyValue {
    Null,
    Integer(i64),
    Float(u64),
    Text(String),
    Boolean(bool),
}

impl KeyValue {
    pub fn from_value(value: &Value) -> KeyValue {
        match value {
            Value::Null => KeyValue::Null,
            Value::Integer(i) => KeyValue::Integer(*i),
            Value::Float(f) => {
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                    KeyValue::Integer(*f as i64)
                } else {
                    // Normalize -0.0 and NaN so bit-equality matches value
                    // equality.
                    let f = if *f == 0.0 { 0.0 } else { *f };
                    let f = if f.is_nan() { f64::NAN } else { f };
                    KeyValue::Float(f.to_bits())
                }
            }
            Value::Text(s) => KeyValue::Text(s.clone()),
            Value::Boolean(b) => KeyValue::Boolean(*b),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "\"{}\"", s),
            Value::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Boolean(b) => serializer.serialize_bool(*b),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ValueVisitor;

        impl<'de> de::Visitor<'de> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON scalar (null, number, string, or boolean)")
            }

            fn visit_unit<E: de::Error>(self) -> std::result::Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_none<E: de::Error>(self) -> std::result::Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<Value, E> {
                Ok(Value::Boolean(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Value, E> {
                Ok(Value::Integer(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Value, E> {
                i64::try_from(v)
                    .map(Value::Integer)
                    .map_err(|_| E::custom(format!("integer {} out of range", v)))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Value, E> {
                Ok(Value::Float(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Value, E> {
                Ok(Value::Text(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<Value, E> {
                Ok(Value::Text(v))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}
