//! Query document definitions.
//!
//! The query arrives as a structured JSON document; these types deserialize
//! it directly. Expression nodes are an untagged enum distinguished by their
//! required field (`column`, `literal`, `unary`, `op`, `aggregate`, `case`).

use std::fmt;

use serde::de::{self, Deserializer};
use serde::Deserialize;

use crate::types::Value;

/// A complete query document.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Query {
    pub select: Vec<SelectItem>,
    pub from: Vec<TableRef>,
    #[serde(rename = "where", default)]
    pub where_clause: Option<Expr>,
    #[serde(default)]
    pub group_by: Vec<Expr>,
    #[serde(default)]
    pub having: Option<Expr>,
    #[serde(default)]
    pub order_by: Vec<OrderByItem>,
    #[serde(default)]
    pub limit: Option<u64>,
}

impl Query {
    /// Decode a query document.
    pub fn from_json(json: &str) -> crate::error::Result<Query> {
        Ok(serde_json::from_str(json)?)
    }
}

/// One SELECT list entry: the literal string `"*"` or an expression with an
/// optional output alias.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SelectItem {
    Star(Star),
    Expr(SelectExpr),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectExpr {
    pub expr: Expr,
    #[serde(rename = "as", default)]
    pub alias: Option<String>,
}

/// Marker for the `"*"` SELECT entry.
#[derive(Debug, Clone)]
pub struct Star;

impl<'de> Deserialize<'de> for Star {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s == "*" {
            Ok(Star)
        } else {
            Err(de::Error::custom(format!(
                "expected \"*\", found \"{}\"",
                s
            )))
        }
    }
}

/// A FROM entry: source table name, optional alias, optional join predicate.
/// The predicate is only legal on entries after the first and may reference
/// only tables already joined in.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableRef {
    pub source: String,
    #[serde(rename = "as", default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub on: Option<Expr>,
}

impl TableRef {
    /// The name this table is addressed by inside the query.
    pub fn alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.source)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderByItem {
    pub expr: Expr,
    #[serde(default)]
    pub dir: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// Expression tree node.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Expr {
    Column {
        column: ColumnRef,
    },
    Literal {
        literal: Value,
    },
    Unary {
        unary: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Aggregate {
        aggregate: AggregateFunc,
        #[serde(default)]
        arg: Option<Box<Expr>>,
        #[serde(default)]
        distinct: bool,
    },
    Case {
        case: Vec<WhenClause>,
        #[serde(rename = "else", default)]
        else_branch: Option<Box<Expr>>,
    },
}

impl Expr {
    /// Whether this tree contains an aggregate call at any depth.
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expr::Column { .. } | Expr::Literal { .. } => false,
            Expr::Unary { operand, .. } => operand.contains_aggregate(),
            Expr::Binary { left, right, .. } => {
                left.contains_aggregate() || right.contains_aggregate()
            }
            Expr::Aggregate { .. } => true,
            Expr::Case { case, else_branch } => {
                case.iter()
                    .any(|w| w.when.contains_aggregate() || w.then.contains_aggregate())
                    || else_branch
                        .as_ref()
                        .is_some_and(|e| e.contains_aggregate())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnRef {
    #[serde(default)]
    pub table: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WhenClause {
    pub when: Expr,
    pub then: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum UnaryOp {
    #[serde(rename = "-")]
    Neg,
    #[serde(rename = "not")]
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum BinaryOp {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
    #[serde(rename = "%")]
    Mod,
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "<>")]
    NotEq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    LtEq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    GtEq,
    #[serde(rename = "and")]
    And,
    #[serde(rename = "or")]
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Neg => write!(f, "-"),
            UnaryOp::Not => write!(f, "not"),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for AggregateFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AggregateFunc::Count => "count",
            AggregateFunc::Sum => "sum",
            AggregateFunc::Avg => "avg",
            AggregateFunc::Min => "min",
            AggregateFunc::Max => "max",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(t) => write!(f, "{}.{}", t, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Renders an expression back to readable text, used for synthesized output
/// column labels and error messages.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column { column } => write!(f, "{}", column),
            Expr::Literal { literal } => write!(f, "{}", literal),
            Expr::Unary { unary, operand } => match unary {
                UnaryOp::Neg => write!(f, "-{}", operand),
                UnaryOp::Not => write!(f, "not {}", operand),
            },
            Expr::Binary { op, left, right } => write!(f, "{} {} {}", left, op, right),
            Expr::Aggregate {
                aggregate,
                arg,
                distinct,
            } => {
                let inner = match arg {
                    Some(e) if *distinct => format!("distinct {}", e),
                    Some(e) => e.to_string(),
                    None => "*".to_string(),
                };
                write!(f, "{}({})", aggregate, inner)
            }
            Expr::Case { case, else_branch } => {
                write!(f, "case")?;
                for clause in case {
                    write!(f, " when {} then {}", clause.when, clause.then)?;
                }
                if let Some(e) = else_branch {
                    write!(f, " else {}", e)?;
                }
                write!(f, " end")
            }
        }
    }
}
