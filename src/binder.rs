//! Schema binding: resolving every column reference in a query to a
//! concrete position in the working relation before any row is processed.
//!
//! The binder builds the combined column namespace of the FROM list, expands
//! `*`, collects aggregate calls, and validates GROUP BY projection rules.
//! All structural errors (unknown/ambiguous columns, misplaced aggregates,
//! non-grouped projections) surface here, never mid-scan.

use std::collections::HashMap;

use crate::ast::{
    AggregateFunc, BinaryOp, ColumnRef, Direction, Expr, Query, SelectItem, UnaryOp,
};
use crate::error::{Error, Result};
use crate::table::Table;

/// An expression with every column reference resolved to a flat position.
///
/// `Column` indexes the working relation's row. `Key` and `Agg` index a
/// group's key tuple and computed aggregate values; they only appear in
/// expressions evaluated against group results.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundExpr {
    Column(usize),
    Key(usize),
    Agg(usize),
    Literal(crate::types::Value),
    Unary {
        op: UnaryOp,
        operand: Box<BoundExpr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<BoundExpr>,
        right: Box<BoundExpr>,
    },
    Case {
        branches: Vec<(BoundExpr, BoundExpr)>,
        else_branch: Option<Box<BoundExpr>>,
    },
}

/// A single aggregate computation, deduplicated across SELECT, HAVING, and
/// ORDER BY. `arg` is bound against the base working relation; `None` means
/// COUNT(*).
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateSpec {
    pub func: AggregateFunc,
    pub arg: Option<BoundExpr>,
    pub distinct: bool,
}

#[derive(Debug, Clone)]
pub struct Grouping {
    /// Key expressions, evaluated per base row.
    pub keys: Vec<BoundExpr>,
    /// Aggregates computed once per group.
    pub aggregates: Vec<AggregateSpec>,
}

/// One FROM entry after binding. The join predicate, if any, is bound
/// against the columns of this table and everything to its left.
#[derive(Debug, Clone)]
pub struct Source {
    pub name: String,
    pub on: Option<BoundExpr>,
}

/// A fully bound query, ready for execution.
#[derive(Debug, Clone)]
pub struct BoundQuery {
    pub sources: Vec<Source>,
    pub where_clause: Option<BoundExpr>,
    pub grouping: Option<Grouping>,
    /// Output expressions paired with their column labels. When grouping is
    /// active these are expressed over `Key`/`Agg` slots, otherwise over
    /// base-row columns.
    pub select: Vec<(BoundExpr, String)>,
    pub having: Option<BoundExpr>,
    pub order_by: Vec<(BoundExpr, Direction)>,
    pub limit: Option<usize>,
}

/// The combined column namespace of the FROM list, in join order.
struct Schema {
    /// (table alias, column name) per working-relation position.
    columns: Vec<(String, String)>,
    /// Working-relation width after each FROM entry is joined in.
    prefix_widths: Vec<usize>,
}

impl Schema {
    fn build(query: &Query, tables: &HashMap<String, Table>) -> Result<Schema> {
        let mut columns = Vec::new();
        let mut prefix_widths = Vec::new();
        for table_ref in &query.from {
            let table = tables
                .get(&table_ref.source)
                .ok_or_else(|| Error::TableNotFound(table_ref.source.clone()))?;
            let alias = table_ref.alias();
            if columns.iter().any(|(a, _): &(String, String)| a == alias) {
                return Err(Error::Semantic(format!(
                    "Duplicate table alias \"{}\" in FROM.",
                    alias
                )));
            }
            for name in &table.columns {
                columns.push((alias.to_string(), name.clone()));
            }
            prefix_widths.push(columns.len());
        }
        Ok(Schema {
            columns,
            prefix_widths,
        })
    }

    fn width(&self) -> usize {
        self.columns.len()
    }

    /// Resolve a reference against the first `limit` columns. Qualified
    /// names must match an alias; bare names must match exactly one column.
    fn resolve(&self, column: &ColumnRef, limit: usize) -> Result<usize> {
        let visible = &self.columns[..limit];
        match &column.table {
            Some(table) => {
                if !visible.iter().any(|(a, _)| a == table) {
                    return Err(Error::TableNotFound(table.clone()));
                }
                visible
                    .iter()
                    .position(|(a, n)| a == table && n == &column.name)
                    .ok_or_else(|| Error::UnknownColumn(column.to_string()))
            }
            None => {
                let matches: Vec<usize> = visible
                    .iter()
                    .enumerate()
                    .filter(|(_, (_, n))| n == &column.name)
                    .map(|(i, _)| i)
                    .collect();
                match matches.len() {
                    0 => Err(Error::UnknownColumn(column.name.clone())),
                    1 => Ok(matches[0]),
                    _ => {
                        let tables = matches
                            .iter()
                            .map(|&i| format!("\"{}\"", visible[i].0))
                            .collect::<Vec<_>>()
                            .join(", ");
                        Err(Error::AmbiguousColumn {
                            column: column.name.clone(),
                            tables,
                        })
                    }
                }
            }
        }
    }

    /// Output label for a `*`-expanded column: the bare name when it is
    /// unambiguous across the working relation, `alias.name` otherwise.
    fn star_label(&self, index: usize) -> String {
        let (alias, name) = &self.columns[index];
        let count = self.columns.iter().filter(|(_, n)| n == name).count();
        if count == 1 {
            name.clone()
        } else {
            format!("{}.{}", alias, name)
        }
    }
}

/// Bind a query against its loaded tables. This is the single validation
/// pass; execution assumes a `BoundQuery` is internally consistent.
pub fn bind(query: &Query, tables: &HashMap<String, Table>) -> Result<BoundQuery> {
    if query.from.is_empty() {
        return Err(Error::Semantic("FROM list cannot be empty.".to_string()));
    }
    if query.select.is_empty() {
        return Err(Error::Semantic("SELECT list cannot be empty.".to_string()));
    }

    let schema = Schema::build(query, tables)?;

    // Join predicates see only the tables joined so far.
    let mut sources = Vec::with_capacity(query.from.len());
    for (k, table_ref) in query.from.iter().enumerate() {
        let on = match &table_ref.on {
            Some(expr) => {
                if k == 0 {
                    return Err(Error::Semantic(
                        "The first FROM entry cannot have a join predicate.".to_string(),
                    ));
                }
                reject_aggregates(expr, "a join predicate")?;
                Some(bind_scalar(&schema, expr, schema.prefix_widths[k])?)
            }
            None => None,
        };
        sources.push(Source {
            name: table_ref.source.clone(),
            on,
        });
    }

    let where_clause = match &query.where_clause {
        Some(expr) => {
            reject_aggregates(expr, "the WHERE clause")?;
            Some(bind_scalar(&schema, expr, schema.width())?)
        }
        None => None,
    };

    // Star expansion happens before grouping analysis so that the expanded
    // column references are validated like explicit ones.
    let mut select_items: Vec<(Expr, String)> = Vec::new();
    for item in &query.select {
        match item {
            SelectItem::Star(_) => {
                for i in 0..schema.width() {
                    let (alias, name) = schema.columns[i].clone();
                    let expr = Expr::Column {
                        column: ColumnRef {
                            table: Some(alias),
                            name,
                        },
                    };
                    select_items.push((expr, schema.star_label(i)));
                }
            }
            SelectItem::Expr(sel) => {
                let label = match &sel.alias {
                    Some(alias) => alias.clone(),
                    None => match &sel.expr {
                        Expr::Column { column } => column.name.clone(),
                        other => other.to_string(),
                    },
                };
                select_items.push((sel.expr.clone(), label));
            }
        }
    }

    let grouping_active = !query.group_by.is_empty()
        || query.having.is_some()
        || select_items.iter().any(|(e, _)| e.contains_aggregate())
        || query.order_by.iter().any(|o| o.expr.contains_aggregate());

    let limit = query.limit.map(|n| n as usize);

    if !grouping_active {
        let select = select_items
            .into_iter()
            .map(|(expr, label)| Ok((bind_scalar(&schema, &expr, schema.width())?, label)))
            .collect::<Result<Vec<_>>>()?;
        let order_by = query
            .order_by
            .iter()
            .map(|o| Ok((bind_scalar(&schema, &o.expr, schema.width())?, o.dir)))
            .collect::<Result<Vec<_>>>()?;
        return Ok(BoundQuery {
            sources,
            where_clause,
            grouping: None,
            select,
            having: None,
            order_by,
            limit,
        });
    }

    let mut keys = Vec::with_capacity(query.group_by.len());
    for expr in &query.group_by {
        reject_aggregates(expr, "GROUP BY")?;
        keys.push(bind_scalar(&schema, expr, schema.width())?);
    }

    let mut grouped = GroupedBinder {
        schema: &schema,
        keys: &keys,
        aggregates: Vec::new(),
    };

    let select = select_items
        .into_iter()
        .map(|(expr, label)| Ok((grouped.bind(&expr)?, label)))
        .collect::<Result<Vec<_>>>()?;
    let having = query
        .having
        .as_ref()
        .map(|expr| grouped.bind(expr))
        .transpose()?;
    let order_by = query
        .order_by
        .iter()
        .map(|o| Ok((grouped.bind(&o.expr)?, o.dir)))
        .collect::<Result<Vec<_>>>()?;

    // Move the collected aggregates out before `keys`, which `grouped` still
    // borrows, can itself be moved.
    let aggregates = grouped.aggregates;

    Ok(BoundQuery {
        sources,
        where_clause,
        grouping: Some(Grouping { keys, aggregates }),
        select,
        having,
        order_by,
        limit,
    })
}

/// Bind an aggregate-free expression against the first `limit` columns.
fn bind_scalar(schema: &Schema, expr: &Expr, limit: usize) -> Result<BoundExpr> {
    match expr {
        Expr::Column { column } => Ok(BoundExpr::Column(schema.resolve(column, limit)?)),
        Expr::Literal { literal } => Ok(BoundExpr::Literal(literal.clone())),
        Expr::Unary { unary, operand } => Ok(BoundExpr::Unary {
            op: *unary,
            operand: Box::new(bind_scalar(schema, operand, limit)?),
        }),
        Expr::Binary { op, left, right } => Ok(BoundExpr::Binary {
            op: *op,
            left: Box::new(bind_scalar(schema, left, limit)?),
            right: Box::new(bind_scalar(schema, right, limit)?),
        }),
        Expr::Aggregate { .. } => Err(Error::Semantic(format!(
            "Aggregate call \"{}\" is not allowed here.",
            expr
        ))),
        Expr::Case { case, else_branch } => {
            let branches = case
                .iter()
                .map(|clause| {
                    Ok((
                        bind_scalar(schema, &clause.when, limit)?,
                        bind_scalar(schema, &clause.then, limit)?,
                    ))
                })
                .collect::<Result<Vec<_>>>()?;
            let else_branch = match else_branch {
                Some(e) => Some(Box::new(bind_scalar(schema, e, limit)?)),
                None => None,
            };
            Ok(BoundExpr::Case {
                branches,
                else_branch,
            })
        }
    }
}

fn reject_aggregates(expr: &Expr, place: &str) -> Result<()> {
    match first_aggregate(expr) {
        Some(call) => Err(Error::Semantic(format!(
            "Aggregate call \"{}\" is not allowed in {}.",
            call, place
        ))),
        None => Ok(()),
    }
}

fn first_aggregate(expr: &Expr) -> Option<&Expr> {
    match expr {
        Expr::Column { .. } | Expr::Literal { .. } => None,
        Expr::Unary { operand, .. } => first_aggregate(operand),
        Expr::Binary { left, right, .. } => {
            first_aggregate(left).or_else(|| first_aggregate(right))
        }
        Expr::Aggregate { .. } => Some(expr),
        Expr::Case { case, else_branch } => case
            .iter()
            .find_map(|w| first_aggregate(&w.when).or_else(|| first_aggregate(&w.then)))
            .or_else(|| else_branch.as_ref().and_then(|e| first_aggregate(e))),
    }
}

/// Binds SELECT/HAVING/ORDER BY expressions of a grouped query.
///
/// A subtree structurally equal to a GROUP BY expression (after binding, so
/// `x` and `t.x` meet) reads that group's key value; an aggregate call
/// becomes a computed-slot read, deduplicated across consumers. A column
/// reference covered by neither is the classic not-grouped projection error.
struct GroupedBinder<'a> {
    schema: &'a Schema,
    keys: &'a [BoundExpr],
    aggregates: Vec<AggregateSpec>,
}

impl GroupedBinder<'_> {
    fn bind(&mut self, expr: &Expr) -> Result<BoundExpr> {
        if let Expr::Aggregate {
            aggregate,
            arg,
            distinct,
        } = expr
        {
            let arg = match arg {
                Some(inner) => {
                    if inner.contains_aggregate() {
                        return Err(Error::Semantic(format!(
                            "Aggregate calls cannot be nested: \"{}\".",
                            expr
                        )));
                    }
                    Some(bind_scalar(self.schema, inner, self.schema.width())?)
                }
                None => {
                    if *aggregate != AggregateFunc::Count {
                        return Err(Error::Semantic(format!(
                            "Aggregate \"{}\" requires an argument.",
                            aggregate
                        )));
                    }
                    None
                }
            };
            let spec = AggregateSpec {
                func: *aggregate,
                arg,
                distinct: *distinct,
            };
            let slot = match self.aggregates.iter().position(|s| *s == spec) {
                Some(i) => i,
                None => {
                    self.aggregates.push(spec);
                    self.aggregates.len() - 1
                }
            };
            return Ok(BoundExpr::Agg(slot));
        }

        if !expr.contains_aggregate() {
            let bound = bind_scalar(self.schema, expr, self.schema.width())?;
            if let Some(i) = self.keys.iter().position(|k| *k == bound) {
                return Ok(BoundExpr::Key(i));
            }
            if let Expr::Column { column } = expr {
                return Err(Error::Semantic(format!(
                    "Column reference \"{}\" must appear in GROUP BY or be used in an aggregate function.",
                    column
                )));
            }
            if let BoundExpr::Literal(_) = bound {
                return Ok(bound);
            }
        }

        match expr {
            Expr::Unary { unary, operand } => Ok(BoundExpr::Unary {
                op: *unary,
                operand: Box::new(self.bind(operand)?),
            }),
            Expr::Binary { op, left, right } => Ok(BoundExpr::Binary {
                op: *op,
                left: Box::new(self.bind(left)?),
                right: Box::new(self.bind(right)?),
            }),
            Expr::Case { case, else_branch } => {
                let branches = case
                    .iter()
                    .map(|clause| Ok((self.bind(&clause.when)?, self.bind(&clause.then)?)))
                    .collect::<Result<Vec<_>>>()?;
                let else_branch = match else_branch {
                    Some(e) => Some(Box::new(self.bind(e)?)),
                    None => None,
                };
                Ok(BoundExpr::Case {
                    branches,
                    else_branch,
                })
            }
            // Column and Literal are fully handled above; Aggregate is
            // handled by the early return.
            _ => unreachable!("leaf expression reached structural recursion"),
        }
    }
}
