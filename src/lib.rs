//! sqleval: a SQL query evaluator over in-memory JSON tables.
//!
//! Queries and tables arrive as structured JSON documents; evaluation runs
//! a fixed pipeline (bind, join/scan, filter, group, project, sort/limit)
//! against fully materialized tables and produces a result table. See
//! [`exec::evaluate`] for the entry point.

pub mod ast;
pub mod binder;
pub mod error;
pub mod eval;
pub mod exec;
pub mod functions;
pub mod table;
pub mod types;

pub use ast::Query;
pub use error::{Error, Result};
pub use exec::evaluate;
pub use table::Table;
pub use types::Value;
