//! In-memory tables and their document form.
//!
//! A table document is `{"columns": [...], "rows": [[...], ...]}`. Tables
//! are immutable once loaded; the evaluator builds new tables rather than
//! mutating sources.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Value;

/// An ordered list of column names plus an ordered list of fixed-width rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Table {
        Table { columns, rows }
    }

    /// Decode a table document and check its shape: column names must be
    /// unique within the table and every row must match the column count.
    pub fn from_json(json: &str) -> Result<Table> {
        let table: Table = serde_json::from_str(json)?;
        table.validate()?;
        Ok(table)
    }

    fn validate(&self) -> Result<()> {
        for (i, name) in self.columns.iter().enumerate() {
            if self.columns[..i].contains(name) {
                return Err(Error::Parse(format!(
                    "duplicate column name \"{}\" in table",
                    name
                )));
            }
        }
        for (i, row) in self.rows.iter().enumerate() {
            if row.len() != self.columns.len() {
                return Err(Error::Parse(format!(
                    "row {} has {} values, expected {}",
                    i,
                    row.len(),
                    self.columns.len()
                )));
            }
        }
        Ok(())
    }

    /// Encode as a table document, one row per line.
    pub fn to_json(&self) -> String {
        let mut out = String::from("{\n    \"columns\": ");
        // Column lists and rows hold scalars only; serialization cannot fail.
        out.push_str(&serde_json::to_string(&self.columns).unwrap());
        out.push_str(",\n    \"rows\": [");
        for (i, row) in self.rows.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str("\n        ");
            out.push_str(&serde_json::to_string(row).unwrap());
        }
        if self.rows.is_empty() {
            out.push_str("]\n}\n");
        } else {
            out.push_str("\n    ]\n}\n");
        }
        out
    }
}
