//! The connection collaborator.
//!
//! The builder never talks to a database directly. Everything it needs from the
//! outside world (quoting, table naming, executing, write metadata) goes through
//! the [`Connection`] trait, which is injected into [`QueryBuilder::new`].
//!
//! [`QueryBuilder::new`]: crate::QueryBuilder::new

mod recording;

#[cfg(feature = "postgres")]
mod postgres;

pub use recording::{RecordingConnection, ScriptedResult};

#[cfg(feature = "postgres")]
pub use postgres::{PgConfig, PgConnection};

use crate::error::QbResult;
use crate::naming::{TableNaming, TableRef};
use crate::row::Row;
use crate::value::Value;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;

/// Services a builder needs from a database connection.
///
/// Implementors provide quoting, naming and execution; the default methods
/// delegate table naming to the [`TableNaming`] returned by [`Connection::naming`].
/// Aliases are not the connection's business: each statement keeps its own
/// [`Aliases`](crate::naming::Aliases).
pub trait Connection: Send + Sync {
    /// Escape and literal-wrap a scalar.
    fn quote(&self, value: &Value) -> String {
        quote_literal(value)
    }

    /// Naming service (table prefix).
    fn naming(&self) -> &TableNaming;

    /// SQL form of a parsed table reference (`app_users u`).
    fn make_table_name(&self, table: &TableRef) -> String {
        self.naming().make_table_name(table)
    }

    /// Apply the table prefix.
    fn prefix_table(&self, name: &str) -> String {
        self.naming().prefix_table(name)
    }

    /// Execute a statement and hand back its (single-use) row handle.
    fn query(&self, sql: &str, params: &[Value]) -> QbResult<Box<dyn RowHandle>>;

    /// Rows affected by the last write.
    fn affected_rows(&self) -> u64;

    /// Rows returned by the last statement.
    fn num_rows(&self) -> u64;

    /// Id generated by the last insert, if the driver knows one.
    fn insert_id(&self) -> QbResult<Option<i64>>;

    /// Whether `DELETE ... LIMIT n` is accepted.
    fn supports_limited_delete(&self) -> bool {
        false
    }

    /// Diagnostics about the last executed statement.
    fn last_statement(&self) -> StatementInfo;
}

impl<C: Connection + ?Sized> Connection for Arc<C> {
    fn quote(&self, value: &Value) -> String {
        (**self).quote(value)
    }

    fn naming(&self) -> &TableNaming {
        (**self).naming()
    }

    fn make_table_name(&self, table: &TableRef) -> String {
        (**self).make_table_name(table)
    }

    fn prefix_table(&self, name: &str) -> String {
        (**self).prefix_table(name)
    }

    fn query(&self, sql: &str, params: &[Value]) -> QbResult<Box<dyn RowHandle>> {
        (**self).query(sql, params)
    }

    fn affected_rows(&self) -> u64 {
        (**self).affected_rows()
    }

    fn num_rows(&self) -> u64 {
        (**self).num_rows()
    }

    fn insert_id(&self) -> QbResult<Option<i64>> {
        (**self).insert_id()
    }

    fn supports_limited_delete(&self) -> bool {
        (**self).supports_limited_delete()
    }

    fn last_statement(&self) -> StatementInfo {
        (**self).last_statement()
    }
}

/// Diagnostics the connection keeps about its last statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatementInfo {
    /// SQL text as sent to the server.
    pub sql: String,
    /// Command tag or driver status, when known.
    pub status: Option<String>,
    /// Driver error message, when the statement failed.
    pub error: Option<String>,
}

/// Raw handle produced by [`Connection::query`].
pub trait RowHandle: Send {
    /// Column names of the result.
    fn columns(&self) -> &[String];

    /// Fetch the next row, `None` once exhausted.
    fn fetch_row(&mut self) -> QbResult<Option<Row>>;
}

/// A handle over rows that are already in memory.
#[derive(Debug, Default)]
pub struct BufferedRows {
    columns: Vec<String>,
    rows: VecDeque<Row>,
}

impl BufferedRows {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows: rows.into(),
        }
    }

    /// A handle for statements that return no rows.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from column names and positional values.
    pub fn from_values(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let shared: Arc<[String]> = columns.clone().into();
        let rows = rows
            .into_iter()
            .map(|values| Row::new(shared.clone(), values))
            .collect();
        Self::new(columns, rows)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl RowHandle for BufferedRows {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn fetch_row(&mut self) -> QbResult<Option<Row>> {
        Ok(self.rows.pop_front())
    }
}

/// Standard SQL literal rendering.
///
/// Text doubles embedded single quotes; non-finite floats are quoted so the
/// server parses them as special values.
pub fn quote_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) if f.is_finite() => f.to_string(),
        Value::Float(f) => quote_text(&f.to_string()),
        Value::Text(s) => quote_text(s),
        Value::Json(v) => quote_text(&v.to_string()),
    }
}

fn quote_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        if ch == '\'' {
            out.push('\'');
        }
        out.push(ch);
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals() {
        assert_eq!(quote_literal(&Value::Null), "NULL");
        assert_eq!(quote_literal(&Value::Bool(true)), "TRUE");
        assert_eq!(quote_literal(&Value::Int(-3)), "-3");
        assert_eq!(quote_literal(&Value::Float(1.5)), "1.5");
        assert_eq!(quote_literal(&Value::Float(f64::NAN)), "'NaN'");
        assert_eq!(quote_literal(&Value::from("O'Brien")), "'O''Brien'");
        assert_eq!(
            quote_literal(&Value::Json(serde_json::json!({"a": [1]}))),
            r#"'{"a":[1]}'"#
        );
    }

    #[test]
    fn buffered_rows_drain_in_order() {
        let mut rows = BufferedRows::from_values(
            vec!["n".into()],
            vec![vec![Value::Int(1)], vec![Value::Int(2)]],
        );
        assert_eq!(rows.columns(), ["n".to_string()]);
        assert_eq!(rows.fetch_row().unwrap().unwrap().get("n"), Some(&Value::Int(1)));
        assert_eq!(rows.fetch_row().unwrap().unwrap().get("n"), Some(&Value::Int(2)));
        assert!(rows.fetch_row().unwrap().is_none());
    }
}
