//! Access to executed statements.
//!
//! A [`ResultSet`] wraps the single-use [`RowHandle`] a connection returned.
//! Buffered accessors ([`result`](ResultSet::result), [`row`](ResultSet::row),
//! [`next`](ResultSet::next), ...) drain the handle into memory on first use;
//! [`unbuffered_row`](ResultSet::unbuffered_row) reads one row at a time.
//!
//! Write metadata (`affected_rows`, `num_rows`, `insert_id`) is always read
//! from the connection.

use crate::connection::{Connection, RowHandle, StatementInfo};
use crate::error::QbResult;
use crate::row::{FromRow, Row};
use crate::value::Value;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Diagnostics for an executed statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryDetails {
    pub sql: String,
    pub affected_rows: u64,
    pub num_rows: u64,
    pub insert_id: Option<i64>,
    pub last_statement: StatementInfo,
}

/// The result of one executed statement.
pub struct ResultSet {
    handle: Box<dyn RowHandle>,
    conn: Arc<dyn Connection>,
    sql: String,
    rows: Vec<Row>,
    buffered: bool,
    cursor: usize,
    stream_pos: usize,
}

impl std::fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSet")
            .field("sql", &self.sql)
            .field("buffered", &self.buffered)
            .field("cached_rows", &self.rows.len())
            .field("cursor", &self.cursor)
            .finish_non_exhaustive()
    }
}

impl ResultSet {
    pub fn new(handle: Box<dyn RowHandle>, conn: Arc<dyn Connection>, sql: impl Into<String>) -> Self {
        Self {
            handle,
            conn,
            sql: sql.into(),
            rows: Vec::new(),
            buffered: false,
            cursor: 0,
            stream_pos: 0,
        }
    }

    /// SQL that produced this result.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn columns(&self) -> &[String] {
        self.handle.columns()
    }

    fn buffer(&mut self) -> QbResult<&[Row]> {
        if !self.buffered {
            while let Some(row) = self.handle.fetch_row()? {
                self.rows.push(row);
            }
            self.buffered = true;
        }
        Ok(&self.rows)
    }

    // ==================== Whole result ====================

    /// All rows as column-addressable [`Row`]s.
    pub fn result(&mut self) -> QbResult<Vec<Row>> {
        Ok(self.buffer()?.to_vec())
    }

    /// All rows as positional value lists.
    pub fn result_array(&mut self) -> QbResult<Vec<Vec<Value>>> {
        Ok(self.buffer()?.iter().map(|r| r.values().to_vec()).collect())
    }

    /// All rows as JSON objects.
    pub fn result_json(&mut self) -> QbResult<Vec<serde_json::Value>> {
        Ok(self.buffer()?.iter().map(Row::to_json).collect())
    }

    /// All rows deserialized into `T`, matching fields by column name.
    pub fn result_as<T: DeserializeOwned>(&mut self) -> QbResult<Vec<T>> {
        self.buffer()?.iter().map(Row::deserialize::<T>).collect()
    }

    /// All rows mapped through [`FromRow`].
    pub fn result_from<T: FromRow>(&mut self) -> QbResult<Vec<T>> {
        self.buffer()?.iter().map(T::from_row).collect()
    }

    // ==================== Cursor ====================

    /// Row at `index`, which becomes the cursor position.
    pub fn row(&mut self, index: usize) -> QbResult<Option<Row>> {
        let row = self.buffer()?.get(index).cloned();
        if row.is_some() {
            self.cursor = index;
        }
        Ok(row)
    }

    pub fn first(&mut self) -> QbResult<Option<Row>> {
        self.row(0)
    }

    /// Same as [`first`](Self::first).
    pub fn one(&mut self) -> QbResult<Option<Row>> {
        self.first()
    }

    pub fn last(&mut self) -> QbResult<Option<Row>> {
        let len = self.buffer()?.len();
        match len.checked_sub(1) {
            Some(index) => self.row(index),
            None => Ok(None),
        }
    }

    /// Row after the cursor. The cursor stays put at the end.
    pub fn next(&mut self) -> QbResult<Option<Row>> {
        let index = self.cursor + 1;
        self.row(index)
    }

    /// Row before the cursor. The cursor stays put at the start.
    pub fn previous(&mut self) -> QbResult<Option<Row>> {
        match self.cursor.checked_sub(1) {
            Some(index) => self.row(index),
            None => Ok(None),
        }
    }

    /// Fetch the next row without buffering the result.
    ///
    /// Rows read this way are not seen by the buffered accessors afterwards.
    pub fn unbuffered_row(&mut self) -> QbResult<Option<Row>> {
        if self.buffered {
            let row = self.rows.get(self.stream_pos).cloned();
            if row.is_some() {
                self.stream_pos += 1;
            }
            return Ok(row);
        }
        self.handle.fetch_row()
    }

    pub fn first_as<T: DeserializeOwned>(&mut self) -> QbResult<Option<T>> {
        self.first()?.map(|r| r.deserialize()).transpose()
    }

    pub fn row_as<T: DeserializeOwned>(&mut self, index: usize) -> QbResult<Option<T>> {
        self.row(index)?.map(|r| r.deserialize()).transpose()
    }

    // ==================== Metadata ====================

    pub fn affected_rows(&self) -> u64 {
        self.conn.affected_rows()
    }

    pub fn num_rows(&self) -> u64 {
        self.conn.num_rows()
    }

    pub fn insert_id(&self) -> QbResult<Option<i64>> {
        self.conn.insert_id()
    }

    /// Metadata merged with the connection's last-statement diagnostics.
    pub fn details(&self) -> QbResult<QueryDetails> {
        Ok(QueryDetails {
            sql: self.sql.clone(),
            affected_rows: self.affected_rows(),
            num_rows: self.num_rows(),
            insert_id: self.insert_id()?,
            last_statement: self.conn.last_statement(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{BufferedRows, RecordingConnection, ScriptedResult};
    use serde::Deserialize;

    fn three_rows() -> ResultSet {
        let conn = Arc::new(RecordingConnection::new());
        let handle = BufferedRows::from_values(
            vec!["id".into(), "name".into()],
            vec![
                vec![Value::Int(1), Value::from("a")],
                vec![Value::Int(2), Value::from("b")],
                vec![Value::Int(3), Value::from("c")],
            ],
        );
        ResultSet::new(Box::new(handle), conn, "SELECT id, name FROM t")
    }

    fn id(row: Option<Row>) -> Option<i64> {
        row.map(|r| r.try_get("id").unwrap())
    }

    #[test]
    fn test_shapes() {
        let mut rs = three_rows();
        assert_eq!(rs.result().unwrap().len(), 3);
        assert_eq!(rs.result_array().unwrap()[1], vec![Value::Int(2), Value::from("b")]);
        assert_eq!(
            rs.result_json().unwrap()[2],
            serde_json::json!({"id": 3, "name": "c"})
        );
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: i64,
        name: String,
    }

    #[test]
    fn test_named_class() {
        let mut rs = three_rows();
        let items: Vec<Item> = rs.result_as().unwrap();
        assert_eq!(items[0], Item { id: 1, name: "a".into() });
        let second: Option<Item> = rs.row_as(1).unwrap();
        assert_eq!(second.unwrap().name, "b");
    }

    #[test]
    fn test_cursor_navigation() {
        let mut rs = three_rows();
        assert_eq!(id(rs.next().unwrap()), Some(2));
        assert_eq!(id(rs.next().unwrap()), Some(3));
        assert_eq!(id(rs.next().unwrap()), None);
        assert_eq!(id(rs.previous().unwrap()), Some(2));
        assert_eq!(id(rs.previous().unwrap()), Some(1));
        assert_eq!(id(rs.previous().unwrap()), None);
        assert_eq!(id(rs.row(2).unwrap()), Some(3));
        assert_eq!(id(rs.previous().unwrap()), Some(2));
        assert_eq!(id(rs.last().unwrap()), Some(3));
        assert_eq!(id(rs.one().unwrap()), Some(1));
        assert_eq!(id(rs.row(9).unwrap()), None);
    }

    #[test]
    fn test_unbuffered_reads_one_at_a_time() {
        let mut rs = three_rows();
        assert_eq!(id(rs.unbuffered_row().unwrap()), Some(1));
        // the buffered view starts after the streamed row
        assert_eq!(rs.result().unwrap().len(), 2);
        assert_eq!(id(rs.unbuffered_row().unwrap()), Some(2));
    }

    #[test]
    fn test_empty_result() {
        let conn = Arc::new(RecordingConnection::new());
        let mut rs = ResultSet::new(Box::new(BufferedRows::empty()), conn, "DELETE FROM t");
        assert!(rs.first().unwrap().is_none());
        assert!(rs.last().unwrap().is_none());
        assert!(rs.result().unwrap().is_empty());
    }

    #[test]
    fn test_metadata_comes_from_connection() {
        let conn = Arc::new(RecordingConnection::new());
        conn.push(ScriptedResult::insert(1, 77));
        let handle = conn.query("INSERT INTO t (a) VALUES (1)", &[]).unwrap();
        let rs = ResultSet::new(handle, conn.clone(), "INSERT INTO t (a) VALUES (1)");

        assert_eq!(rs.affected_rows(), 1);
        assert_eq!(rs.insert_id().unwrap(), Some(77));
        let details = rs.details().unwrap();
        assert_eq!(details.last_statement.sql, "INSERT INTO t (a) VALUES (1)");
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["insert_id"], 77);
    }
}
