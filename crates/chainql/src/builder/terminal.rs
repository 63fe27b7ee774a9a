use super::query::QueryBuilder;
use super::state::{CrudMode, Source};
use crate::error::{QbError, QbResult};
use crate::result::ResultSet;
use crate::row::Row;
use crate::value::{FromValue, Value};
use serde::de::DeserializeOwned;
use std::time::Instant;

/// Alias of the aggregate column.
const AGGREGATE: &str = "aggregate";

/// Alias of the derived table `count` wraps grouped or paged queries in.
const COUNT_TABLE: &str = "count_table";

impl QueryBuilder {
    /// Compile, reset and run the statement.
    ///
    /// Driver errors are logged and returned unchanged.
    pub fn execute(&mut self) -> QbResult<ResultSet> {
        let mode = self.state.mode;
        let sql = self.sql()?;
        if sql.is_empty() {
            return Err(QbError::invalid("Nothing to execute"));
        }
        self.run(mode.as_str(), sql)
    }

    /// Run SQL written by hand on this builder's connection.
    pub fn query_raw(&self, sql: &str, params: &[Value]) -> QbResult<ResultSet> {
        let start = Instant::now();
        match self.conn.query(sql, params) {
            Ok(handle) => {
                crate::log::statement(&self.config, "raw", sql, start.elapsed());
                Ok(ResultSet::new(handle, self.conn.clone(), sql))
            }
            Err(err) => {
                crate::log::failure(&self.config, "raw", sql, start.elapsed(), &err);
                Err(err)
            }
        }
    }

    fn run(&self, mode: &str, sql: String) -> QbResult<ResultSet> {
        let start = Instant::now();
        match self.conn.query(&sql, &[]) {
            Ok(handle) => {
                crate::log::statement(&self.config, mode, &sql, start.elapsed());
                Ok(ResultSet::new(handle, self.conn.clone(), sql))
            }
            Err(err) => {
                crate::log::failure(&self.config, mode, &sql, start.elapsed(), &err);
                Err(err)
            }
        }
    }

    /// Execute and return every row.
    pub fn all(&mut self) -> QbResult<Vec<Row>> {
        self.execute()?.result()
    }

    /// Execute with `LIMIT 1` (unless a limit is set) and return the first row.
    pub fn first(&mut self) -> QbResult<Option<Row>> {
        if self.state.mode == CrudMode::Select && self.state.limit.is_none() {
            self.state.limit = Some(1);
        }
        self.execute()?.first()
    }

    /// Execute and return the row at `index`.
    pub fn row(&mut self, index: usize) -> QbResult<Option<Row>> {
        self.execute()?.row(index)
    }

    /// First column of the first row.
    pub fn value(&mut self) -> QbResult<Option<Value>> {
        Ok(self
            .first()?
            .and_then(|row| row.into_values().into_iter().next()))
    }

    /// Execute and deserialize every row into `T`.
    pub fn get_as<T: DeserializeOwned>(&mut self) -> QbResult<Vec<T>> {
        self.execute()?.result_as()
    }

    // ==================== Aggregates ====================

    /// Count matching rows.
    ///
    /// With DISTINCT, GROUP BY, LIMIT or OFFSET in effect the current SELECT is
    /// wrapped as a derived table and counted from outside, so the count
    /// matches the rows the query would return.
    pub fn count(&mut self, field: &str) -> QbResult<u64> {
        let field = match field.trim() {
            "" => "*",
            f => f,
        };
        self.state.force_select();

        let state = &self.state;
        let wrap = state.distinct
            || !state.group.is_empty()
            || state.limit.is_some()
            || state.offset.is_some();

        let value = if wrap {
            let inner = self.sql()?;
            let mut outer = self.fresh();
            outer.state.source = Source::Tables(vec![format!("({inner}) {COUNT_TABLE}")]);
            outer.state.fields = vec![format!("COUNT({}) AS {AGGREGATE}", bare_column(field))];
            outer.scalar()?
        } else {
            let field = self.resolve(field);
            self.state.fields = vec![format!("COUNT({field}) AS {AGGREGATE}")];
            self.state.order.clear();
            self.scalar()?
        };

        match value {
            Value::Null => Ok(0),
            value => u64::from_value(&value).map_err(|m| QbError::decode(AGGREGATE, m)),
        }
    }

    /// `SUM(field)`, or `None` when no rows match.
    pub fn sum<T: FromValue>(&mut self, field: &str) -> QbResult<Option<T>> {
        self.aggregate("SUM", field)
    }

    /// `AVG(field)`, or `None` when no rows match.
    pub fn avg<T: FromValue>(&mut self, field: &str) -> QbResult<Option<T>> {
        self.aggregate("AVG", field)
    }

    pub fn min<T: FromValue>(&mut self, field: &str) -> QbResult<Option<T>> {
        self.aggregate("MIN", field)
    }

    pub fn max<T: FromValue>(&mut self, field: &str) -> QbResult<Option<T>> {
        self.aggregate("MAX", field)
    }

    fn aggregate<T: FromValue>(&mut self, func: &str, field: &str) -> QbResult<Option<T>> {
        if field.trim().is_empty() {
            return Err(QbError::invalid(format!("{func} needs a field")));
        }
        let field = self.resolve(field.trim());
        self.state.force_select();
        self.state.fields = vec![format!("{func}({field}) AS {AGGREGATE}")];
        self.state.order.clear();

        match self.scalar()? {
            Value::Null => Ok(None),
            value => T::from_value(&value)
                .map(Some)
                .map_err(|m| QbError::decode(AGGREGATE, m)),
        }
    }

    /// Execute and return the first column of the first row, NULL when empty.
    fn scalar(&mut self) -> QbResult<Value> {
        let row = self.execute()?.first()?;
        Ok(row
            .and_then(|r| r.get_index(0).cloned())
            .unwrap_or(Value::Null))
    }
}

/// Column name as seen from outside a derived table: `users.id` -> `id`.
fn bare_column(field: &str) -> &str {
    if field.contains('(') {
        return field;
    }
    field.rsplit_once('.').map_or(field, |(_, column)| column)
}
