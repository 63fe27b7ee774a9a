use super::{BufferedRows, Connection, RowHandle, StatementInfo};
use crate::error::{QbError, QbResult};
use crate::naming::TableNaming;
use crate::value::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

/// A scripted response for [`RecordingConnection`].
#[derive(Debug)]
pub enum ScriptedResult {
    /// Rows to hand back.
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    /// A write that touched `affected` rows and optionally generated an id.
    Write {
        affected: u64,
        insert_id: Option<i64>,
    },
    /// A driver failure with this message.
    Error(String),
}

impl ScriptedResult {
    /// Rows built from column names and positional values.
    pub fn rows<C: Into<String>>(
        columns: impl IntoIterator<Item = C>,
        rows: Vec<Vec<Value>>,
    ) -> Self {
        Self::Rows {
            columns: columns.into_iter().map(Into::into).collect(),
            rows,
        }
    }

    /// A single-cell result, the shape aggregate queries read back.
    pub fn scalar(column: &str, value: impl Into<Value>) -> Self {
        Self::rows([column], vec![vec![value.into()]])
    }

    pub fn write(affected: u64) -> Self {
        Self::Write {
            affected,
            insert_id: None,
        }
    }

    pub fn insert(affected: u64, insert_id: i64) -> Self {
        Self::Write {
            affected,
            insert_id: Some(insert_id),
        }
    }
}

/// Driver-side failure reported by [`RecordingConnection`].
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ScriptedFailure(pub String);

#[derive(Debug, Default)]
struct RecordingState {
    executed: Vec<String>,
    script: VecDeque<ScriptedResult>,
    affected_rows: u64,
    num_rows: u64,
    insert_id: Option<i64>,
    last: StatementInfo,
}

/// In-memory connection that records every statement and replays scripted results.
///
/// Statements without a scripted response return an empty result. Useful for
/// testing code that builds queries without a running database.
///
/// # Example
/// ```
/// use chainql::{QueryBuilder, RecordingConnection, ScriptedResult};
/// use std::sync::Arc;
///
/// let conn = Arc::new(RecordingConnection::new());
/// conn.push(ScriptedResult::scalar("aggregate", 3));
///
/// let mut qb = QueryBuilder::new(conn.clone());
/// qb.from("users")?;
/// assert_eq!(qb.count("*")?, 3);
/// assert_eq!(conn.executed(), ["SELECT COUNT(*) AS aggregate FROM users"]);
/// # Ok::<(), chainql::QbError>(())
/// ```
#[derive(Debug, Default)]
pub struct RecordingConnection {
    naming: TableNaming,
    limited_delete: bool,
    state: Mutex<RecordingState>,
}

impl RecordingConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a table prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.naming = TableNaming::new(prefix);
        self
    }

    /// Accept `DELETE ... LIMIT n`.
    pub fn with_limited_delete(mut self, enabled: bool) -> Self {
        self.limited_delete = enabled;
        self
    }

    /// Queue a response for the next statement.
    pub fn push(&self, result: ScriptedResult) -> &Self {
        self.lock().script.push_back(result);
        self
    }

    /// Every statement executed so far, oldest first.
    pub fn executed(&self) -> Vec<String> {
        self.lock().executed.clone()
    }

    /// The most recent statement, if any.
    pub fn last_sql(&self) -> Option<String> {
        self.lock().executed.last().cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RecordingState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Connection for RecordingConnection {
    fn naming(&self) -> &TableNaming {
        &self.naming
    }

    fn query(&self, sql: &str, _params: &[Value]) -> QbResult<Box<dyn RowHandle>> {
        let mut state = self.lock();
        state.executed.push(sql.to_string());
        state.last = StatementInfo {
            sql: sql.to_string(),
            ..StatementInfo::default()
        };

        match state.script.pop_front() {
            None => {
                state.affected_rows = 0;
                state.num_rows = 0;
                Ok(Box::new(BufferedRows::empty()))
            }
            Some(ScriptedResult::Rows { columns, rows }) => {
                state.num_rows = rows.len() as u64;
                state.affected_rows = rows.len() as u64;
                state.last.status = Some(format!("SELECT {}", rows.len()));
                Ok(Box::new(BufferedRows::from_values(columns, rows)))
            }
            Some(ScriptedResult::Write {
                affected,
                insert_id,
            }) => {
                state.affected_rows = affected;
                state.num_rows = 0;
                if insert_id.is_some() {
                    state.insert_id = insert_id;
                }
                state.last.status = Some(format!("OK {affected}"));
                Ok(Box::new(BufferedRows::empty()))
            }
            Some(ScriptedResult::Error(message)) => {
                state.last.error = Some(message.clone());
                Err(QbError::driver(ScriptedFailure(message)))
            }
        }
    }

    fn affected_rows(&self) -> u64 {
        self.lock().affected_rows
    }

    fn num_rows(&self) -> u64 {
        self.lock().num_rows
    }

    fn insert_id(&self) -> QbResult<Option<i64>> {
        Ok(self.lock().insert_id)
    }

    fn supports_limited_delete(&self) -> bool {
        self.limited_delete
    }

    fn last_statement(&self) -> StatementInfo {
        self.lock().last.clone()
    }
}
