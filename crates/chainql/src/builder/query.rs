use super::compile::compile;
use super::state::{
    Assignments, BuilderId, CrudMode, JoinClause, JoinOn, JoinType, Order, QueryState, Source,
    SubQuery,
};
use crate::config::ExecConfig;
use crate::connection::Connection;
use crate::error::{QbError, QbResult};
use crate::naming::{IntoNames, TableRef, resolve_expression, validate_ident};
use crate::value::Value;
use serde::Serialize;
use std::sync::Arc;

/// Fluent SQL statement builder.
///
/// Clause methods accumulate state; [`sql`](Self::sql) and
/// [`execute`](Self::execute) compile it and reset the builder so it can be
/// reused for the next statement.
///
/// # Example
/// ```
/// use chainql::{Order, QueryBuilder, RecordingConnection};
/// use std::sync::Arc;
///
/// let mut qb = QueryBuilder::new(Arc::new(RecordingConnection::new()));
/// qb.from("users u")?
///     .select("u.id, u.name")
///     .where_("u.status", "active")?
///     .order_by("u.id", Order::Desc)
///     .limit(10);
///
/// assert_eq!(
///     qb.sql()?,
///     "SELECT u.id, u.name FROM users u WHERE u.status = 'active' ORDER BY u.id DESC LIMIT 10"
/// );
/// # Ok::<(), chainql::QbError>(())
/// ```
pub struct QueryBuilder {
    pub(crate) conn: Arc<dyn Connection>,
    pub(crate) config: ExecConfig,
    pub(crate) state: QueryState,
    id: BuilderId,
}

impl std::fmt::Debug for QueryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Cloning gives a fresh builder on the same connection, not a copy of the
/// accumulated clauses. Use [`QueryBuilder::snapshot`] to copy state.
impl Clone for QueryBuilder {
    fn clone(&self) -> Self {
        self.fresh()
    }
}

impl QueryBuilder {
    /// Create a builder on an injected connection.
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self {
            conn,
            config: ExecConfig::default(),
            state: QueryState::default(),
            id: BuilderId::next(),
        }
    }

    pub fn with_config(mut self, config: ExecConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ExecConfig {
        &self.config
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.conn
    }

    pub fn id(&self) -> BuilderId {
        self.id
    }

    /// Current statement intent.
    pub fn mode(&self) -> CrudMode {
        self.state.mode
    }

    /// A new, empty builder sharing this one's connection and config.
    pub fn fresh(&self) -> Self {
        Self::new(self.conn.clone()).with_config(self.config.clone())
    }

    /// Copy of the accumulated state.
    pub fn snapshot(&self) -> QueryState {
        self.state.clone()
    }

    /// Replace the accumulated state.
    pub fn restore(&mut self, state: QueryState) -> &mut Self {
        self.state = state;
        self
    }

    /// Drop everything accumulated so far.
    pub fn reset(&mut self) -> &mut Self {
        self.state = QueryState::default();
        self
    }

    // ==================== Tables ====================

    /// Add tables. Accepts `"users"`, `"users u, posts p"` or a list.
    ///
    /// Each name goes through the connection's naming service, which applies
    /// the table prefix. Aliases are registered on this statement only.
    pub fn from<T: IntoNames>(&mut self, tables: T) -> QbResult<&mut Self> {
        let names = tables.into_names();
        if names.is_empty() {
            return Err(QbError::invalid("Table name cannot be empty"));
        }
        for name in names {
            let table = self.table_name(&name)?;
            self.state.push_table(table);
        }
        Ok(self)
    }

    fn table_name(&mut self, reference: &str) -> QbResult<String> {
        let table = TableRef::parse(reference)?;
        self.state.aliases.register(&table);
        Ok(self.conn.make_table_name(&table))
    }

    /// Rewrite `table.field` references against the prefix and this
    /// statement's aliases.
    pub(crate) fn resolve(&self, expr: &str) -> String {
        resolve_expression(&*self.conn, &self.state.aliases, expr)
    }

    /// Alias of [`from`](Self::from).
    pub fn table<T: IntoNames>(&mut self, tables: T) -> QbResult<&mut Self> {
        self.from(tables)
    }

    /// Compile a SELECT without a FROM clause.
    pub fn without_table(&mut self) -> &mut Self {
        self.state.source = Source::Tableless;
        self
    }

    /// Compile the current state as a subquery and reset the builder.
    pub fn subquery(&mut self) -> QbResult<SubQuery> {
        let sql = self.sql()?;
        Ok(SubQuery {
            sql,
            origin: Some(self.id),
        })
    }

    /// Add a derived table: `(<sub>) alias`.
    pub fn from_subquery(&mut self, sub: SubQuery, alias: &str) -> QbResult<&mut Self> {
        if sub.origin == Some(self.id) {
            return Err(QbError::invalid("A builder cannot be used as its own subquery"));
        }
        if sub.sql.trim().is_empty() {
            return Err(QbError::invalid("Subquery is empty"));
        }
        validate_ident(alias, false)?;
        self.state.aliases.register_derived(alias);
        self.state.push_table(format!("({}) {}", sub.sql, alias));
        Ok(self)
    }

    /// Add a derived table built by `f` on a fresh builder.
    pub fn from_subquery_with<F>(&mut self, alias: &str, f: F) -> QbResult<&mut Self>
    where
        F: FnOnce(&mut QueryBuilder) -> QbResult<()>,
    {
        let mut sub = self.fresh();
        f(&mut sub)?;
        let sub = sub.subquery()?;
        self.from_subquery(sub, alias)
    }

    // ==================== Projection ====================

    /// Add projected fields. `table.field` references are resolved.
    pub fn select<T: IntoNames>(&mut self, fields: T) -> &mut Self {
        self.state.force_select();
        for field in fields.into_names() {
            let field = self.resolve(&field);
            self.state.fields.push(field);
        }
        self
    }

    /// Add projected fields verbatim.
    pub fn select_raw(&mut self, expr: &str) -> &mut Self {
        self.state.force_select();
        if !expr.trim().is_empty() {
            self.state.fields.push(expr.trim().to_string());
        }
        self
    }

    pub fn distinct(&mut self) -> &mut Self {
        self.state.force_select();
        self.state.distinct = true;
        self
    }

    // ==================== Joins ====================

    /// Join `table` on column pairs, e.g. `&[("users.id", "posts.user_id")]`.
    pub fn join(
        &mut self,
        table: &str,
        on: &[(&str, &str)],
        kind: JoinType,
    ) -> QbResult<&mut Self> {
        if on.is_empty() {
            return Err(QbError::invalid(format!("Join to '{table}' has no conditions")));
        }
        self.state.force_select();
        let table = self.table_name(table)?;
        let pairs = on
            .iter()
            .map(|(l, r)| (self.resolve(l.trim()), self.resolve(r.trim())))
            .collect();
        self.state.joins.push(JoinClause {
            kind,
            table,
            on: JoinOn::Pairs(pairs),
        });
        Ok(self)
    }

    /// Join with the type given as text (`"left outer"`), validated against [`JoinType`].
    pub fn join_kind(
        &mut self,
        table: &str,
        on: &[(&str, &str)],
        kind: &str,
    ) -> QbResult<&mut Self> {
        let kind: JoinType = kind.parse()?;
        self.join(table, on, kind)
    }

    /// Join on a raw condition. `table.field` references in it are resolved.
    pub fn join_raw(&mut self, table: &str, on: &str, kind: JoinType) -> QbResult<&mut Self> {
        if on.trim().is_empty() {
            return Err(QbError::invalid(format!("Join to '{table}' has no conditions")));
        }
        self.state.force_select();
        let table = self.table_name(table)?;
        let on = self.resolve(on.trim());
        self.state.joins.push(JoinClause {
            kind,
            table,
            on: JoinOn::Raw(on),
        });
        Ok(self)
    }

    pub fn inner_join(&mut self, table: &str, on: &[(&str, &str)]) -> QbResult<&mut Self> {
        self.join(table, on, JoinType::Inner)
    }

    pub fn left_join(&mut self, table: &str, on: &[(&str, &str)]) -> QbResult<&mut Self> {
        self.join(table, on, JoinType::Left)
    }

    pub fn right_join(&mut self, table: &str, on: &[(&str, &str)]) -> QbResult<&mut Self> {
        self.join(table, on, JoinType::Right)
    }

    pub fn full_join(&mut self, table: &str, on: &[(&str, &str)]) -> QbResult<&mut Self> {
        self.join(table, on, JoinType::FullOuter)
    }

    // ==================== Grouping, ordering, paging ====================

    pub fn order_by(&mut self, field: &str, order: Order) -> &mut Self {
        self.state.force_select();
        let field = self.resolve(field.trim());
        self.state.order.push(format!("{} {}", field, order.as_sql()));
        self
    }

    /// Add an ORDER BY term verbatim (`"RANDOM()"`, `"name NULLS LAST"`).
    pub fn order_by_raw(&mut self, expr: &str) -> &mut Self {
        self.state.force_select();
        if !expr.trim().is_empty() {
            self.state.order.push(expr.trim().to_string());
        }
        self
    }

    pub fn group_by<T: IntoNames>(&mut self, fields: T) -> &mut Self {
        self.state.force_select();
        for field in fields.into_names() {
            let field = self.resolve(&field);
            self.state.group.push(field);
        }
        self
    }

    /// Set LIMIT. Also applies to DELETE on connections that support it.
    pub fn limit(&mut self, n: u64) -> &mut Self {
        self.state.limit = Some(n);
        self
    }

    pub fn offset(&mut self, n: u64) -> &mut Self {
        self.state.force_select();
        self.state.offset = Some(n);
        self
    }

    /// LIMIT/OFFSET for a 1-based page number. Page 0 is treated as page 1.
    pub fn paginate(&mut self, page: u64, per_page: u64) -> &mut Self {
        let page = page.max(1);
        self.limit(per_page);
        self.offset((page - 1).saturating_mul(per_page))
    }

    // ==================== Writes ====================

    /// Prepare an INSERT of one record.
    pub fn insert<R: IntoRecord>(&mut self, record: R) -> QbResult<&mut Self> {
        let record = record.into_record()?;
        if record.is_empty() {
            return Err(QbError::invalid("Cannot insert an empty record"));
        }
        let (keys, values): (Vec<String>, Vec<Value>) = record.into_iter().unzip();
        self.state.mode = CrudMode::Insert;
        self.state.insert_keys = keys;
        self.state.insert_rows = vec![values];
        Ok(self)
    }

    /// Prepare a multi-row INSERT.
    ///
    /// Every record must have the same columns as the first one; their order
    /// may differ.
    pub fn insert_batch<I, R>(&mut self, records: I) -> QbResult<&mut Self>
    where
        I: IntoIterator<Item = R>,
        R: IntoRecord,
    {
        let mut keys: Vec<String> = Vec::new();
        let mut rows = Vec::new();

        for (index, record) in records.into_iter().enumerate() {
            let mut record = record.into_record()?;
            if index == 0 {
                if record.is_empty() {
                    return Err(QbError::invalid("Cannot insert an empty record"));
                }
                keys = record.iter().map(|(k, _)| k.clone()).collect();
                rows.push(record.into_iter().map(|(_, v)| v).collect());
                continue;
            }

            if record.len() != keys.len() {
                return Err(non_tabular(index));
            }
            let mut row = Vec::with_capacity(keys.len());
            for key in &keys {
                let pos = record
                    .iter()
                    .position(|(k, _)| k == key)
                    .ok_or_else(|| non_tabular(index))?;
                row.push(record.swap_remove(pos).1);
            }
            rows.push(row);
        }

        if rows.is_empty() {
            return Err(QbError::invalid("Batch insert needs at least one record"));
        }
        self.state.mode = CrudMode::Insert;
        self.state.insert_keys = keys;
        self.state.insert_rows = rows;
        Ok(self)
    }

    /// INSERT any serializable payload: an object for one row, an array of
    /// objects for several.
    pub fn insert_json<T: Serialize + ?Sized>(&mut self, payload: &T) -> QbResult<&mut Self> {
        match serde_json::to_value(payload)? {
            serde_json::Value::Array(items) => self.insert_batch(items),
            value @ serde_json::Value::Object(_) => self.insert(value),
            other => Err(QbError::invalid(format!(
                "Insert payload must be an object or an array of objects, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Prepare an UPDATE setting each column of `record`.
    pub fn update<R: IntoRecord>(&mut self, record: R) -> QbResult<&mut Self> {
        let record = record.into_record()?;
        if record.is_empty() {
            return Err(QbError::invalid("Cannot update with an empty record"));
        }
        self.state.mode = CrudMode::Update;
        self.state.assignments = Assignments::Pairs(record);
        Ok(self)
    }

    /// Prepare an UPDATE with a literal SET body (`"hits = hits + 1"`).
    pub fn update_raw(&mut self, set: &str) -> &mut Self {
        self.state.mode = CrudMode::Update;
        self.state.assignments = Assignments::Raw(set.trim().to_string());
        self
    }

    /// Prepare a DELETE.
    pub fn delete(&mut self) -> &mut Self {
        self.state.mode = CrudMode::Delete;
        self
    }

    // ==================== Compilation ====================

    /// Compile the accumulated state and reset the builder.
    ///
    /// Use [`snapshot`](Self::snapshot) / [`restore`](Self::restore) to keep
    /// the state across the call.
    pub fn sql(&mut self) -> QbResult<String> {
        let state = std::mem::take(&mut self.state);
        compile(&state, &*self.conn)
    }
}

fn non_tabular(index: usize) -> QbError {
    QbError::invalid(format!(
        "Batch insert record {index} does not have the same columns as the first record"
    ))
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Conversion into an ordered list of `(column, value)` pairs for INSERT/UPDATE.
pub trait IntoRecord {
    fn into_record(self) -> QbResult<Vec<(String, Value)>>;
}

impl<K: Into<String>, V: Into<Value>> IntoRecord for Vec<(K, V)> {
    fn into_record(self) -> QbResult<Vec<(String, Value)>> {
        Ok(self.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> IntoRecord for [(K, V); N] {
    fn into_record(self) -> QbResult<Vec<(String, Value)>> {
        Ok(self.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl IntoRecord for serde_json::Map<String, serde_json::Value> {
    fn into_record(self) -> QbResult<Vec<(String, Value)>> {
        Ok(self.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
    }
}

impl IntoRecord for serde_json::Value {
    fn into_record(self) -> QbResult<Vec<(String, Value)>> {
        match self {
            serde_json::Value::Object(map) => map.into_record(),
            other => Err(QbError::invalid(format!(
                "Record must be an object, got {}",
                json_kind(&other)
            ))),
        }
    }
}
