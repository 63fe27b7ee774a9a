use crate::error::{QbError, QbResult};
use crate::naming::Aliases;
use crate::value::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// The statement a builder will compile to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrudMode {
    #[default]
    Select,
    Insert,
    Update,
    Delete,
}

impl CrudMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrudMode::Select => "select",
            CrudMode::Insert => "insert",
            CrudMode::Update => "update",
            CrudMode::Delete => "delete",
        }
    }
}

/// Where rows come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Resolved table names and derived tables, in call order.
    Tables(Vec<String>),
    /// Explicitly no table (`SELECT 1`).
    Tableless,
}

impl Default for Source {
    fn default() -> Self {
        Source::Tables(Vec::new())
    }
}

/// Supported join types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    FullOuter,
    LeftOuter,
    RightOuter,
}

impl JoinType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::FullOuter => "FULL OUTER JOIN",
            JoinType::LeftOuter => "LEFT OUTER JOIN",
            JoinType::RightOuter => "RIGHT OUTER JOIN",
        }
    }
}

impl FromStr for JoinType {
    type Err = QbError;

    /// Accepts `inner`, `left`, `right`, `full`, `full outer`, `left outer`,
    /// `right outer`, case-insensitive, with or without a trailing `JOIN`.
    fn from_str(s: &str) -> QbResult<Self> {
        let upper = s.to_ascii_uppercase();
        let mut words: Vec<&str> = upper.split_whitespace().collect();
        if words.last() == Some(&"JOIN") {
            words.pop();
        }
        match words.as_slice() {
            ["INNER"] => Ok(JoinType::Inner),
            ["LEFT"] => Ok(JoinType::Left),
            ["RIGHT"] => Ok(JoinType::Right),
            ["FULL"] | ["FULL", "OUTER"] => Ok(JoinType::FullOuter),
            ["LEFT", "OUTER"] => Ok(JoinType::LeftOuter),
            ["RIGHT", "OUTER"] => Ok(JoinType::RightOuter),
            _ => Err(QbError::invalid(format!("Invalid join type '{}'", s.trim()))),
        }
    }
}

/// Join condition: column pairs or a raw expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOn {
    Pairs(Vec<(String, String)>),
    Raw(String),
}

/// One JOIN, with both sides of every pair already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinClause {
    pub kind: JoinType,
    pub table: String,
    pub on: JoinOn,
}

impl JoinClause {
    pub fn to_sql(&self) -> String {
        let on = match &self.on {
            JoinOn::Pairs(pairs) => pairs
                .iter()
                .map(|(l, r)| format!("{l} = {r}"))
                .collect::<Vec<_>>()
                .join(" AND "),
            JoinOn::Raw(expr) => expr.clone(),
        };
        format!("{} {} ON {}", self.kind.as_sql(), self.table, on)
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

impl Order {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

impl FromStr for Order {
    type Err = QbError;

    fn from_str(s: &str) -> QbResult<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ASC" => Ok(Order::Asc),
            "DESC" => Ok(Order::Desc),
            other => Err(QbError::invalid(format!("Invalid sort direction '{other}'"))),
        }
    }
}

/// UPDATE payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignments {
    Pairs(Vec<(String, Value)>),
    /// A literal `SET` body.
    Raw(String),
}

impl Default for Assignments {
    fn default() -> Self {
        Assignments::Pairs(Vec::new())
    }
}

/// Everything a builder has accumulated for the next statement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryState {
    pub source: Source,
    pub fields: Vec<String>,
    pub distinct: bool,
    pub joins: Vec<JoinClause>,
    /// WHERE body without the leading connector
    pub where_: String,
    /// HAVING body without the leading connector
    pub having: String,
    pub group: Vec<String>,
    pub order: Vec<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub mode: CrudMode,
    pub insert_keys: Vec<String>,
    pub insert_rows: Vec<Vec<Value>>,
    pub assignments: Assignments,
    /// Aliases introduced by this statement's tables and derived tables
    pub aliases: Aliases,
}

impl QueryState {
    /// No clause has been touched since the last reset.
    pub fn is_pristine(&self) -> bool {
        *self == QueryState::default()
    }

    pub(crate) fn tables(&self) -> &[String] {
        match &self.source {
            Source::Tables(tables) => tables,
            Source::Tableless => &[],
        }
    }

    pub(crate) fn push_table(&mut self, table: String) {
        match &mut self.source {
            Source::Tables(tables) => tables.push(table),
            Source::Tableless => self.source = Source::Tables(vec![table]),
        }
    }

    /// Read-oriented clauses drop any pending write intent.
    pub(crate) fn force_select(&mut self) {
        self.mode = CrudMode::Select;
    }
}

/// Append a connector-led fragment to a WHERE/HAVING body.
///
/// The leading `AND`/`OR` is dropped while the body is still empty.
pub(crate) fn append_clause(body: &mut String, fragment: &str) {
    let fragment = fragment.trim();
    if fragment.is_empty() {
        return;
    }
    if body.is_empty() {
        body.push_str(strip_connector(fragment));
    } else {
        body.push(' ');
        body.push_str(fragment);
    }
}

fn strip_connector(fragment: &str) -> &str {
    ["AND ", "OR "]
        .iter()
        .find_map(|c| fragment.strip_prefix(c))
        .unwrap_or(fragment)
        .trim_start()
}

/// Identity of a builder instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BuilderId(u64);

impl BuilderId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        BuilderId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Compiled SELECT ready to embed as a derived table or `IN` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubQuery {
    pub(crate) sql: String,
    pub(crate) origin: Option<BuilderId>,
}

impl SubQuery {
    /// Wrap SQL written by hand.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            origin: None,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The builder that compiled this subquery, if any.
    pub fn origin(&self) -> Option<BuilderId> {
        self.origin
    }
}

impl fmt::Display for SubQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}
