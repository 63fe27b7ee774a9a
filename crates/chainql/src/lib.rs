//! # chainql
//!
//! A fluent SQL statement builder with a pluggable connection and result adapter.
//!
//! ## Features
//!
//! - **Order-independent compilation**: clauses can be added in any order; the
//!   compiled SELECT always reads `SELECT DISTINCT fields FROM joins WHERE GROUP BY
//!   HAVING ORDER BY LIMIT OFFSET`
//! - **Condition shorthand**: `"age >"`, `"name %"` (LIKE), `"id @"` (IN), and a
//!   leading `|` for OR
//! - **Table prefixes and aliases**: `table.field` references are rewritten
//!   against the connection's table prefix and the aliases of the statement
//!   being built
//! - **Dynamic names**: `where_by_name("whereNameAndAge", args)`
//! - **Result adapter**: rows as [`Row`]s, positional arrays, JSON, or any serde type
//! - **Injected connection**: anything implementing [`Connection`]; a blocking
//!   Postgres implementation ships behind the `postgres` feature
//!
//! ## Example
//!
//! ```
//! use chainql::{QueryBuilder, RecordingConnection, ScriptedResult, Value};
//! use std::sync::Arc;
//!
//! let conn = Arc::new(RecordingConnection::new().with_prefix("app_"));
//! let mut qb = QueryBuilder::new(conn.clone());
//!
//! // SELECT
//! qb.from("users u")?
//!     .select("u.id, u.name")
//!     .where_("users.age >=", 18)?
//!     .or_where_in("u.role", ["admin", "owner"])?;
//! assert_eq!(
//!     qb.sql()?,
//!     "SELECT u.id, u.name FROM app_users u WHERE u.age >= 18 OR u.role IN ('admin','owner')"
//! );
//!
//! // INSERT
//! conn.push(ScriptedResult::insert(1, 42));
//! let rs = qb
//!     .table("posts")?
//!     .insert([("title", Value::from("Hello")), ("views", Value::from(0))])?
//!     .execute()?;
//! assert_eq!(rs.insert_id()?, Some(42));
//! assert_eq!(
//!     conn.last_sql().as_deref(),
//!     Some("INSERT INTO app_posts (title,views) VALUES ('Hello',0)")
//! );
//! # Ok::<(), chainql::QbError>(())
//! ```

pub mod builder;
pub mod condition;
pub mod config;
pub mod connection;
pub mod dynamic;
pub mod error;
mod log;
pub mod naming;
pub mod result;
pub mod row;
pub mod value;

pub use builder::{
    BuilderId, CrudMode, IntoRecord, JoinType, Order, QueryBuilder, QueryState, SubQuery,
};
pub use condition::{Condition, Connector, LikeSide};
pub use config::ExecConfig;
pub use connection::{
    BufferedRows, Connection, RecordingConnection, RowHandle, ScriptedResult, StatementInfo,
    quote_literal,
};
pub use dynamic::DynamicName;
pub use error::{QbError, QbResult};
pub use naming::{Aliases, TableNaming, TableRef};
pub use result::{QueryDetails, ResultSet};
pub use row::{FromRow, Row};
pub use value::{FromValue, IntoOperand, Operand, Value};

#[cfg(feature = "postgres")]
pub use connection::{PgConfig, PgConnection};
