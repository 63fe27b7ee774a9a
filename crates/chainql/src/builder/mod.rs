//! Fluent statement builder.
//!
//! [`QueryBuilder`] accumulates clauses in a [`QueryState`] and compiles them
//! into one SQL string.
//!
//! ## Design
//!
//! - Values are inlined through [`Connection::quote`](crate::Connection::quote);
//!   numeric values are never quoted.
//! - Read-oriented clauses (`select`, `distinct`, joins, `order_by`, `group_by`,
//!   HAVING, `offset`) switch the builder back to SELECT.
//! - `sql()` and `execute()` reset the builder; `Clone` gives a fresh one.

pub mod compile;
pub mod query;
pub mod state;
mod terminal;
mod where_clause;

pub use compile::{compile, join_fragments};
pub use query::{IntoRecord, QueryBuilder};
pub use state::{
    Assignments, BuilderId, CrudMode, JoinClause, JoinOn, JoinType, Order, QueryState, Source,
    SubQuery,
};

#[cfg(test)]
mod tests;
