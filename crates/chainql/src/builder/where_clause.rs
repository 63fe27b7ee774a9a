//! WHERE / HAVING methods.
//!
//! Every variant builds [`Condition`]s and runs them through
//! [`condition::parse`](crate::condition::parse). The `or_*` variants mark the
//! field with the `|` sigil and delegate to the AND form.

use super::query::QueryBuilder;
use super::state::{SubQuery, append_clause};
use crate::condition::{
    Condition, Conditions, Connector, LikeSide, like_condition, parse, with_or_sigil,
};
use crate::dynamic::{Clause, DynamicName, bind_terms, split_terms};
use crate::error::{QbError, QbResult};
use crate::value::{IntoOperand, Operand, Value};

fn in_condition(field: &str, values: impl IntoOperand, negate: bool) -> Condition {
    let operand = match values.into_operand() {
        Operand::Scalar(v) => Operand::List(vec![v]),
        other => other,
    };
    let op = if negate { "!@" } else { "@" };
    Condition {
        field: format!("{} {op}", field.trim()),
        operand,
    }
}

fn null_condition(field: &str, negate: bool) -> Condition {
    let test = if negate { "IS NOT NULL" } else { "IS NULL" };
    Condition::expr(format!("{} {test}", field.trim()))
}

impl QueryBuilder {
    fn push_condition(
        &mut self,
        clause: Clause,
        conditions: Conditions,
        join: Option<Connector>,
        escape: bool,
    ) -> QbResult<&mut Self> {
        let fragment = parse(&*self.conn, &self.state.aliases, &conditions, join, escape)?;
        let body = match clause {
            Clause::Where => &mut self.state.where_,
            Clause::Having => {
                self.state.force_select();
                &mut self.state.having
            }
        };
        append_clause(body, &fragment);
        Ok(self)
    }

    fn push_one(&mut self, clause: Clause, condition: Condition) -> QbResult<&mut Self> {
        self.push_condition(clause, condition.into(), None, true)
    }

    fn between_condition(
        &self,
        field: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
        negate: bool,
    ) -> Condition {
        let op = if negate { "NOT BETWEEN" } else { "BETWEEN" };
        Condition::expr(format!(
            "{} {op} {} AND {}",
            field.trim(),
            self.conn.quote(&low.into()),
            self.conn.quote(&high.into())
        ))
    }

    fn in_subquery_condition(
        &self,
        field: &str,
        sub: SubQuery,
        negate: bool,
    ) -> QbResult<Condition> {
        if sub.origin == Some(self.id()) {
            return Err(QbError::invalid("A builder cannot be used as its own subquery"));
        }
        if sub.sql.trim().is_empty() {
            return Err(QbError::invalid("Subquery is empty"));
        }
        let op = if negate { "!@" } else { "@" };
        Ok(Condition {
            field: format!("{} {op}", field.trim()),
            operand: Operand::Subquery(sub.sql),
        })
    }

    fn build_subquery<F>(&self, f: F) -> QbResult<SubQuery>
    where
        F: FnOnce(&mut QueryBuilder) -> QbResult<()>,
    {
        let mut sub = self.fresh();
        f(&mut sub)?;
        sub.subquery()
    }

    // ==================== WHERE ====================

    /// Add AND condition. `field` may carry an operator: `"age >"`, `"name %"`, `"id @"`.
    pub fn where_(&mut self, field: &str, value: impl IntoOperand) -> QbResult<&mut Self> {
        self.push_one(Clause::Where, Condition::new(field, value))
    }

    /// Add OR condition.
    pub fn or_where(&mut self, field: &str, value: impl IntoOperand) -> QbResult<&mut Self> {
        self.where_(&with_or_sigil(field), value)
    }

    /// Add several conditions at once.
    ///
    /// Entries are ANDed unless their field starts with `|`.
    pub fn where_map<I, C>(&mut self, conditions: I) -> QbResult<&mut Self>
    where
        I: IntoIterator<Item = C>,
        C: Into<Condition>,
    {
        let conditions = Conditions::Map(conditions.into_iter().map(Into::into).collect());
        self.push_condition(Clause::Where, conditions, None, true)
    }

    /// Like [`where_map`](Self::where_map), with the first entry ORed onto the clause.
    pub fn or_where_map<I, C>(&mut self, conditions: I) -> QbResult<&mut Self>
    where
        I: IntoIterator<Item = C>,
        C: Into<Condition>,
    {
        let conditions = Conditions::Map(conditions.into_iter().map(Into::into).collect());
        self.push_condition(Clause::Where, conditions, Some(Connector::Or), true)
    }

    /// Add AND raw expression. `table.field` references are resolved.
    pub fn where_raw(&mut self, expr: &str) -> QbResult<&mut Self> {
        self.push_one(Clause::Where, Condition::expr(expr))
    }

    pub fn or_where_raw(&mut self, expr: &str) -> QbResult<&mut Self> {
        self.where_raw(&with_or_sigil(expr))
    }

    /// Compare against an unquoted value (a column or SQL expression).
    pub fn where_expr(&mut self, field: &str, value: &str) -> QbResult<&mut Self> {
        self.push_condition(
            Clause::Where,
            Condition::new(field, value).into(),
            None,
            false,
        )
    }

    pub fn or_where_expr(&mut self, field: &str, value: &str) -> QbResult<&mut Self> {
        self.where_expr(&with_or_sigil(field), value)
    }

    /// Add AND `field != value`.
    pub fn where_not(&mut self, field: &str, value: impl IntoOperand) -> QbResult<&mut Self> {
        self.where_(&format!("{} !=", field.trim()), value)
    }

    pub fn or_where_not(&mut self, field: &str, value: impl IntoOperand) -> QbResult<&mut Self> {
        self.where_not(&with_or_sigil(field), value)
    }

    /// Add AND `field IN (...)`. An empty list matches nothing.
    pub fn where_in(&mut self, field: &str, values: impl IntoOperand) -> QbResult<&mut Self> {
        self.push_one(Clause::Where, in_condition(field, values, false))
    }

    pub fn or_where_in(&mut self, field: &str, values: impl IntoOperand) -> QbResult<&mut Self> {
        self.where_in(&with_or_sigil(field), values)
    }

    /// Add AND `field NOT IN (...)`. An empty list matches everything.
    pub fn where_not_in(&mut self, field: &str, values: impl IntoOperand) -> QbResult<&mut Self> {
        self.push_one(Clause::Where, in_condition(field, values, true))
    }

    pub fn or_where_not_in(
        &mut self,
        field: &str,
        values: impl IntoOperand,
    ) -> QbResult<&mut Self> {
        self.where_not_in(&with_or_sigil(field), values)
    }

    /// Add AND `field IN (<subquery>)`.
    pub fn where_in_subquery(&mut self, field: &str, sub: SubQuery) -> QbResult<&mut Self> {
        let condition = self.in_subquery_condition(field, sub, false)?;
        self.push_one(Clause::Where, condition)
    }

    /// Add AND `field NOT IN (<subquery>)`.
    pub fn where_not_in_subquery(&mut self, field: &str, sub: SubQuery) -> QbResult<&mut Self> {
        let condition = self.in_subquery_condition(field, sub, true)?;
        self.push_one(Clause::Where, condition)
    }

    /// Add AND `field IN (...)` with the subquery built by `f`.
    ///
    /// `f` receives a fresh builder on the same connection; nothing it does is
    /// visible on `self`.
    pub fn where_in_sub<F>(&mut self, field: &str, f: F) -> QbResult<&mut Self>
    where
        F: FnOnce(&mut QueryBuilder) -> QbResult<()>,
    {
        let sub = self.build_subquery(f)?;
        self.where_in_subquery(field, sub)
    }

    pub fn or_where_in_sub<F>(&mut self, field: &str, f: F) -> QbResult<&mut Self>
    where
        F: FnOnce(&mut QueryBuilder) -> QbResult<()>,
    {
        self.where_in_sub(&with_or_sigil(field), f)
    }

    pub fn where_not_in_sub<F>(&mut self, field: &str, f: F) -> QbResult<&mut Self>
    where
        F: FnOnce(&mut QueryBuilder) -> QbResult<()>,
    {
        let sub = self.build_subquery(f)?;
        self.where_not_in_subquery(field, sub)
    }

    /// Add AND `field LIKE '%value%'`.
    pub fn where_like(&mut self, field: &str, value: &str) -> QbResult<&mut Self> {
        self.where_like_side(field, value, LikeSide::Both)
    }

    /// Add AND LIKE with explicit wildcard placement.
    ///
    /// A side that already carries a `%` gets no second one:
    /// `("rate", "50%", LikeSide::Before)` matches `'%50%'`, while
    /// `LikeSide::After` leaves `'50%'` untouched.
    pub fn where_like_side(
        &mut self,
        field: &str,
        value: &str,
        side: LikeSide,
    ) -> QbResult<&mut Self> {
        self.push_one(
            Clause::Where,
            like_condition(field, value, side, false, false),
        )
    }

    /// Add AND case-insensitive LIKE (`LOWER(field) LIKE lower(value)`).
    pub fn where_ilike(&mut self, field: &str, value: &str, side: LikeSide) -> QbResult<&mut Self> {
        self.push_one(Clause::Where, like_condition(field, value, side, false, true))
    }

    /// Add AND NOT LIKE.
    pub fn where_not_like(
        &mut self,
        field: &str,
        value: &str,
        side: LikeSide,
    ) -> QbResult<&mut Self> {
        self.push_one(Clause::Where, like_condition(field, value, side, true, false))
    }

    pub fn or_where_like(&mut self, field: &str, value: &str) -> QbResult<&mut Self> {
        self.where_like(&with_or_sigil(field), value)
    }

    pub fn or_where_like_side(
        &mut self,
        field: &str,
        value: &str,
        side: LikeSide,
    ) -> QbResult<&mut Self> {
        self.where_like_side(&with_or_sigil(field), value, side)
    }

    pub fn or_where_ilike(
        &mut self,
        field: &str,
        value: &str,
        side: LikeSide,
    ) -> QbResult<&mut Self> {
        self.where_ilike(&with_or_sigil(field), value, side)
    }

    pub fn or_where_not_like(
        &mut self,
        field: &str,
        value: &str,
        side: LikeSide,
    ) -> QbResult<&mut Self> {
        self.where_not_like(&with_or_sigil(field), value, side)
    }

    pub fn where_null(&mut self, field: &str) -> QbResult<&mut Self> {
        self.push_one(Clause::Where, null_condition(field, false))
    }

    pub fn where_not_null(&mut self, field: &str) -> QbResult<&mut Self> {
        self.push_one(Clause::Where, null_condition(field, true))
    }

    pub fn or_where_null(&mut self, field: &str) -> QbResult<&mut Self> {
        self.where_null(&with_or_sigil(field))
    }

    pub fn or_where_not_null(&mut self, field: &str) -> QbResult<&mut Self> {
        self.where_not_null(&with_or_sigil(field))
    }

    /// Add AND `field BETWEEN low AND high`.
    pub fn where_between(
        &mut self,
        field: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> QbResult<&mut Self> {
        let condition = self.between_condition(field, low, high, false);
        self.push_one(Clause::Where, condition)
    }

    pub fn where_not_between(
        &mut self,
        field: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> QbResult<&mut Self> {
        let condition = self.between_condition(field, low, high, true);
        self.push_one(Clause::Where, condition)
    }

    pub fn or_where_between(
        &mut self,
        field: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> QbResult<&mut Self> {
        self.where_between(&with_or_sigil(field), low, high)
    }

    pub fn or_where_not_between(
        &mut self,
        field: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> QbResult<&mut Self> {
        self.where_not_between(&with_or_sigil(field), low, high)
    }

    /// Add AND a parenthesized group built by `f` on a fresh builder that
    /// sees this statement's aliases.
    ///
    /// ```
    /// # use chainql::{QueryBuilder, RecordingConnection};
    /// # use std::sync::Arc;
    /// let mut qb = QueryBuilder::new(Arc::new(RecordingConnection::new()));
    /// qb.from("users")?.where_("active", true)?.where_group(|g| {
    ///     g.where_("role", "admin")?.or_where("role", "owner")?;
    ///     Ok(())
    /// })?;
    /// assert_eq!(
    ///     qb.sql()?,
    ///     "SELECT * FROM users WHERE active = TRUE AND (role = 'admin' OR role = 'owner')"
    /// );
    /// # Ok::<(), chainql::QbError>(())
    /// ```
    pub fn where_group<F>(&mut self, f: F) -> QbResult<&mut Self>
    where
        F: FnOnce(&mut QueryBuilder) -> QbResult<()>,
    {
        self.group(Connector::And, f)
    }

    /// Add OR a parenthesized group.
    pub fn or_where_group<F>(&mut self, f: F) -> QbResult<&mut Self>
    where
        F: FnOnce(&mut QueryBuilder) -> QbResult<()>,
    {
        self.group(Connector::Or, f)
    }

    fn group<F>(&mut self, connector: Connector, f: F) -> QbResult<&mut Self>
    where
        F: FnOnce(&mut QueryBuilder) -> QbResult<()>,
    {
        let mut inner = self.fresh();
        inner.state.aliases = self.state.aliases.clone();
        f(&mut inner)?;
        let body = std::mem::take(&mut inner.state.where_);
        if !body.is_empty() {
            append_clause(&mut self.state.where_, &format!("{connector} ({body})"));
        }
        Ok(self)
    }

    // ==================== HAVING ====================

    /// Add AND HAVING condition.
    pub fn having(&mut self, field: &str, value: impl IntoOperand) -> QbResult<&mut Self> {
        self.push_one(Clause::Having, Condition::new(field, value))
    }

    /// Add OR HAVING condition.
    pub fn or_having(&mut self, field: &str, value: impl IntoOperand) -> QbResult<&mut Self> {
        self.having(&with_or_sigil(field), value)
    }

    pub fn having_raw(&mut self, expr: &str) -> QbResult<&mut Self> {
        self.push_one(Clause::Having, Condition::expr(expr))
    }

    pub fn or_having_raw(&mut self, expr: &str) -> QbResult<&mut Self> {
        self.having_raw(&with_or_sigil(expr))
    }

    pub fn having_in(&mut self, field: &str, values: impl IntoOperand) -> QbResult<&mut Self> {
        self.push_one(Clause::Having, in_condition(field, values, false))
    }

    pub fn having_not_in(&mut self, field: &str, values: impl IntoOperand) -> QbResult<&mut Self> {
        self.push_one(Clause::Having, in_condition(field, values, true))
    }

    /// HAVING `field IN (...)` with the subquery built by `f` on a fresh builder.
    pub fn having_in_sub<F>(&mut self, field: &str, f: F) -> QbResult<&mut Self>
    where
        F: FnOnce(&mut QueryBuilder) -> QbResult<()>,
    {
        let sub = self.build_subquery(f)?;
        let condition = self.in_subquery_condition(field, sub, false)?;
        self.push_one(Clause::Having, condition)
    }

    pub fn having_like(&mut self, field: &str, value: &str, side: LikeSide) -> QbResult<&mut Self> {
        self.push_one(Clause::Having, like_condition(field, value, side, false, false))
    }

    pub fn having_null(&mut self, field: &str) -> QbResult<&mut Self> {
        self.push_one(Clause::Having, null_condition(field, false))
    }

    pub fn having_not_null(&mut self, field: &str) -> QbResult<&mut Self> {
        self.push_one(Clause::Having, null_condition(field, true))
    }

    pub fn having_between(
        &mut self,
        field: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> QbResult<&mut Self> {
        let condition = self.between_condition(field, low, high, false);
        self.push_one(Clause::Having, condition)
    }

    // ==================== Dynamic names ====================

    /// Add WHERE conditions from a name like `"FirstNameAndAgeOrEmail"`.
    ///
    /// Fields are snake_cased and bound to `args` in order; `connector` joins
    /// the first one. The number of fields and arguments must match.
    pub fn condition_from_name<I>(
        &mut self,
        name: &str,
        connector: Connector,
        args: I,
    ) -> QbResult<&mut Self>
    where
        I: IntoIterator,
        I::Item: IntoOperand,
    {
        let terms = split_terms(name, connector)?;
        let conditions = bind_terms(&terms, args)?;
        self.push_condition(Clause::Where, Conditions::Map(conditions), None, true)
    }

    /// Dispatch a method-style name: `whereNameAndAge`, `orWhereEmail`,
    /// `havingTotal`, `orHavingCount`.
    pub fn where_by_name<I>(&mut self, method: &str, args: I) -> QbResult<&mut Self>
    where
        I: IntoIterator,
        I::Item: IntoOperand,
    {
        let name = DynamicName::parse(method)?;
        let conditions = name.bind(args)?;
        self.push_condition(name.clause, Conditions::Map(conditions), None, true)
    }
}
