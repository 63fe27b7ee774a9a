//! Condition parsing for WHERE and HAVING clauses.
//!
//! A [`Condition`] is a field (optionally carrying an operator and the `|` OR
//! sigil) paired with an [`Operand`]. [`parse`] turns one condition, or a list
//! of them, into a SQL boolean fragment.
//!
//! Operator tokens:
//!
//! | token | SQL        |
//! |-------|------------|
//! | `%`   | `LIKE`     |
//! | `!%`  | `NOT LIKE` |
//! | `@`   | `IN`       |
//! | `!@`  | `NOT IN`   |
//! | other | verbatim   |
//! | none  | `=`        |
//!
//! Every emitted entry starts with its connector (`AND name = 'x' OR age > 3`);
//! the caller drops the leading one when the clause is still empty.

use crate::connection::Connection;
use crate::error::{QbError, QbResult};
use crate::naming::{Aliases, resolve_expression};
use crate::value::{IntoOperand, Operand, Value};
use std::fmt;

/// The field prefix that makes a condition join with OR.
pub const OR_SIGIL: char = '|';

/// Boolean connector between conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    And,
    Or,
}

impl Connector {
    pub fn as_str(&self) -> &'static str {
        match self {
            Connector::And => "AND",
            Connector::Or => "OR",
        }
    }
}

impl fmt::Display for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One field/operator/value condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Field name, optionally followed by an operator token and prefixed with `|`.
    pub field: String,
    pub operand: Operand,
}

impl Condition {
    pub fn new(field: impl Into<String>, value: impl IntoOperand) -> Self {
        Self {
            field: field.into(),
            operand: value.into_operand(),
        }
    }

    /// A field that is already a complete boolean expression.
    pub fn expr(expression: impl Into<String>) -> Self {
        Self {
            field: expression.into(),
            operand: Operand::Expression,
        }
    }

    /// The same condition, joined with OR.
    pub fn or(mut self) -> Self {
        self.field = with_or_sigil(&self.field);
        self
    }
}

impl<K: Into<String>, V: IntoOperand> From<(K, V)> for Condition {
    fn from((field, value): (K, V)) -> Self {
        Condition::new(field, value)
    }
}

/// Input to [`parse`]: one condition or an ordered mapping of several.
#[derive(Debug, Clone, PartialEq)]
pub enum Conditions {
    Single(Condition),
    Map(Vec<Condition>),
}

impl From<Condition> for Conditions {
    fn from(c: Condition) -> Self {
        Conditions::Single(c)
    }
}

impl From<Vec<Condition>> for Conditions {
    fn from(v: Vec<Condition>) -> Self {
        Conditions::Map(v)
    }
}

/// Render conditions as a SQL fragment.
///
/// `join` overrides the connector of the first non-empty entry; every other
/// entry takes OR when its field carries the sigil and AND otherwise. Scalars
/// are quoted through the connection unless `escape` is false or they are
/// numeric.
pub fn parse(
    conn: &dyn Connection,
    aliases: &Aliases,
    conditions: &Conditions,
    join: Option<Connector>,
    escape: bool,
) -> QbResult<String> {
    match conditions {
        Conditions::Single(condition) => {
            let (_, field) = strip_sigil(&condition.field);
            if field.is_empty() {
                return Err(QbError::invalid("Condition field cannot be empty"));
            }
            render(conn, aliases, condition, join, escape)
        }
        Conditions::Map(entries) => {
            let mut join = join;
            let mut parts = Vec::with_capacity(entries.len());
            for condition in entries {
                if strip_sigil(&condition.field).1.is_empty() {
                    continue;
                }
                parts.push(render(conn, aliases, condition, join.take(), escape)?);
            }
            Ok(parts.join(" "))
        }
    }
}

fn render(
    conn: &dyn Connection,
    aliases: &Aliases,
    condition: &Condition,
    join: Option<Connector>,
    escape: bool,
) -> QbResult<String> {
    let (or, field) = strip_sigil(&condition.field);
    let connector = join.unwrap_or(if or { Connector::Or } else { Connector::And });

    let body = match &condition.operand {
        Operand::Expression => resolve_expression(conn, aliases, field),
        Operand::List(values) => {
            let (name, token) = split_operator(field);
            let name = resolve_expression(conn, aliases, name);
            let op = list_operator(token);
            if values.is_empty() {
                // IN () is not valid SQL
                if op == "NOT IN" { "1=1".to_string() } else { "1=0".to_string() }
            } else {
                let quoted: Vec<String> = values.iter().map(|v| conn.quote(v)).collect();
                format!("{name} {op} ({})", quoted.join(","))
            }
        }
        Operand::Subquery(sql) => {
            let (name, token) = split_operator(field);
            let name = resolve_expression(conn, aliases, name);
            format!("{name} {} ({sql})", list_operator(token))
        }
        Operand::Scalar(value) => {
            let (name, token) = split_operator(field);
            let name = resolve_expression(conn, aliases, name);
            let op = map_operator(token.unwrap_or("="));
            if value.is_null() {
                match null_comparison(&op) {
                    Some(test) => format!("{name} {test}"),
                    None => format!("{name} {op} NULL"),
                }
            } else {
                format!("{name} {op} {}", render_scalar(conn, aliases, value, escape))
            }
        }
    };

    Ok(format!("{connector} {}", body.trim()))
}

fn render_scalar(
    conn: &dyn Connection,
    aliases: &Aliases,
    value: &Value,
    escape: bool,
) -> String {
    if !escape {
        return resolve_expression(conn, aliases, &value.to_string());
    }
    if value.is_numeric() {
        return value.to_string();
    }
    conn.quote(value)
}

fn null_comparison(op: &str) -> Option<&'static str> {
    match op.to_ascii_uppercase().as_str() {
        "=" | "IS" => Some("IS NULL"),
        "!=" | "<>" | "IS NOT" => Some("IS NOT NULL"),
        _ => None,
    }
}

/// Split the OR sigil off a field.
pub(crate) fn strip_sigil(field: &str) -> (bool, &str) {
    let field = field.trim();
    match field.strip_prefix(OR_SIGIL) {
        Some(rest) => (true, rest.trim_start()),
        None => (false, field),
    }
}

/// Prefix a field with the OR sigil (idempotent).
pub(crate) fn with_or_sigil(field: &str) -> String {
    let (_, bare) = strip_sigil(field);
    format!("{OR_SIGIL}{bare}")
}

/// Split `name op` at the first whitespace outside parentheses.
fn split_operator(field: &str) -> (&str, Option<&str>) {
    let mut depth = 0i32;
    for (i, c) in field.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            c if c.is_whitespace() && depth == 0 => {
                let op = field[i..].trim();
                return (&field[..i], (!op.is_empty()).then_some(op));
            }
            _ => {}
        }
    }
    (field, None)
}

fn map_operator(token: &str) -> String {
    match token {
        "%" => "LIKE".to_string(),
        "!%" => "NOT LIKE".to_string(),
        "@" => "IN".to_string(),
        "!@" => "NOT IN".to_string(),
        other => other.to_string(),
    }
}

fn list_operator(token: Option<&str>) -> &'static str {
    let Some(token) = token else { return "IN" };
    if token.contains('@') {
        return if token.starts_with('!') { "NOT IN" } else { "IN" };
    }
    let upper = token.to_ascii_uppercase();
    if upper.split_whitespace().eq(["NOT", "IN"]) {
        "NOT IN"
    } else {
        "IN"
    }
}

/// Where LIKE wildcards go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LikeSide {
    /// `%value`
    Before,
    /// `value%`
    After,
    /// `%value%`
    #[default]
    Both,
    /// `value`
    None,
}

impl LikeSide {
    /// Add the wildcards for this side. A side that already starts (or ends)
    /// with `%` is left as is, so `"abc%"` with [`LikeSide::After`] stays
    /// `abc%`. A `%` in the middle of the value does not count.
    pub fn apply(self, value: &str) -> String {
        let lead = matches!(self, LikeSide::Before | LikeSide::Both) && !value.starts_with('%');
        let trail = matches!(self, LikeSide::After | LikeSide::Both) && !value.ends_with('%');
        format!(
            "{}{value}{}",
            if lead { "%" } else { "" },
            if trail { "%" } else { "" }
        )
    }
}

impl std::str::FromStr for LikeSide {
    type Err = QbError;

    fn from_str(s: &str) -> QbResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "before" => Ok(LikeSide::Before),
            "after" => Ok(LikeSide::After),
            "both" => Ok(LikeSide::Both),
            "none" => Ok(LikeSide::None),
            other => Err(QbError::invalid(format!("Invalid LIKE side '{other}'"))),
        }
    }
}

/// Build a LIKE / NOT LIKE condition.
///
/// Case-insensitive matching compares `LOWER(field)` with the lowercased pattern.
pub fn like_condition(
    field: &str,
    value: &str,
    side: LikeSide,
    negate: bool,
    case_insensitive: bool,
) -> Condition {
    let (or, bare) = strip_sigil(field);
    let mut pattern = side.apply(value);
    let mut target = bare.to_string();
    if case_insensitive {
        target = format!("LOWER({target})");
        pattern = pattern.to_lowercase();
    }
    let sigil = if or { "|" } else { "" };
    let op = if negate { "!%" } else { "%" };
    Condition::new(format!("{sigil}{target} {op}"), pattern)
}
