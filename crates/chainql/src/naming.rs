//! Table naming and alias resolution.
//!
//! [`TableNaming`] is the naming service a [`Connection`] exposes: it applies the
//! table prefix. [`Aliases`] belongs to a single statement and remembers the
//! aliases its tables were given. [`resolve_field`] and [`resolve_expression`]
//! use both to rewrite `table.field` references so they point at the prefixed
//! table or its alias.
//!
//! - Identifier parts are validated against: `[A-Za-z_][A-Za-z0-9_$]*`
//! - `schema.table` is accepted; only the last part gets the prefix
//!
//! # Example
//! ```
//! use chainql::naming::{Aliases, TableNaming, TableRef};
//!
//! let naming = TableNaming::new("app_");
//! let users = TableRef::parse("users AS u")?;
//! assert_eq!(naming.make_table_name(&users), "app_users u");
//!
//! let mut aliases = Aliases::new();
//! aliases.register(&users);
//! assert_eq!(aliases.table_alias("users"), Some("u"));
//! # Ok::<(), chainql::QbError>(())
//! ```

use crate::connection::Connection;
use crate::error::{QbError, QbResult};
use std::collections::{HashMap, HashSet};

/// A table reference as written by the caller: `name`, `name alias` or `name AS alias`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

impl TableRef {
    /// Parse and validate a table reference.
    pub fn parse(s: &str) -> QbResult<Self> {
        let words: Vec<&str> = s.split_whitespace().collect();
        let (name, alias) = match words.as_slice() {
            [name] => (*name, None),
            [name, alias] => (*name, Some(*alias)),
            [name, kw, alias] if kw.eq_ignore_ascii_case("as") => (*name, Some(*alias)),
            [] => return Err(QbError::invalid("Table name cannot be empty")),
            _ => {
                return Err(QbError::invalid(format!(
                    "Invalid table reference '{}'",
                    s.trim()
                )));
            }
        };

        validate_ident(name, true)?;
        if let Some(alias) = alias {
            validate_ident(alias, false)?;
        }

        Ok(Self {
            name: name.to_string(),
            alias: alias.map(str::to_string),
        })
    }
}

/// Validate an identifier (optionally dotted).
pub fn validate_ident(s: &str, allow_dots: bool) -> QbResult<()> {
    if s.is_empty() {
        return Err(QbError::invalid("Identifier cannot be empty"));
    }
    if s.contains('\0') {
        return Err(QbError::invalid("Identifier cannot contain NUL character"));
    }

    let mut segments = 0;
    for seg in s.split('.') {
        segments += 1;
        let mut chars = seg.chars();
        match chars.next() {
            None => return Err(QbError::invalid(format!("Empty identifier segment in '{s}'"))),
            Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
            Some(c) => {
                return Err(QbError::invalid(format!(
                    "Invalid identifier start character: '{c}'"
                )));
            }
        }
        if let Some(c) = chars.find(|&c| !(c == '_' || c == '$' || c.is_ascii_alphanumeric())) {
            return Err(QbError::invalid(format!(
                "Invalid character in identifier: '{c}'"
            )));
        }
    }

    if segments > 1 && !allow_dots {
        return Err(QbError::invalid(format!("Alias '{s}' cannot be dotted")));
    }
    Ok(())
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic()
}

fn is_ident_char(c: char) -> bool {
    c == '_' || c == '$' || c.is_ascii_alphanumeric()
}

/// Table prefixing shared by connection implementations.
#[derive(Debug, Clone, Default)]
pub struct TableNaming {
    prefix: String,
}

impl TableNaming {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Apply the table prefix. `schema.table` prefixes only the table part, and
    /// names that already carry the prefix are left alone.
    pub fn prefix_table(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            return name.to_string();
        }
        let (schema, table) = match name.rsplit_once('.') {
            Some((schema, table)) => (Some(schema), table),
            None => (None, name),
        };
        let table = if table.starts_with(&self.prefix) {
            table.to_string()
        } else {
            format!("{}{}", self.prefix, table)
        };
        match schema {
            Some(schema) => format!("{schema}.{table}"),
            None => table,
        }
    }

    /// SQL form of a table reference: the prefixed name, then the alias.
    pub fn make_table_name(&self, table: &TableRef) -> String {
        let prefixed = self.prefix_table(&table.name);
        match &table.alias {
            Some(alias) => format!("{prefixed} {alias}"),
            None => prefixed,
        }
    }
}

/// Aliases introduced by one statement.
///
/// A table may be joined several times under different aliases; all of them
/// stay recognised. `table.field` resolves to the first alias the table got.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aliases {
    /// table name (unprefixed) -> aliases, in registration order
    by_table: HashMap<String, Vec<String>>,
    names: HashSet<String>,
}

impl Aliases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the alias of a table reference.
    ///
    /// A table referenced without an alias forgets the aliases it had, so
    /// `table.field` points at the unaliased table again. The alias names
    /// themselves stay known.
    pub fn register(&mut self, table: &TableRef) {
        match &table.alias {
            Some(alias) => {
                let aliases = self.by_table.entry(table.name.clone()).or_default();
                if !aliases.contains(alias) {
                    aliases.push(alias.clone());
                }
                self.names.insert(alias.clone());
            }
            None => {
                self.by_table.remove(&table.name);
            }
        }
    }

    /// Record the alias of a derived table.
    pub fn register_derived(&mut self, alias: &str) {
        self.names.insert(alias.to_string());
    }

    /// Alias `table.field` should resolve to, if the table has one.
    pub fn table_alias(&self, table: &str) -> Option<&str> {
        self.by_table
            .get(table)
            .and_then(|aliases| aliases.first())
            .map(String::as_str)
    }

    /// Every alias registered for a table.
    pub fn aliases_of(&self, table: &str) -> &[String] {
        self.by_table.get(table).map_or(&[], Vec::as_slice)
    }

    pub fn is_alias(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

/// Resolve a single `table.field` reference.
///
/// - `alias.field` stays as written
/// - `table.field` for an aliased table becomes `alias.field`
/// - otherwise the table part is prefixed
///
/// Anything that is not a plain `ident.ident` pair is returned unchanged.
pub fn resolve_field(conn: &dyn Connection, aliases: &Aliases, field: &str) -> String {
    let Some((table, column)) = field.split_once('.') else {
        return field.to_string();
    };
    let plain = |s: &str| {
        s.chars().next().is_some_and(is_ident_start) && s.chars().all(is_ident_char)
    };
    if !plain(table) || !(column == "*" || plain(column)) {
        return field.to_string();
    }
    qualify(conn, aliases, table, column)
}

fn qualify(conn: &dyn Connection, aliases: &Aliases, table: &str, column: &str) -> String {
    if aliases.is_alias(table) {
        return format!("{table}.{column}");
    }
    match aliases.table_alias(table) {
        Some(alias) => format!("{alias}.{column}"),
        None => format!("{}.{}", conn.prefix_table(table), column),
    }
}

/// Rewrite every `table.field` reference inside an expression.
///
/// Quoted literals, quoted identifiers and dotted function calls
/// (`pg_catalog.now()`) are left untouched.
pub fn resolve_expression(conn: &dyn Connection, aliases: &Aliases, expr: &str) -> String {
    let chars: Vec<char> = expr.chars().collect();
    let mut out = String::with_capacity(expr.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\'' || c == '"' {
            let quote = c;
            out.push(c);
            i += 1;
            while i < chars.len() {
                out.push(chars[i]);
                if chars[i] == quote {
                    if chars.get(i + 1) == Some(&quote) {
                        out.push(quote);
                        i += 2;
                        continue;
                    }
                    i += 1;
                    break;
                }
                i += 1;
            }
            continue;
        }

        let prev_is_word = i > 0 && (is_ident_char(chars[i - 1]) || chars[i - 1] == '.');
        if is_ident_start(c) && !prev_is_word {
            let start = i;
            while i < chars.len() && is_ident_char(chars[i]) {
                i += 1;
            }
            let table: String = chars[start..i].iter().collect();

            if chars.get(i) == Some(&'.') {
                let col_start = i + 1;
                if chars.get(col_start) == Some(&'*') {
                    out.push_str(&qualify(conn, aliases, &table, "*"));
                    i = col_start + 1;
                    continue;
                }
                if chars.get(col_start).copied().is_some_and(is_ident_start) {
                    let mut end = col_start;
                    while end < chars.len() && is_ident_char(chars[end]) {
                        end += 1;
                    }
                    let is_call = chars[end..].iter().find(|c| !c.is_whitespace()) == Some(&'(');
                    let followed_by_dot = chars.get(end) == Some(&'.');
                    if !is_call && !followed_by_dot {
                        let column: String = chars[col_start..end].iter().collect();
                        out.push_str(&qualify(conn, aliases, &table, &column));
                        i = end;
                        continue;
                    }
                }
            }
            out.push_str(&table);
            continue;
        }

        out.push(c);
        i += 1;
    }

    out
}

/// Split on a separator that is not nested in parentheses or quotes.
pub(crate) fn split_top_level(s: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut current = String::new();

    for c in s.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                current.push(c);
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    current.push(c);
                }
                '(' => {
                    depth += 1;
                    current.push(c);
                }
                ')' => {
                    depth -= 1;
                    current.push(c);
                }
                c if c == sep && depth == 0 => parts.push(std::mem::take(&mut current)),
                c => current.push(c),
            },
        }
    }
    parts.push(current);

    parts
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Conversion of table or field lists into separate names.
///
/// String forms are split on top-level commas: `"id, name"` and `["id", "name"]`
/// are equivalent.
pub trait IntoNames {
    fn into_names(self) -> Vec<String>;
}

impl IntoNames for &str {
    fn into_names(self) -> Vec<String> {
        split_top_level(self, ',')
    }
}

impl IntoNames for String {
    fn into_names(self) -> Vec<String> {
        split_top_level(&self, ',')
    }
}

impl IntoNames for &String {
    fn into_names(self) -> Vec<String> {
        split_top_level(self, ',')
    }
}

impl IntoNames for &[&str] {
    fn into_names(self) -> Vec<String> {
        self.iter().flat_map(|s| split_top_level(s, ',')).collect()
    }
}

impl<const N: usize> IntoNames for [&str; N] {
    fn into_names(self) -> Vec<String> {
        self.iter().flat_map(|s| split_top_level(s, ',')).collect()
    }
}

impl IntoNames for Vec<&str> {
    fn into_names(self) -> Vec<String> {
        self.as_slice().into_names()
    }
}

impl IntoNames for Vec<String> {
    fn into_names(self) -> Vec<String> {
        self.iter().flat_map(|s| split_top_level(s, ',')).collect()
    }
}
