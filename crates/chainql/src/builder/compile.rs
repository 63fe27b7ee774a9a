//! Statement compilation.
//!
//! SELECT fragments are always emitted in this order, whatever order the
//! builder methods were called in:
//!
//! `SELECT` `DISTINCT` fields `FROM` joins `WHERE` `GROUP BY` `HAVING` `ORDER BY` `LIMIT` `OFFSET`

use super::state::{Assignments, CrudMode, QueryState, Source};
use crate::connection::Connection;
use crate::error::{QbError, QbResult};

/// Compile accumulated state into one SQL statement.
///
/// A pristine state compiles to the empty string.
pub fn compile(state: &QueryState, conn: &dyn Connection) -> QbResult<String> {
    if state.is_pristine() {
        return Ok(String::new());
    }
    match state.mode {
        CrudMode::Select => compile_select(state),
        CrudMode::Insert => compile_insert(state, conn),
        CrudMode::Update => compile_update(state, conn),
        CrudMode::Delete => compile_delete(state, conn),
    }
}

/// Drop blank fragments, join the rest with single spaces and trim.
pub fn join_fragments<I, S>(fragments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for fragment in fragments {
        let fragment = fragment.as_ref().trim();
        if fragment.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(fragment);
    }
    out
}

fn check_table(state: &QueryState) -> QbResult<()> {
    if matches!(state.source, Source::Tables(ref t) if t.is_empty()) {
        return Err(QbError::configuration(format!(
            "No table set for {} statement",
            state.mode.as_str().to_ascii_uppercase()
        )));
    }
    Ok(())
}

/// The single target table of a write.
fn write_target(state: &QueryState) -> QbResult<&str> {
    check_table(state)?;
    match state.tables() {
        [table] => Ok(table),
        [] => Err(QbError::configuration(format!(
            "No table set for {} statement",
            state.mode.as_str().to_ascii_uppercase()
        ))),
        _ => Err(QbError::invalid(format!(
            "{} statement needs exactly one table",
            state.mode.as_str().to_ascii_uppercase()
        ))),
    }
}

fn keyword_clause(keyword: &str, body: &str) -> String {
    if body.trim().is_empty() {
        String::new()
    } else {
        format!("{keyword} {body}")
    }
}

fn compile_select(state: &QueryState) -> QbResult<String> {
    check_table(state)?;

    let fields = if state.fields.is_empty() {
        "*".to_string()
    } else {
        state.fields.join(", ")
    };
    let from = match &state.source {
        Source::Tables(tables) => format!("FROM {}", tables.join(", ")),
        Source::Tableless => String::new(),
    };
    let joins: Vec<String> = state.joins.iter().map(|j| j.to_sql()).collect();

    Ok(join_fragments([
        "SELECT".to_string(),
        if state.distinct { "DISTINCT".to_string() } else { String::new() },
        fields,
        from,
        joins.join(" "),
        keyword_clause("WHERE", &state.where_),
        keyword_clause("GROUP BY", &state.group.join(", ")),
        keyword_clause("HAVING", &state.having),
        keyword_clause("ORDER BY", &state.order.join(", ")),
        state.limit.map(|n| format!("LIMIT {n}")).unwrap_or_default(),
        state.offset.map(|n| format!("OFFSET {n}")).unwrap_or_default(),
    ]))
}

fn compile_insert(state: &QueryState, conn: &dyn Connection) -> QbResult<String> {
    let table = write_target(state)?;
    if state.insert_keys.is_empty() || state.insert_rows.is_empty() {
        return Err(QbError::invalid("INSERT needs at least one column and row"));
    }

    let tuples: Vec<String> = state
        .insert_rows
        .iter()
        .map(|row| {
            let values: Vec<String> = row.iter().map(|v| conn.quote(v)).collect();
            format!("({})", values.join(","))
        })
        .collect();

    Ok(join_fragments([
        format!("INSERT INTO {table}"),
        format!("({})", state.insert_keys.join(",")),
        format!("VALUES {}", tuples.join(",")),
    ]))
}

fn compile_update(state: &QueryState, conn: &dyn Connection) -> QbResult<String> {
    let table = write_target(state)?;
    let set = match &state.assignments {
        Assignments::Pairs(pairs) if pairs.is_empty() => {
            return Err(QbError::invalid("UPDATE needs at least one assignment"));
        }
        Assignments::Pairs(pairs) => pairs
            .iter()
            .map(|(k, v)| format!("{k} = {}", conn.quote(v)))
            .collect::<Vec<_>>()
            .join(", "),
        Assignments::Raw(raw) if raw.trim().is_empty() => {
            return Err(QbError::invalid("UPDATE needs at least one assignment"));
        }
        Assignments::Raw(raw) => raw.trim().to_string(),
    };

    Ok(join_fragments([
        format!("UPDATE {table}"),
        format!("SET {set}"),
        keyword_clause("WHERE", &state.where_),
    ]))
}

fn compile_delete(state: &QueryState, conn: &dyn Connection) -> QbResult<String> {
    let table = write_target(state)?;
    if state.limit.is_some() && !conn.supports_limited_delete() {
        return Err(QbError::unsupported(
            "This connection does not support DELETE with LIMIT",
        ));
    }

    Ok(join_fragments([
        format!("DELETE FROM {table}"),
        keyword_clause("WHERE", &state.where_),
        state.limit.map(|n| format!("LIMIT {n}")).unwrap_or_default(),
    ]))
}
