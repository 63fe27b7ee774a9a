//! SQL execution logging.
//!
//! Events go to the `chainql.sql` target. With the `tracing` feature disabled
//! every function here is a no-op.

use crate::config::ExecConfig;
use std::borrow::Cow;
use std::time::Duration;

/// Truncate a string to at most `max_bytes` bytes on a UTF-8 char boundary.
pub(crate) fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}

pub(crate) fn display_sql(sql: &str, max: Option<usize>) -> Cow<'_, str> {
    match max {
        Some(max) if sql.len() > max => Cow::Owned(format!("{}...", truncate_sql_bytes(sql, max))),
        _ => Cow::Borrowed(sql),
    }
}

/// Log a completed statement.
pub(crate) fn statement(config: &ExecConfig, mode: &str, sql: &str, elapsed: Duration) {
    #[cfg(feature = "tracing")]
    {
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        if config.is_slow(elapsed) {
            let sql = display_sql(sql, config.max_sql_length);
            tracing::warn!(target: "chainql.sql", mode, elapsed_ms, sql = %sql, "slow query");
        } else if config.log_sql {
            let sql = display_sql(sql, config.max_sql_length);
            tracing::debug!(target: "chainql.sql", mode, elapsed_ms, sql = %sql, "query");
        }
    }
    #[cfg(not(feature = "tracing"))]
    let _ = (config, mode, sql, elapsed);
}

/// Log a statement the driver rejected. The error itself is propagated by the caller.
pub(crate) fn failure(
    config: &ExecConfig,
    mode: &str,
    sql: &str,
    elapsed: Duration,
    err: &dyn std::fmt::Display,
) {
    #[cfg(feature = "tracing")]
    {
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let sql = display_sql(sql, config.max_sql_length);
        tracing::error!(target: "chainql.sql", mode, elapsed_ms, sql = %sql, error = %err, "query failed");
    }
    #[cfg(not(feature = "tracing"))]
    let _ = (config, mode, sql, elapsed, err);
}

/// Log a failure of a background connection task.
#[cfg(feature = "postgres")]
pub(crate) fn connection_error(err: &dyn std::fmt::Display) {
    #[cfg(feature = "tracing")]
    tracing::error!(target: "chainql.sql", error = %err, "connection error");
    #[cfg(not(feature = "tracing"))]
    let _ = err;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_sql_bytes("SELECT 1", 100), "SELECT 1");
        assert_eq!(truncate_sql_bytes("SELECT 1", 6), "SELECT");
        // 'é' is two bytes; cutting inside it backs off
        assert_eq!(truncate_sql_bytes("é", 1), "");
    }

    #[test]
    fn display_adds_ellipsis_only_when_cut() {
        assert_eq!(display_sql("SELECT 1", Some(6)), "SELECT...");
        assert_eq!(display_sql("SELECT 1", None), "SELECT 1");
        assert_eq!(display_sql("SELECT 1", Some(8)), "SELECT 1");
    }
}
