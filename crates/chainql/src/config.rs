use std::time::Duration;

/// Execution settings for a [`QueryBuilder`](crate::QueryBuilder).
///
/// SQL logging is on by default (DEBUG level, truncated to 200 bytes); slow
/// query detection is off until a threshold is set.
#[derive(Debug, Clone)]
pub struct ExecConfig {
    /// Emit a DEBUG event for every executed statement.
    pub log_sql: bool,
    /// Truncate logged SQL (in bytes). `None` means no truncation.
    pub max_sql_length: Option<usize>,
    /// Statements slower than this are logged at WARN.
    pub slow_query_threshold: Option<Duration>,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            log_sql: true,
            max_sql_length: Some(200),
            slow_query_threshold: None,
        }
    }
}

impl ExecConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn per-statement SQL logging on or off.
    ///
    /// Slow queries and driver failures are still logged.
    pub fn with_log_sql(mut self, enabled: bool) -> Self {
        self.log_sql = enabled;
        self
    }

    /// Set maximum SQL length to display.
    pub fn with_max_sql_length(mut self, len: usize) -> Self {
        self.max_sql_length = Some(len);
        self
    }

    /// Disable SQL truncation.
    pub fn no_truncate(mut self) -> Self {
        self.max_sql_length = None;
        self
    }

    /// Set the slow query threshold.
    pub fn with_slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = Some(threshold);
        self
    }

    pub(crate) fn is_slow(&self, elapsed: Duration) -> bool {
        self.slow_query_threshold.is_some_and(|t| elapsed >= t)
    }
}
