use std::time::Duration;

/// Execution settings shared by every transaction of a [`Database`](crate::Database).
///
/// By default there is no timeout, no slow-statement warning and SQL is not
/// logged by the pipeline itself.
#[derive(Debug, Clone, Default)]
pub struct ExecutionConfig {
    /// Statement timeout for the async executor. `None` means no timeout.
    pub statement_timeout: Option<Duration>,
    /// Executions slower than this emit a `warn` event.
    pub slow_statement_threshold: Option<Duration>,
    /// Include the SQL template in the pipeline's own `debug` events.
    pub log_sql: bool,
}

impl ExecutionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the statement timeout.
    ///
    /// Only the async executor can enforce it: the in-flight driver future is
    /// dropped and `StmtError::Timeout` is returned.
    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }

    pub fn with_slow_statement_threshold(mut self, threshold: Duration) -> Self {
        self.slow_statement_threshold = Some(threshold);
        self
    }

    pub fn log_sql(mut self, enabled: bool) -> Self {
        self.log_sql = enabled;
        self
    }

    pub(crate) fn is_slow(&self, elapsed: Duration) -> bool {
        self.slow_statement_threshold
            .is_some_and(|threshold| elapsed >= threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExecutionConfig::new();
        assert!(config.statement_timeout.is_none());
        assert!(!config.is_slow(Duration::from_secs(3600)));
        assert!(!config.log_sql);
    }

    #[test]
    fn test_slow_threshold() {
        let config = ExecutionConfig::new()
            .with_slow_statement_threshold(Duration::from_millis(100))
            .with_statement_timeout(Duration::from_secs(1))
            .log_sql(true);
        assert!(config.is_slow(Duration::from_millis(100)));
        assert!(!config.is_slow(Duration::from_millis(99)));
        assert_eq!(config.statement_timeout, Some(Duration::from_secs(1)));
    }
}
