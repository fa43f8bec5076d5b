use super::{ExecutionSummary, HookAction, StatementInterceptor, truncate_sql_bytes};
use crate::context::StatementContext;
use crate::error::StmtError;
use tracing::Level;

/// A `tracing`-based interceptor that emits the SQL of every round before
/// it reaches the driver, plus one event per completed or failed execution.
///
/// Events use the `typedml.sql` target.
#[derive(Debug, Clone)]
pub struct TracingInterceptor {
    /// Tracing event level to emit at.
    pub level: Level,
    /// Truncate long SQL strings (in bytes). `None` means no truncation.
    pub max_sql_length: Option<usize>,
    /// Log SQL with arguments substituted instead of the `?` template.
    pub expand_args: bool,
}

impl Default for TracingInterceptor {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            max_sql_length: Some(200),
            expand_args: false,
        }
    }
}

impl TracingInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the tracing event level.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set maximum SQL length to display.
    pub fn max_sql_length(mut self, len: usize) -> Self {
        self.max_sql_length = Some(len);
        self
    }

    /// Disable SQL truncation.
    pub fn no_truncate(mut self) -> Self {
        self.max_sql_length = None;
        self
    }

    /// Log SQL with its arguments inlined as literals.
    pub fn expand_args(mut self) -> Self {
        self.expand_args = true;
        self
    }

    pub(crate) fn render_sql(&self, ctx: &StatementContext) -> String {
        let sql = if self.expand_args {
            ctx.expanded_sql()
        } else {
            ctx.sql.clone()
        };
        match self.max_sql_length {
            Some(max) if sql.len() > max => format!("{}...", truncate_sql_bytes(&sql, max)),
            _ => sql,
        }
    }
}

/// Dispatch a tracing event at a runtime-determined level.
macro_rules! emit_at_level {
    ($level:expr, $($field:tt)*) => {
        match $level {
            Level::ERROR => tracing::error!($($field)*),
            Level::WARN  => tracing::warn!($($field)*),
            Level::INFO  => tracing::info!($($field)*),
            Level::DEBUG => tracing::debug!($($field)*),
            Level::TRACE => tracing::trace!($($field)*),
        }
    };
}

impl StatementInterceptor for TracingInterceptor {
    fn before_execution(&self, ctx: &StatementContext) -> HookAction {
        let sql = self.render_sql(ctx);
        emit_at_level!(
            self.level,
            target: "typedml.sql",
            kind = %ctx.kind,
            round = ctx.round,
            param_count = ctx.param_count(),
            sql = %sql,
        );
        HookAction::Continue
    }

    fn after_execution(&self, _contexts: &[StatementContext], summary: &ExecutionSummary) {
        emit_at_level!(
            self.level,
            target: "typedml.sql",
            kind = %summary.kind,
            rounds = summary.rounds,
            batch = summary.batch,
            affected = summary.total_affected(),
            generated_keys = summary.generated_keys,
            duration_ms = summary.duration.as_millis() as u64,
            "statement executed",
        );
    }

    fn on_error(&self, contexts: &[StatementContext], error: &StmtError) {
        let sql = contexts.first().map(|c| self.render_sql(c)).unwrap_or_default();
        tracing::warn!(
            target: "typedml.sql",
            rounds = contexts.len(),
            sql = %sql,
            error = %error,
            "statement failed",
        );
    }
}
