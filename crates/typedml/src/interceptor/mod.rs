//! Statement interceptors: hooks around every execution.
//!
//! An interceptor sees the statement contexts (one per round) before the
//! driver is touched, and the outcome or error afterwards. Interceptors
//! registered on a [`Database`](crate::Database) run for every transaction;
//! transaction-level interceptors run after them.
//!
//! # Example
//!
//! ```rust,ignore
//! use typedml::interceptor::{HookAction, StatementInterceptor};
//! use typedml::StatementContext;
//!
//! struct NoDeletes;
//!
//! impl StatementInterceptor for NoDeletes {
//!     fn before_execution(&self, ctx: &StatementContext) -> HookAction {
//!         if ctx.kind == typedml::StatementKind::Delete {
//!             return HookAction::Abort("deletes are disabled".into());
//!         }
//!         HookAction::Continue
//!     }
//! }
//! ```

mod stats;
mod tracing_hook;

#[cfg(test)]
mod tests;

pub use self::stats::{StatementStats, StatsInterceptor};
pub use self::tracing_hook::TracingInterceptor;

use crate::context::{StatementContext, StatementKind};
use crate::error::StmtError;
use std::sync::Arc;
use std::time::Duration;

/// Decision returned by [`StatementInterceptor::before_execution`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookAction {
    Continue,
    /// Stop before the driver is called; the caller gets `StmtError::Aborted`.
    Abort(String),
}

/// What an execution did, reported to `after_execution`.
#[derive(Debug, Clone)]
pub struct ExecutionSummary {
    pub kind: StatementKind,
    pub rounds: usize,
    /// Affected row count per round.
    pub affected: Vec<u64>,
    pub duration: Duration,
    /// Whether the rounds were sent as a driver batch.
    pub batch: bool,
    /// Number of generated key rows returned.
    pub generated_keys: usize,
}

impl ExecutionSummary {
    pub fn total_affected(&self) -> u64 {
        self.affected.iter().sum()
    }
}

/// Hook into the statement execution lifecycle.
pub trait StatementInterceptor: Send + Sync {
    /// Called once per round before the statement is prepared.
    fn before_execution(&self, _ctx: &StatementContext) -> HookAction {
        HookAction::Continue
    }

    /// Called after a successful execution with every round's context.
    fn after_execution(&self, _contexts: &[StatementContext], _summary: &ExecutionSummary) {}

    /// Called when preparing, binding, executing or interpreting failed.
    fn on_error(&self, _contexts: &[StatementContext], _error: &StmtError) {}
}

/// An interceptor that runs several interceptors in order.
///
/// The first `Abort` wins; later interceptors are not consulted for that round.
#[derive(Clone, Default)]
pub struct CompositeInterceptor {
    interceptors: Vec<Arc<dyn StatementInterceptor>>,
}

impl CompositeInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an interceptor.
    #[allow(clippy::should_implement_trait)]
    pub fn add<I: StatementInterceptor + 'static>(mut self, interceptor: I) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Add an Arc-wrapped interceptor.
    pub fn add_arc(mut self, interceptor: Arc<dyn StatementInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn push(&mut self, interceptor: Arc<dyn StatementInterceptor>) {
        self.interceptors.push(interceptor);
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// This chain followed by `other`.
    pub fn chain(&self, other: &CompositeInterceptor) -> CompositeInterceptor {
        let mut interceptors = self.interceptors.clone();
        interceptors.extend(other.interceptors.iter().cloned());
        CompositeInterceptor { interceptors }
    }
}

impl std::fmt::Debug for CompositeInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeInterceptor")
            .field("len", &self.interceptors.len())
            .finish()
    }
}

impl StatementInterceptor for CompositeInterceptor {
    fn before_execution(&self, ctx: &StatementContext) -> HookAction {
        for interceptor in &self.interceptors {
            if let HookAction::Abort(reason) = interceptor.before_execution(ctx) {
                return HookAction::Abort(reason);
            }
        }
        HookAction::Continue
    }

    fn after_execution(&self, contexts: &[StatementContext], summary: &ExecutionSummary) {
        for interceptor in &self.interceptors {
            interceptor.after_execution(contexts, summary);
        }
    }

    fn on_error(&self, contexts: &[StatementContext], error: &StmtError) {
        for interceptor in &self.interceptors {
            interceptor.on_error(contexts, error);
        }
    }
}

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
