//! The execution pipeline.
//!
//! Planning (render, contexts, key retrieval, batch decision) and result
//! interpretation are pure and shared; [`blocking`] and [`nonblocking`] only
//! differ in how they drive the driver.
//!
//! ```text
//! resolve defaults -> plan -> before interceptors -> prepare -> bind/add_batch
//!     -> execute -> generated keys -> interpret -> after interceptors
//! ```

pub(crate) mod blocking;
pub(crate) mod nonblocking;


use crate::config::ExecutionConfig;
use crate::context::{StatementContext, StatementKind};
use crate::dialect::Dialect;
use crate::driver::{DriverError, KeyRetrieval};
use crate::error::{StmtError, StmtResult};
use crate::interceptor::{CompositeInterceptor, ExecutionSummary, HookAction, StatementInterceptor};
use crate::statement::{RawOutcome, SqlStatement};
use std::time::{Duration, Instant};

/// Everything the executor needs to run a statement.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub kind: StatementKind,
    /// SQL template of the first round.
    pub sql: String,
    /// One context per round, at least one. Each carries its own template.
    pub contexts: Vec<StatementContext>,
    pub key_retrieval: KeyRetrieval,
    /// Send the rounds as a driver batch rather than a single update.
    pub batch: bool,
}

/// Render `stmt` and decide how to execute it.
pub fn plan<S: SqlStatement + ?Sized>(stmt: &S, dialect: &dyn Dialect) -> StmtResult<ExecutionPlan> {
    let kind = stmt.kind();
    let mut rendered = stmt.render(dialect, true)?;
    if rendered.rounds.is_empty() {
        rendered.rounds.push(Vec::new());
    }
    let batch = rendered.rounds.len() > 1 || stmt.always_batch(dialect);

    let key_columns = stmt.key_columns(dialect);
    let key_retrieval = if !dialect.supports_generated_keys() || key_columns.is_empty() {
        KeyRetrieval::None
    } else if dialect.supports_only_identifiers_in_generated_keys() {
        KeyRetrieval::Columns(key_columns.iter().map(|c| c.name().to_string()).collect())
    } else {
        KeyRetrieval::All
    };

    let contexts = rendered
        .rounds
        .iter()
        .enumerate()
        .map(|(round, args)| {
            StatementContext::new(rendered.round_sql(round), args.clone(), kind, round)
        })
        .collect();

    Ok(ExecutionPlan {
        kind,
        sql: rendered.sql,
        contexts,
        key_retrieval,
        batch,
    })
}

impl ExecutionPlan {
    /// Runs of consecutive rounds sharing one template; each run is
    /// prepared once.
    pub fn templates(&self) -> impl Iterator<Item = &[StatementContext]> {
        self.contexts.chunk_by(|a, b| a.sql == b.sql)
    }

    pub fn template_count(&self) -> usize {
        self.templates().count()
    }
}

/// Counts gathered from the driver, kept after the outcome is interpreted.
pub(crate) struct Tally {
    pub affected: Vec<u64>,
    pub generated_keys: usize,
}

impl Tally {
    pub(crate) fn of(outcome: &RawOutcome) -> Self {
        Self {
            affected: outcome.counts.clone(),
            generated_keys: outcome.generated_keys.as_ref().map_or(0, Vec::len),
        }
    }
}

/// Dialect, interceptor chain and settings of one transaction.
pub(crate) struct Pipeline<'a> {
    pub dialect: &'a dyn Dialect,
    /// Database-wide interceptors, then transaction-scoped ones.
    pub interceptors: [&'a CompositeInterceptor; 2],
    pub config: &'a ExecutionConfig,
}

impl Pipeline<'_> {
    /// Resolve defaults, plan and run the before-interceptors.
    pub(crate) fn start<S: SqlStatement + ?Sized>(
        &self,
        stmt: &mut S,
        with_keys: bool,
    ) -> StmtResult<ExecutionPlan> {
        stmt.resolve_defaults()?;
        let mut plan = plan(stmt, self.dialect)?;
        if !with_keys {
            plan.key_retrieval = KeyRetrieval::None;
        }

        for interceptors in self.interceptors {
            for ctx in &plan.contexts {
                if let HookAction::Abort(reason) = interceptors.before_execution(ctx) {
                    let err = StmtError::Aborted(reason);
                    self.report_error(&plan, &err);
                    return Err(err);
                }
            }
        }

        if self.config.log_sql {
            tracing::debug!(
                target: "typedml.exec",
                kind = %plan.kind,
                rounds = plan.contexts.len(),
                templates = plan.template_count(),
                batch = plan.batch,
                keys = ?plan.key_retrieval,
                sql = %plan.sql,
                "executing statement"
            );
        } else {
            tracing::debug!(
                target: "typedml.exec",
                kind = %plan.kind,
                rounds = plan.contexts.len(),
                templates = plan.template_count(),
                batch = plan.batch,
                keys = ?plan.key_retrieval,
                "executing statement"
            );
        }
        Ok(plan)
    }

    /// Wrap a driver failure with every round's context.
    pub(crate) fn database_error(&self, plan: &ExecutionPlan, source: DriverError) -> StmtError {
        StmtError::Database {
            source,
            contexts: plan.contexts.clone(),
        }
    }

    /// Report the result to the interceptors and hand the output back.
    pub(crate) fn finish<T>(
        &self,
        plan: &ExecutionPlan,
        started: Instant,
        result: StmtResult<(T, Tally)>,
    ) -> StmtResult<T> {
        let elapsed = started.elapsed();
        match result {
            Ok((output, tally)) => {
                let summary = ExecutionSummary {
                    kind: plan.kind,
                    rounds: plan.contexts.len(),
                    affected: tally.affected,
                    duration: elapsed,
                    batch: plan.batch,
                    generated_keys: tally.generated_keys,
                };
                tracing::debug!(
                    target: "typedml.exec",
                    kind = %plan.kind,
                    affected = summary.total_affected(),
                    generated_keys = summary.generated_keys,
                    duration_ms = elapsed.as_millis() as u64,
                    "statement complete"
                );
                self.warn_if_slow(plan, elapsed);
                for interceptors in self.interceptors {
                    interceptors.after_execution(&plan.contexts, &summary);
                }
                Ok(output)
            }
            Err(err) => {
                self.report_error(plan, &err);
                Err(err)
            }
        }
    }

    fn report_error(&self, plan: &ExecutionPlan, err: &StmtError) {
        for interceptors in self.interceptors {
            interceptors.on_error(&plan.contexts, err);
        }
    }

    fn warn_if_slow(&self, plan: &ExecutionPlan, elapsed: Duration) {
        if self.config.is_slow(elapsed) {
            tracing::warn!(
                target: "typedml.exec",
                kind = %plan.kind,
                rounds = plan.contexts.len(),
                duration_ms = elapsed.as_millis() as u64,
                sql = %plan.sql,
                "slow statement"
            );
        }
    }
}

/// The only round of a query plan.
pub(crate) fn query_context(plan: &ExecutionPlan) -> StmtResult<&StatementContext> {
    match plan.contexts.as_slice() {
        [only] => Ok(only),
        _ => Err(StmtError::validation(format!(
            "a query executes exactly one round, got {}",
            plan.contexts.len()
        ))),
    }
}

/// Queries report no affected counts.
pub(crate) fn query_tally() -> Tally {
    Tally {
        affected: Vec::new(),
        generated_keys: 0,
    }
}
