use super::{ExecutionSummary, StatementInterceptor};
use crate::context::{StatementContext, StatementKind};
use crate::error::StmtError;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// An interceptor that counts executions, rounds and failures.
#[derive(Debug, Default)]
pub struct StatsInterceptor {
    executions: AtomicU64,
    failed: AtomicU64,
    batched: AtomicU64,
    rounds: AtomicU64,
    affected_rows: AtomicU64,
    generated_keys: AtomicU64,
    insert_count: AtomicU64,
    update_count: AtomicU64,
    delete_count: AtomicU64,
    upsert_count: AtomicU64,
    merge_count: AtomicU64,
    total_duration_nanos: AtomicU64,
    max_duration_nanos: AtomicU64,
    slowest_statement: Mutex<Option<String>>,
}

/// Snapshot of [`StatsInterceptor`] counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementStats {
    /// Successful executions.
    pub executions: u64,
    pub failed: u64,
    /// Executions sent as a driver batch.
    pub batched: u64,
    pub rounds: u64,
    pub affected_rows: u64,
    pub generated_keys: u64,
    pub insert_count: u64,
    pub update_count: u64,
    pub delete_count: u64,
    pub upsert_count: u64,
    pub merge_count: u64,
    pub total_duration: Duration,
    pub max_duration: Duration,
    /// SQL template of the slowest execution.
    pub slowest_statement: Option<String>,
}

impl StatsInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of current statistics.
    pub fn stats(&self) -> StatementStats {
        StatementStats {
            executions: self.executions.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            batched: self.batched.load(Ordering::Relaxed),
            rounds: self.rounds.load(Ordering::Relaxed),
            affected_rows: self.affected_rows.load(Ordering::Relaxed),
            generated_keys: self.generated_keys.load(Ordering::Relaxed),
            insert_count: self.insert_count.load(Ordering::Relaxed),
            update_count: self.update_count.load(Ordering::Relaxed),
            delete_count: self.delete_count.load(Ordering::Relaxed),
            upsert_count: self.upsert_count.load(Ordering::Relaxed),
            merge_count: self.merge_count.load(Ordering::Relaxed),
            total_duration: Duration::from_nanos(self.total_duration_nanos.load(Ordering::Relaxed)),
            max_duration: Duration::from_nanos(self.max_duration_nanos.load(Ordering::Relaxed)),
            slowest_statement: self
                .slowest_statement
                .lock()
                .map(|s| s.clone())
                .unwrap_or_default(),
        }
    }

    /// Reset all statistics.
    pub fn reset(&self) {
        for counter in [
            &self.executions,
            &self.failed,
            &self.batched,
            &self.rounds,
            &self.affected_rows,
            &self.generated_keys,
            &self.insert_count,
            &self.update_count,
            &self.delete_count,
            &self.upsert_count,
            &self.merge_count,
            &self.total_duration_nanos,
            &self.max_duration_nanos,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        if let Ok(mut slowest) = self.slowest_statement.lock() {
            *slowest = None;
        }
    }

    fn kind_counter(&self, kind: StatementKind) -> Option<&AtomicU64> {
        match kind {
            StatementKind::Insert => Some(&self.insert_count),
            StatementKind::Update => Some(&self.update_count),
            StatementKind::Delete => Some(&self.delete_count),
            StatementKind::Upsert => Some(&self.upsert_count),
            StatementKind::Merge => Some(&self.merge_count),
            StatementKind::Other => None,
        }
    }
}

/// Add without wrapping on overflow.
fn saturating_add(counter: &AtomicU64, value: u64) {
    let prev = counter.fetch_add(value, Ordering::Relaxed);
    if prev.checked_add(value).is_none() {
        counter.store(u64::MAX, Ordering::Relaxed);
    }
}

impl StatementInterceptor for StatsInterceptor {
    fn after_execution(&self, contexts: &[StatementContext], summary: &ExecutionSummary) {
        let duration_nanos = u64::try_from(summary.duration.as_nanos()).unwrap_or(u64::MAX);

        self.executions.fetch_add(1, Ordering::Relaxed);
        if summary.batch {
            self.batched.fetch_add(1, Ordering::Relaxed);
        }
        saturating_add(&self.rounds, summary.rounds as u64);
        saturating_add(&self.affected_rows, summary.total_affected());
        saturating_add(&self.generated_keys, summary.generated_keys as u64);
        saturating_add(&self.total_duration_nanos, duration_nanos);
        if let Some(counter) = self.kind_counter(summary.kind) {
            counter.fetch_add(1, Ordering::Relaxed);
        }

        let mut current_max = self.max_duration_nanos.load(Ordering::Relaxed);
        while duration_nanos > current_max {
            match self.max_duration_nanos.compare_exchange_weak(
                current_max,
                duration_nanos,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    if let Ok(mut slowest) = self.slowest_statement.lock() {
                        *slowest = contexts.first().map(|c| c.sql.clone());
                    }
                    break;
                }
                Err(updated) => current_max = updated,
            }
        }
    }

    fn on_error(&self, _contexts: &[StatementContext], _error: &StmtError) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }
}
