use super::*;
use crate::query_builder::Arg;
use crate::schema::ColumnType;
use std::sync::Mutex;

fn ctx(kind: StatementKind, sql: &str) -> StatementContext {
    StatementContext::new(sql, vec![Arg::new(ColumnType::BigInt, 7_i64)], kind, 0)
}

fn summary(kind: StatementKind, affected: Vec<u64>, duration: Duration) -> ExecutionSummary {
    ExecutionSummary {
        kind,
        rounds: affected.len(),
        affected,
        duration,
        batch: false,
        generated_keys: 0,
    }
}

struct Recorder {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
    abort: bool,
}

impl StatementInterceptor for Recorder {
    fn before_execution(&self, _ctx: &StatementContext) -> HookAction {
        self.log.lock().unwrap().push(format!("{}:before", self.name));
        if self.abort {
            HookAction::Abort(format!("{} says no", self.name))
        } else {
            HookAction::Continue
        }
    }

    fn after_execution(&self, _contexts: &[StatementContext], _summary: &ExecutionSummary) {
        self.log.lock().unwrap().push(format!("{}:after", self.name));
    }

    fn on_error(&self, _contexts: &[StatementContext], _error: &StmtError) {
        self.log.lock().unwrap().push(format!("{}:error", self.name));
    }
}

#[test]
fn test_truncate_sql_bytes_respects_char_boundary() {
    assert_eq!(truncate_sql_bytes("abc", 10), "abc");
    assert_eq!(truncate_sql_bytes("abcdef", 3), "abc");
    // 'é' is two bytes; cutting at 2 would split it.
    assert_eq!(truncate_sql_bytes("aé", 2), "a");
}

#[test]
fn test_composite_runs_in_order_and_first_abort_wins() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let composite = CompositeInterceptor::new()
        .add(Recorder {
            name: "a",
            log: log.clone(),
            abort: false,
        })
        .add(Recorder {
            name: "b",
            log: log.clone(),
            abort: true,
        })
        .add(Recorder {
            name: "c",
            log: log.clone(),
            abort: false,
        });

    let action = composite.before_execution(&ctx(StatementKind::Delete, "DELETE FROM t"));
    assert_eq!(action, HookAction::Abort("b says no".to_string()));
    assert_eq!(*log.lock().unwrap(), vec!["a:before", "b:before"]);
}

#[test]
fn test_composite_chain_appends() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let first = CompositeInterceptor::new().add(Recorder {
        name: "db",
        log: log.clone(),
        abort: false,
    });
    let second = CompositeInterceptor::new().add(Recorder {
        name: "tx",
        log: log.clone(),
        abort: false,
    });
    let chained = first.chain(&second);
    assert_eq!(chained.len(), 2);

    let contexts = [ctx(StatementKind::Insert, "INSERT INTO t (id) VALUES (?)")];
    chained.after_execution(&contexts, &summary(StatementKind::Insert, vec![1], Duration::ZERO));
    chained.on_error(&contexts, &StmtError::Aborted("x".into()));
    assert_eq!(
        *log.lock().unwrap(),
        vec!["db:after", "tx:after", "db:error", "tx:error"]
    );
}

#[test]
fn test_stats_interceptor_counts() {
    let stats = StatsInterceptor::new();
    let contexts = [ctx(StatementKind::Update, "UPDATE t SET a = ?")];
    stats.after_execution(
        &contexts,
        &summary(StatementKind::Update, vec![2, 3], Duration::from_millis(5)),
    );
    let mut batched = summary(StatementKind::Insert, vec![1], Duration::from_millis(20));
    batched.batch = true;
    batched.generated_keys = 1;
    stats.after_execution(&[ctx(StatementKind::Insert, "INSERT INTO t (a) VALUES (?)")], &batched);
    stats.on_error(&contexts, &StmtError::Timeout(Duration::from_secs(1)));

    let s = stats.stats();
    assert_eq!(s.executions, 2);
    assert_eq!(s.failed, 1);
    assert_eq!(s.batched, 1);
    assert_eq!(s.rounds, 3);
    assert_eq!(s.affected_rows, 6);
    assert_eq!(s.generated_keys, 1);
    assert_eq!(s.update_count, 1);
    assert_eq!(s.insert_count, 1);
    assert_eq!(s.total_duration, Duration::from_millis(25));
    assert_eq!(s.max_duration, Duration::from_millis(20));
    assert_eq!(
        s.slowest_statement.as_deref(),
        Some("INSERT INTO t (a) VALUES (?)")
    );

    stats.reset();
    assert_eq!(stats.stats(), StatementStats::default());
}

#[test]
fn test_stats_interceptor_saturates_duration() {
    let stats = StatsInterceptor::new();
    let contexts = [ctx(StatementKind::Delete, "DELETE FROM t")];
    stats.after_execution(
        &contexts,
        &summary(StatementKind::Delete, vec![0], Duration::from_nanos(u64::MAX)),
    );
    stats.after_execution(
        &contexts,
        &summary(StatementKind::Delete, vec![0], Duration::from_nanos(10)),
    );
    assert_eq!(stats.stats().total_duration, Duration::from_nanos(u64::MAX));
}

#[test]
fn test_tracing_interceptor_renders_sql() {
    let hook = TracingInterceptor::new().max_sql_length(10);
    let c = ctx(StatementKind::Delete, "DELETE FROM users WHERE users.id = ?");
    assert_eq!(hook.render_sql(&c), "DELETE FRO...");

    let hook = TracingInterceptor::new().no_truncate().expand_args();
    assert_eq!(hook.render_sql(&c), "DELETE FROM users WHERE users.id = 7");
    assert_eq!(hook.before_execution(&c), HookAction::Continue);
}
