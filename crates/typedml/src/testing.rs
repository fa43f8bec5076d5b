//! Fixtures and an in-memory scripted driver for unit tests.

use crate::driver::{
    AsyncDriver, AsyncPreparedStatement, Driver, DriverError, DriverErrorKind, KeyRetrieval,
    PreparedStatement, ResultRow,
};
use crate::query_builder::Arg;
use crate::schema::{ColumnDef, ColumnType, Table};
use crate::value::Value;
use futures_core::Stream;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

/// `users(id bigint auto-increment pk, name varchar(50), email varchar(100) null unique, note text null)`
pub(crate) fn users() -> Arc<Table> {
    Table::builder("users")
        .column(ColumnDef::new("id", ColumnType::BigInt).auto_increment())
        .column(ColumnDef::new("name", ColumnType::Varchar(Some(50))))
        .column(ColumnDef::new("email", ColumnType::Varchar(Some(100))).nullable())
        .column(ColumnDef::new("note", ColumnType::Text).nullable())
        .primary_key(&["id"])
        .unique_index(&["email"])
        .build()
        .unwrap()
}

/// `events(id auto-increment pk, title varchar(100), created timestamp default CURRENT_TIMESTAMP)`
pub(crate) fn events() -> Arc<Table> {
    Table::builder("events")
        .column(ColumnDef::new("id", ColumnType::BigInt).auto_increment())
        .column(ColumnDef::new("title", ColumnType::Varchar(Some(100))))
        .column(ColumnDef::new("created", ColumnType::Timestamp).db_default("CURRENT_TIMESTAMP"))
        .primary_key(&["id"])
        .build()
        .unwrap()
}

pub(crate) fn counters() -> Arc<Table> {
    Table::builder("counters")
        .column(ColumnDef::new("id", ColumnType::BigInt).auto_increment())
        .primary_key(&["id"])
        .build()
        .unwrap()
}

pub(crate) fn staging() -> Arc<Table> {
    Table::builder("staging")
        .column(ColumnDef::new("id", ColumnType::BigInt))
        .column(ColumnDef::new("name", ColumnType::Varchar(Some(50))))
        .primary_key(&["id"])
        .build()
        .unwrap()
}

/// A table without any key.
pub(crate) fn tags() -> Arc<Table> {
    Table::builder("tags")
        .column(ColumnDef::new("label", ColumnType::Text))
        .build()
        .unwrap()
}

/// `orders(id entity id pk, item varchar(50))`. Ids come from the entity
/// layer, so rows may omit them.
pub(crate) fn orders() -> Arc<Table> {
    Table::builder("orders")
        .column(ColumnDef::new(
            "id",
            ColumnType::EntityId(Box::new(ColumnType::BigInt)),
        ))
        .column(ColumnDef::new("item", ColumnType::Varchar(Some(50))))
        .primary_key(&["id"])
        .build()
        .unwrap()
}

/// `tickets(id auto-increment pk, seq bigint client default 100, 101, ..., title varchar(100))`
///
/// Every call gets its own sequence.
pub(crate) fn tickets() -> Arc<Table> {
    let next = Arc::new(AtomicI64::new(100));
    Table::builder("tickets")
        .column(ColumnDef::new("id", ColumnType::BigInt).auto_increment())
        .column(
            ColumnDef::new("seq", ColumnType::BigInt)
                .default_fn(move || Value::BigInt(next.fetch_add(1, Ordering::SeqCst))),
        )
        .column(ColumnDef::new("title", ColumnType::Varchar(Some(100))))
        .primary_key(&["id"])
        .build()
        .unwrap()
}

/// One driver interaction, in call order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Prepare { sql: String, keys: KeyRetrieval },
    Fill(Vec<Arg>),
    AddBatch,
    ExecuteUpdate,
    ExecuteBatch,
    ExecuteQuery,
    GeneratedKeys,
    Release,
    CursorClosed,
}

/// Driver that records every call and replays scripted results.
///
/// Clones share the call log.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedDriver {
    log: Arc<Mutex<Vec<Call>>>,
    counts: Option<Vec<u64>>,
    keys: Option<Vec<ResultRow>>,
    /// Consumed one entry per prepared statement before falling back to `keys`.
    key_batches: Arc<Mutex<VecDeque<Vec<ResultRow>>>>,
    rows: Vec<ResultRow>,
    failure: Option<(DriverErrorKind, String)>,
    delay: Option<Duration>,
}

impl ScriptedDriver {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Affected counts returned by execution. Defaults to 1 per round.
    pub(crate) fn with_counts(mut self, counts: Vec<u64>) -> Self {
        self.counts = Some(counts);
        self
    }

    /// Key rows returned when keys were requested.
    pub(crate) fn with_keys(mut self, keys: Vec<ResultRow>) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Key rows for successive prepared statements.
    pub(crate) fn with_keys_per_statement(mut self, batches: Vec<Vec<ResultRow>>) -> Self {
        self.key_batches = Arc::new(Mutex::new(batches.into()));
        self
    }

    /// Rows produced by `execute_query`.
    pub(crate) fn with_rows(mut self, rows: Vec<ResultRow>) -> Self {
        self.rows = rows;
        self
    }

    /// Fail every execution with the given error.
    pub(crate) fn failing(mut self, kind: DriverErrorKind, message: &str) -> Self {
        self.failure = Some((kind, message.to_string()));
        self
    }

    /// Sleep this long in every async execution.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.log.lock().unwrap().clone()
    }

    /// SQL of every prepare call.
    pub(crate) fn prepared_sql(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Prepare { sql, .. } => Some(sql),
                _ => None,
            })
            .collect()
    }

    /// Arguments of every fill call.
    pub(crate) fn bound(&self) -> Vec<Vec<Arg>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Fill(args) => Some(args),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.log.lock().unwrap().push(call);
    }

    fn open(&self, sql: &str, keys: &KeyRetrieval) -> ScriptedPrepared<'_> {
        self.record(Call::Prepare {
            sql: sql.to_string(),
            keys: keys.clone(),
        });
        ScriptedPrepared {
            driver: self,
            keys: keys.clone(),
            queued: 0,
        }
    }
}

pub(crate) struct ScriptedPrepared<'a> {
    driver: &'a ScriptedDriver,
    keys: KeyRetrieval,
    queued: usize,
}

impl ScriptedPrepared<'_> {
    fn check(&self) -> Result<(), DriverError> {
        match &self.driver.failure {
            Some((kind, message)) => Err(DriverError::new(*kind, message.clone())),
            None => Ok(()),
        }
    }

    fn update(&self) -> Result<u64, DriverError> {
        self.driver.record(Call::ExecuteUpdate);
        self.check()?;
        Ok(self
            .driver
            .counts
            .as_ref()
            .and_then(|c| c.first().copied())
            .unwrap_or(1))
    }

    fn batch(&mut self) -> Result<Vec<u64>, DriverError> {
        self.driver.record(Call::ExecuteBatch);
        self.check()?;
        let queued = std::mem::take(&mut self.queued);
        Ok(self.driver.counts.clone().unwrap_or_else(|| vec![1; queued]))
    }

    fn query(&self) -> Result<ScriptedCursor, DriverError> {
        self.driver.record(Call::ExecuteQuery);
        self.check()?;
        Ok(ScriptedCursor {
            rows: self.driver.rows.iter().cloned().collect(),
            log: Arc::clone(&self.driver.log),
        })
    }

    fn keys(&self) -> Option<Vec<ResultRow>> {
        self.driver.record(Call::GeneratedKeys);
        if !self.keys.is_requested() {
            return None;
        }
        let next = self.driver.key_batches.lock().unwrap().pop_front();
        next.or_else(|| self.driver.keys.clone())
    }

    fn fill(&self, args: &[Arg]) {
        self.driver.record(Call::Fill(args.to_vec()));
    }

    fn queue(&mut self) {
        self.driver.record(Call::AddBatch);
        self.queued += 1;
    }

    async fn pause(&self) {
        if let Some(delay) = self.driver.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Drop for ScriptedPrepared<'_> {
    fn drop(&mut self) {
        self.driver.record(Call::Release);
    }
}

impl Driver for ScriptedDriver {
    type Prepared<'a>
        = ScriptedPrepared<'a>
    where
        Self: 'a;

    fn prepare<'a>(
        &'a mut self,
        sql: &str,
        keys: &KeyRetrieval,
    ) -> Result<Self::Prepared<'a>, DriverError> {
        Ok(self.open(sql, keys))
    }
}

impl PreparedStatement for ScriptedPrepared<'_> {
    type Cursor = ScriptedCursor;

    fn fill_parameters(&mut self, args: &[Arg]) -> Result<(), DriverError> {
        self.fill(args);
        Ok(())
    }

    fn add_batch(&mut self) -> Result<(), DriverError> {
        self.queue();
        Ok(())
    }

    fn execute_update(&mut self) -> Result<u64, DriverError> {
        self.update()
    }

    fn execute_batch(&mut self) -> Result<Vec<u64>, DriverError> {
        self.batch()
    }

    fn execute_query(self) -> Result<Self::Cursor, DriverError> {
        self.query()
    }

    fn generated_keys(&mut self) -> Result<Option<Vec<ResultRow>>, DriverError> {
        Ok(self.keys())
    }
}

impl AsyncDriver for ScriptedDriver {
    type Prepared<'a>
        = ScriptedPrepared<'a>
    where
        Self: 'a;

    fn prepare<'a>(
        &'a mut self,
        sql: &str,
        keys: &KeyRetrieval,
    ) -> impl Future<Output = Result<Self::Prepared<'a>, DriverError>> + Send {
        let prepared = self.open(sql, keys);
        async move { Ok(prepared) }
    }
}

impl AsyncPreparedStatement for ScriptedPrepared<'_> {
    type Cursor = ScriptedCursor;

    fn fill_parameters(&mut self, args: &[Arg]) -> Result<(), DriverError> {
        self.fill(args);
        Ok(())
    }

    fn add_batch(&mut self) -> Result<(), DriverError> {
        self.queue();
        Ok(())
    }

    fn execute_update(&mut self) -> impl Future<Output = Result<u64, DriverError>> + Send {
        async move {
            self.pause().await;
            self.update()
        }
    }

    fn execute_batch(&mut self) -> impl Future<Output = Result<Vec<u64>, DriverError>> + Send {
        async move {
            self.pause().await;
            self.batch()
        }
    }

    fn execute_query(self) -> impl Future<Output = Result<Self::Cursor, DriverError>> + Send {
        async move {
            self.pause().await;
            self.query()
        }
    }

    fn generated_keys(
        &mut self,
    ) -> impl Future<Output = Result<Option<Vec<ResultRow>>, DriverError>> + Send {
        async move { Ok(self.keys()) }
    }
}

/// Rows replayed by a scripted query. Logs `CursorClosed` when dropped.
pub(crate) struct ScriptedCursor {
    rows: VecDeque<ResultRow>,
    log: Arc<Mutex<Vec<Call>>>,
}

impl Iterator for ScriptedCursor {
    type Item = Result<ResultRow, DriverError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.pop_front().map(Ok)
    }
}

impl Stream for ScriptedCursor {
    type Item = Result<ResultRow, DriverError>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.rows.pop_front().map(Ok))
    }
}

impl Drop for ScriptedCursor {
    fn drop(&mut self) {
        self.log.lock().unwrap().push(Call::CursorClosed);
    }
}

/// Count calls matching `pred`.
pub(crate) fn count_calls(calls: &[Call], pred: impl Fn(&Call) -> bool) -> usize {
    calls.iter().filter(|c| pred(c)).count()
}
