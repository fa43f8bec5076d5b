//! Blocking adapter over any [`AsyncDriver`].
//!
//! [`BlockOn`] owns a private current-thread tokio runtime and drives every
//! suspension point of the wrapped driver to completion. It must not be used
//! from inside another tokio runtime; call it from a plain thread or from
//! `tokio::task::spawn_blocking`.

use super::{
    AsyncDriver, AsyncPreparedStatement, Driver, DriverError, KeyRetrieval, PreparedStatement,
    ResultRow,
};
use crate::query_builder::Arg;
use futures_core::Stream;
use std::pin::Pin;
use tokio::runtime::{Builder, Runtime};

/// Runs an async driver on a private runtime, implementing [`Driver`].
#[derive(Debug)]
pub struct BlockOn<D> {
    driver: D,
    runtime: Runtime,
}

impl<D: AsyncDriver> BlockOn<D> {
    pub fn new(driver: D) -> Result<Self, DriverError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| DriverError::connection("failed to start blocking runtime").with_source(e))?;
        Ok(Self { driver, runtime })
    }

    pub fn get_ref(&self) -> &D {
        &self.driver
    }

    pub fn get_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn into_inner(self) -> D {
        self.driver
    }
}

impl<D: AsyncDriver> Driver for BlockOn<D> {
    type Prepared<'a>
        = BlockingPrepared<'a, D::Prepared<'a>>
    where
        Self: 'a;

    fn prepare<'a>(
        &'a mut self,
        sql: &str,
        keys: &KeyRetrieval,
    ) -> Result<Self::Prepared<'a>, DriverError> {
        let Self { driver, runtime } = self;
        let inner = runtime.block_on(driver.prepare(sql, keys))?;
        Ok(BlockingPrepared { runtime, inner })
    }
}

/// Prepared handle of a [`BlockOn`] driver.
pub struct BlockingPrepared<'a, P> {
    runtime: &'a Runtime,
    inner: P,
}

impl<'a, P: AsyncPreparedStatement> PreparedStatement for BlockingPrepared<'a, P> {
    type Cursor = BlockingCursor<'a, P::Cursor>;

    fn fill_parameters(&mut self, args: &[Arg]) -> Result<(), DriverError> {
        self.inner.fill_parameters(args)
    }

    fn add_batch(&mut self) -> Result<(), DriverError> {
        self.inner.add_batch()
    }

    fn execute_update(&mut self) -> Result<u64, DriverError> {
        self.runtime.block_on(self.inner.execute_update())
    }

    fn execute_batch(&mut self) -> Result<Vec<u64>, DriverError> {
        self.runtime.block_on(self.inner.execute_batch())
    }

    fn execute_query(self) -> Result<Self::Cursor, DriverError> {
        let stream = self.runtime.block_on(self.inner.execute_query())?;
        Ok(BlockingCursor {
            runtime: self.runtime,
            stream,
        })
    }

    fn generated_keys(&mut self) -> Result<Option<Vec<ResultRow>>, DriverError> {
        self.runtime.block_on(self.inner.generated_keys())
    }
}

/// Iterator over an async row stream, blocking on each row.
pub struct BlockingCursor<'a, S> {
    runtime: &'a Runtime,
    stream: S,
}

impl<S> Iterator for BlockingCursor<'_, S>
where
    S: Stream<Item = Result<ResultRow, DriverError>> + Unpin,
{
    type Item = Result<ResultRow, DriverError>;

    fn next(&mut self) -> Option<Self::Item> {
        let stream = &mut self.stream;
        self.runtime
            .block_on(std::future::poll_fn(|cx| Pin::new(&mut *stream).poll_next(cx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::dialect::PostgresDialect;
    use crate::expr::Expr;
    use crate::statement::{DeleteStatement, InsertStatement, ReturningStatement};
    use crate::testing::{Call, ScriptedDriver, count_calls, users};
    use crate::value::Value;

    #[test]
    fn test_block_on_matches_native_blocking_driver() {
        let t = users();
        let name = t.col("name").unwrap();
        let db = Database::new(PostgresDialect);
        let key = ResultRow::new().with("id", 9_i64);

        let native = ScriptedDriver::new().with_keys(vec![key.clone()]);
        let mut insert = InsertStatement::new(&t);
        insert.set(&name, "a").unwrap();
        db.transaction(native.clone()).exec(&mut insert).unwrap();

        let wrapped = ScriptedDriver::new().with_keys(vec![key]);
        let mut insert = InsertStatement::new(&t);
        insert.set(&name, "a").unwrap();
        let mut tx = db.transaction(BlockOn::new(wrapped.clone()).unwrap());
        assert_eq!(tx.exec(&mut insert).unwrap(), 1);

        assert_eq!(insert.get(&t.col("id").unwrap()).unwrap(), Value::BigInt(9));
        assert_eq!(native.calls(), wrapped.calls());
    }

    #[test]
    fn test_blocking_cursor_drains_stream() {
        let t = users();
        let rows = (1..=3_i64).map(|i| ResultRow::new().with("id", i)).collect();
        let driver = ScriptedDriver::new().with_rows(rows);
        let db = Database::new(PostgresDialect);
        let mut tx = db.transaction(BlockOn::new(driver.clone()).unwrap());

        let delete = DeleteStatement::new(&t).where_(Expr::is_not_null(&t.col("note").unwrap()));
        let mut stmt = ReturningStatement::all(delete);
        let ids: Vec<i64> = tx
            .query(&mut stmt)
            .unwrap()
            .map(|r| r.unwrap().get_i64("id").unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let calls = driver.calls();
        assert_eq!(count_calls(&calls, |c| matches!(c, Call::ExecuteQuery)), 1);
        assert_eq!(count_calls(&calls, |c| matches!(c, Call::CursorClosed)), 1);
    }
}
