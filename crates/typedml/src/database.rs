//! [`Database`] and the unit-of-work objects that execute statements.
//!
//! ```ignore
//! use typedml::{Database, InsertStatement, PostgresDialect};
//! use typedml::driver::postgres::PgDriver;
//!
//! let db = Database::new(PostgresDialect).with_interceptor(TracingInterceptor::new());
//! let mut tx = db.async_transaction(PgDriver::new(client));
//!
//! let mut insert = InsertStatement::new(&users);
//! insert.set(&name, "alice")?;
//! tx.exec(&mut insert).await?;
//! let id = insert.get(&id)?;
//! ```

use crate::config::ExecutionConfig;
use crate::cursor::{RowCursor, RowStream};
use crate::dialect::Dialect;
use crate::driver::{AsyncDriver, AsyncPreparedStatement, Driver, PreparedStatement};
use crate::error::StmtResult;
use crate::exec::{Pipeline, blocking, nonblocking};
use crate::interceptor::{CompositeInterceptor, StatementInterceptor};
use crate::statement::{MutationStatement, Returnable, ReturningStatement, SqlStatement};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// A dialect plus the interceptors and settings shared by every transaction.
///
/// Cloning is cheap.
#[derive(Clone)]
pub struct Database {
    dialect: Arc<dyn Dialect>,
    interceptors: CompositeInterceptor,
    config: ExecutionConfig,
}

impl Database {
    pub fn new(dialect: impl Dialect + 'static) -> Self {
        Self::from_arc(Arc::new(dialect))
    }

    pub fn from_arc(dialect: Arc<dyn Dialect>) -> Self {
        Self {
            dialect,
            interceptors: CompositeInterceptor::new(),
            config: ExecutionConfig::default(),
        }
    }

    /// Add an interceptor that runs for every transaction.
    pub fn with_interceptor<I: StatementInterceptor + 'static>(mut self, interceptor: I) -> Self {
        self.interceptors = self.interceptors.add(interceptor);
        self
    }

    pub fn with_interceptor_arc(mut self, interceptor: Arc<dyn StatementInterceptor>) -> Self {
        self.interceptors = self.interceptors.add_arc(interceptor);
        self
    }

    pub fn with_config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// SQL of `stmt` with arguments inlined, for diagnostics.
    pub fn to_sql<S: SqlStatement + ?Sized>(&self, stmt: &S) -> StmtResult<String> {
        stmt.to_sql(self.dialect.as_ref())
    }

    /// Start a unit of work on a blocking driver.
    pub fn transaction<D: Driver>(&self, driver: D) -> Transaction<D> {
        Transaction {
            db: self.clone(),
            driver,
            interceptors: CompositeInterceptor::new(),
            modified: BTreeSet::new(),
        }
    }

    /// Start a unit of work on an async driver.
    pub fn async_transaction<D: AsyncDriver>(&self, driver: D) -> AsyncTransaction<D> {
        AsyncTransaction {
            db: self.clone(),
            driver,
            interceptors: CompositeInterceptor::new(),
            modified: BTreeSet::new(),
        }
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("dialect", &self.dialect.name())
            .field("interceptors", &self.interceptors)
            .field("config", &self.config)
            .finish()
    }
}

fn pipeline<'a>(db: &'a Database, local: &'a CompositeInterceptor) -> Pipeline<'a> {
    Pipeline {
        dialect: db.dialect.as_ref(),
        interceptors: [&db.interceptors, local],
        config: &db.config,
    }
}

fn record_targets(modified: &mut BTreeSet<String>, kind_is_dml: bool, targets: Vec<String>) {
    if kind_is_dml {
        modified.extend(targets);
    }
}

/// A unit of work over a blocking [`Driver`].
///
/// Commit and rollback belong to the driver's connection; the transaction
/// tracks which tables its statements modified.
pub struct Transaction<D> {
    db: Database,
    driver: D,
    interceptors: CompositeInterceptor,
    modified: BTreeSet<String>,
}

impl<D: Driver> Transaction<D> {
    /// Execute a DML statement and return its output.
    pub fn exec<S: MutationStatement + ?Sized>(&mut self, stmt: &mut S) -> StmtResult<S::Output> {
        let output = blocking::execute(
            &pipeline(&self.db, &self.interceptors),
            &mut self.driver,
            stmt,
        )?;
        record_targets(&mut self.modified, stmt.kind().is_dml(), stmt.targets());
        Ok(output)
    }

    /// Execute a RETURNING statement and iterate over its rows.
    pub fn query<S: Returnable>(
        &mut self,
        stmt: &mut ReturningStatement<S>,
    ) -> StmtResult<RowCursor<<D::Prepared<'_> as PreparedStatement>::Cursor>> {
        let targets = stmt.targets();
        let is_dml = stmt.kind().is_dml();
        let cursor = blocking::query(
            &pipeline(&self.db, &self.interceptors),
            &mut self.driver,
            stmt,
        )?;
        record_targets(&mut self.modified, is_dml, targets);
        Ok(cursor)
    }
}

impl<D> Transaction<D> {
    /// Add an interceptor scoped to this transaction; it runs after the
    /// database-wide ones.
    pub fn add_interceptor<I: StatementInterceptor + 'static>(&mut self, interceptor: I) {
        self.interceptors.push(Arc::new(interceptor));
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Tables modified by successful statements so far.
    pub fn modified_tables(&self) -> &BTreeSet<String> {
        &self.modified
    }

    pub fn take_modified_tables(&mut self) -> BTreeSet<String> {
        std::mem::take(&mut self.modified)
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn into_driver(self) -> D {
        self.driver
    }
}

/// A unit of work over an [`AsyncDriver`].
pub struct AsyncTransaction<D> {
    db: Database,
    driver: D,
    interceptors: CompositeInterceptor,
    modified: BTreeSet<String>,
}

impl<D: AsyncDriver> AsyncTransaction<D> {
    /// Execute a DML statement and return its output.
    ///
    /// Honors [`ExecutionConfig::statement_timeout`].
    pub async fn exec<S: MutationStatement + ?Sized>(
        &mut self,
        stmt: &mut S,
    ) -> StmtResult<S::Output> {
        let output = nonblocking::execute(
            &pipeline(&self.db, &self.interceptors),
            &mut self.driver,
            stmt,
        )
        .await?;
        record_targets(&mut self.modified, stmt.kind().is_dml(), stmt.targets());
        Ok(output)
    }

    /// Execute a RETURNING statement and stream its rows.
    pub async fn query<S: Returnable>(
        &mut self,
        stmt: &mut ReturningStatement<S>,
    ) -> StmtResult<RowStream<<D::Prepared<'_> as AsyncPreparedStatement>::Cursor>> {
        let targets = stmt.targets();
        let is_dml = stmt.kind().is_dml();
        let stream = nonblocking::query(
            &pipeline(&self.db, &self.interceptors),
            &mut self.driver,
            stmt,
        )
        .await?;
        record_targets(&mut self.modified, is_dml, targets);
        Ok(stream)
    }
}

impl<D> AsyncTransaction<D> {
    pub fn add_interceptor<I: StatementInterceptor + 'static>(&mut self, interceptor: I) {
        self.interceptors.push(Arc::new(interceptor));
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn modified_tables(&self) -> &BTreeSet<String> {
        &self.modified
    }

    pub fn take_modified_tables(&mut self) -> BTreeSet<String> {
        std::mem::take(&mut self.modified)
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn into_driver(self) -> D {
        self.driver
    }
}
