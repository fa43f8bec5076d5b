//! # typedml
//!
//! Typed INSERT / UPDATE / DELETE / UPSERT / MERGE statements for Rust.
//!
//! ## Features
//!
//! - **Typed columns**: values are checked against the column type and
//!   nullability when they are assigned, not when the database rejects them
//! - **Dialect-aware**: one statement renders for Postgres, MySQL, SQLite,
//!   H2 and SQL Server, or fails with `UnsupportedByDialect`
//! - **Batches**: row-by-row batch inserts/upserts/updates with a consistency
//!   check at every row boundary and a recoverable row cap
//! - **Generated keys**: auto-increment and database-default values are
//!   fetched back and exposed through the statement
//! - **Interceptors**: hook before/after every execution (tracing and
//!   statistics interceptors included)
//! - **Blocking and async**: the same pipeline drives [`Driver`] and
//!   [`AsyncDriver`] backends; `tokio-postgres` is supported out of the box
//!
//! ## Example
//!
//! ```ignore
//! use typedml::{ColumnDef, ColumnType, Database, InsertStatement, PostgresDialect, Table};
//!
//! let users = Table::builder("users")
//!     .column(ColumnDef::new("id", ColumnType::BigInt).auto_increment())
//!     .column(ColumnDef::new("name", ColumnType::Varchar(Some(50))))
//!     .primary_key(&["id"])
//!     .build()?;
//! let (id, name) = (users.col("id")?, users.col("name")?);
//!
//! let db = Database::new(PostgresDialect);
//! let mut tx = db.async_transaction(typedml::driver::postgres::PgDriver::new(client));
//!
//! let mut insert = InsertStatement::new(&users);
//! insert.set(&name, "alice")?;
//! tx.exec(&mut insert).await?;
//! println!("new id: {}", insert.get(&id)?);
//! ```

pub mod args;
pub mod column_values;
pub mod config;
pub mod context;
pub mod cursor;
pub mod database;
pub mod dialect;
pub mod driver;
pub mod error;
pub mod exec;
pub mod expr;
pub mod interceptor;
pub mod query_builder;
pub mod schema;
pub mod statement;
pub mod value;

#[cfg(test)]
mod testing;

pub use args::{count_placeholders, expand_args, number_placeholders};
pub use column_values::{BoundValue, ColumnValues};
pub use config::ExecutionConfig;
pub use context::{StatementContext, StatementKind};
pub use cursor::{RowCursor, RowStream};
pub use database::{AsyncTransaction, Database, Transaction};
pub use dialect::{
    Dialect, H2Dialect, MysqlDialect, PostgresDialect, SqlServerDialect, SqliteDialect,
    dialect_for_name,
};
pub use driver::{
    AsyncDriver, AsyncPreparedStatement, Driver, DriverError, DriverErrorKind, KeyRetrieval,
    PreparedStatement, ResultRow,
};
pub use error::{StmtError, StmtResult};
pub use expr::Expr;
pub use interceptor::{
    CompositeInterceptor, ExecutionSummary, HookAction, StatementInterceptor, StatementStats,
    StatsInterceptor, TracingInterceptor,
};
pub use query_builder::{Arg, QueryBuilder};
pub use schema::{Column, ColumnDef, ColumnRef, ColumnType, Table};
pub use statement::{
    BatchInsertStatement, BatchReplaceStatement, BatchStatement, BatchUpdateStatement,
    BatchUpsertStatement, ConflictValue, DeleteStatement, InsertStatement, MergeClause,
    MergeSource, MergeStatement, MutationStatement, ReplaceStatement, Returnable,
    ReturningStatement, SqlStatement, UpdateStatement, UpsertStatement,
};
pub use value::Value;
