//! `tokio-postgres` backed driver.
//!
//! Works with anything implementing [`tokio_postgres::GenericClient`]
//! (a `Client` or a `Transaction`). Placeholders are numbered before
//! preparing, and generated keys are fetched by appending `RETURNING`.
//!
//! ```ignore
//! let (client, connection) = tokio_postgres::connect(&url, NoTls).await?;
//! tokio::spawn(connection);
//!
//! let db = Database::new(PostgresDialect);
//! let mut tx = db.async_transaction(PgDriver::new(client));
//! let affected = tx.exec(&mut insert).await?;
//! ```

use super::blocking::BlockOn;
use super::{AsyncDriver, AsyncPreparedStatement, DriverError, KeyRetrieval, ResultRow};
use crate::args::number_placeholders;
use crate::query_builder::Arg;
use crate::value::Value;
use bytes::BytesMut;
use futures_core::Stream;
use std::error::Error;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_postgres::types::{FromSql, IsNull, ToSql, Type, to_sql_checked};
use tokio_postgres::{GenericClient, Row, RowStream, Statement};

/// Blocking Postgres driver.
pub type BlockingPgDriver<C> = BlockOn<PgDriver<C>>;

/// Async driver over a `tokio-postgres` client or transaction.
#[derive(Debug)]
pub struct PgDriver<C> {
    client: C,
}

impl<C> PgDriver<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn into_inner(self) -> C {
        self.client
    }
}

/// Postgres SQL for a `?` template plus the requested key retrieval.
pub(crate) fn pg_sql(sql: &str, keys: &KeyRetrieval) -> String {
    let mut sql = number_placeholders(sql);
    match keys {
        KeyRetrieval::None => {}
        KeyRetrieval::All => sql.push_str(" RETURNING *"),
        KeyRetrieval::Columns(columns) => {
            sql.push_str(" RETURNING ");
            sql.push_str(&columns.join(", "));
        }
    }
    sql
}

impl<C: GenericClient + Send + Sync> AsyncDriver for PgDriver<C> {
    type Prepared<'a>
        = PgPrepared<'a, C>
    where
        Self: 'a;

    fn prepare<'a>(
        &'a mut self,
        sql: &str,
        keys: &KeyRetrieval,
    ) -> impl Future<Output = Result<Self::Prepared<'a>, DriverError>> + Send {
        let sql = pg_sql(sql, keys);
        let returns_rows = keys.is_requested();
        let client = &self.client;
        async move {
            tracing::trace!(target: "typedml.pg", sql = %sql, "prepare");
            let statement = client.prepare(&sql).await.map_err(map_pg_error)?;
            Ok(PgPrepared {
                client,
                statement,
                returns_rows,
                current: Vec::new(),
                batch: Vec::new(),
                keys: None,
            })
        }
    }
}

/// Prepared statement on a [`PgDriver`].
pub struct PgPrepared<'a, C> {
    client: &'a C,
    statement: Statement,
    returns_rows: bool,
    current: Vec<Value>,
    batch: Vec<Vec<Value>>,
    keys: Option<Vec<ResultRow>>,
}

impl<C: GenericClient + Send + Sync> PgPrepared<'_, C> {
    async fn run_round(&self, params: &[Value]) -> Result<(u64, Option<Vec<ResultRow>>), DriverError> {
        let refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
        if self.returns_rows {
            let rows = self
                .client
                .query(&self.statement, &refs)
                .await
                .map_err(map_pg_error)?;
            let keys = rows.iter().map(row_to_result).collect::<Result<Vec<_>, _>>()?;
            Ok((rows.len() as u64, Some(keys)))
        } else {
            let n = self
                .client
                .execute(&self.statement, &refs)
                .await
                .map_err(map_pg_error)?;
            Ok((n, None))
        }
    }
}

impl<C: GenericClient + Send + Sync> AsyncPreparedStatement for PgPrepared<'_, C> {
    type Cursor = PgRowStream;

    fn fill_parameters(&mut self, args: &[Arg]) -> Result<(), DriverError> {
        let expected = self.statement.params().len();
        if args.len() != expected {
            return Err(DriverError::other(format!(
                "statement expects {expected} parameter(s), got {}",
                args.len()
            )));
        }
        self.current = args.iter().map(|a| a.value.clone()).collect();
        Ok(())
    }

    fn add_batch(&mut self) -> Result<(), DriverError> {
        self.batch.push(std::mem::take(&mut self.current));
        Ok(())
    }

    fn execute_update(&mut self) -> impl Future<Output = Result<u64, DriverError>> + Send {
        async move {
            let (n, keys) = self.run_round(&self.current).await?;
            self.keys = keys;
            Ok(n)
        }
    }

    fn execute_batch(&mut self) -> impl Future<Output = Result<Vec<u64>, DriverError>> + Send {
        async move {
            let rounds = std::mem::take(&mut self.batch);
            let mut counts = Vec::with_capacity(rounds.len());
            let mut keys: Option<Vec<ResultRow>> = None;
            for params in &rounds {
                let (n, round_keys) = self.run_round(params).await?;
                counts.push(n);
                if let Some(k) = round_keys {
                    keys.get_or_insert_with(Vec::new).extend(k);
                }
            }
            self.keys = keys;
            Ok(counts)
        }
    }

    fn execute_query(self) -> impl Future<Output = Result<Self::Cursor, DriverError>> + Send {
        async move {
            let stream = self
                .client
                .query_raw(&self.statement, self.current.iter())
                .await
                .map_err(map_pg_error)?;
            Ok(PgRowStream {
                inner: Box::pin(stream),
            })
        }
    }

    fn generated_keys(
        &mut self,
    ) -> impl Future<Output = Result<Option<Vec<ResultRow>>, DriverError>> + Send {
        std::future::ready(Ok(self.keys.take()))
    }
}

/// Row stream of a Postgres query, converted to [`ResultRow`]s.
pub struct PgRowStream {
    inner: Pin<Box<RowStream>>,
}

impl Stream for PgRowStream {
    type Item = Result<ResultRow, DriverError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match futures_core::ready!(self.inner.as_mut().poll_next(cx)) {
            Some(Ok(row)) => Poll::Ready(Some(row_to_result(&row))),
            Some(Err(e)) => Poll::Ready(Some(Err(map_pg_error(e)))),
            None => Poll::Ready(None),
        }
    }
}

/// Map a `tokio_postgres::Error`, classifying SQLSTATE codes.
pub(crate) fn map_pg_error(err: tokio_postgres::Error) -> DriverError {
    if let Some(db) = err.as_db_error() {
        let code = db.code().code().to_string();
        let message = db.message().to_string();
        return DriverError::new(DriverError::kind_for_sql_state(&code), message)
            .with_sql_state(code)
            .with_source(err);
    }
    let kind = if err.is_closed() {
        super::DriverErrorKind::Connection
    } else {
        super::DriverErrorKind::Other
    };
    DriverError::new(kind, err.to_string()).with_source(err)
}

fn get<'r, T: FromSql<'r>>(row: &'r Row, idx: usize) -> Result<Option<T>, DriverError> {
    row.try_get(idx).map_err(map_pg_error)
}

fn column_value(row: &Row, idx: usize, ty: &Type) -> Result<Value, DriverError> {
    let value: Value = match *ty {
        Type::BOOL => get::<bool>(row, idx)?.into(),
        Type::INT2 => get::<i16>(row, idx)?.into(),
        Type::INT4 => get::<i32>(row, idx)?.into(),
        Type::INT8 => get::<i64>(row, idx)?.into(),
        Type::OID => get::<u32>(row, idx)?.map(i64::from).into(),
        Type::FLOAT4 => get::<f32>(row, idx)?.into(),
        Type::FLOAT8 => get::<f64>(row, idx)?.into(),
        #[cfg(feature = "rust_decimal")]
        Type::NUMERIC => get::<rust_decimal::Decimal>(row, idx)?.into(),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => get::<String>(row, idx)?.into(),
        Type::BYTEA => get::<Vec<u8>>(row, idx)?.into(),
        Type::UUID => get::<uuid::Uuid>(row, idx)?.into(),
        Type::DATE => get::<chrono::NaiveDate>(row, idx)?.into(),
        Type::TIMESTAMP => get::<chrono::NaiveDateTime>(row, idx)?.into(),
        Type::TIMESTAMPTZ => get::<chrono::DateTime<chrono::Utc>>(row, idx)?.into(),
        Type::JSON | Type::JSONB => get::<serde_json::Value>(row, idx)?.into(),
        _ => {
            return Err(DriverError::other(format!(
                "unsupported column type {ty} for column #{idx}"
            )));
        }
    };
    Ok(value)
}

fn row_to_result(row: &Row) -> Result<ResultRow, DriverError> {
    let mut out = ResultRow::new();
    for (idx, column) in row.columns().iter().enumerate() {
        out.insert(column.name(), column_value(row, idx, column.type_())?);
    }
    Ok(out)
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => b.to_sql(ty, out),
            Value::SmallInt(_) | Value::Int(_) | Value::BigInt(_) => {
                let n = self.as_i64().unwrap_or_default();
                match *ty {
                    Type::INT2 => i16::try_from(n)?.to_sql(ty, out),
                    Type::INT4 => i32::try_from(n)?.to_sql(ty, out),
                    Type::OID => u32::try_from(n)?.to_sql(ty, out),
                    Type::FLOAT4 => (n as f32).to_sql(ty, out),
                    Type::FLOAT8 => (n as f64).to_sql(ty, out),
                    #[cfg(feature = "rust_decimal")]
                    Type::NUMERIC => rust_decimal::Decimal::from(n).to_sql(ty, out),
                    Type::JSON | Type::JSONB => serde_json::Value::from(n).to_sql(ty, out),
                    _ => n.to_sql(ty, out),
                }
            }
            Value::Double(d) => match *ty {
                Type::FLOAT4 => (*d as f32).to_sql(ty, out),
                _ => d.to_sql(ty, out),
            },
            #[cfg(feature = "rust_decimal")]
            Value::Decimal(d) => d.to_sql(ty, out),
            Value::Text(s) => match *ty {
                Type::JSON | Type::JSONB => serde_json::Value::String(s.clone()).to_sql(ty, out),
                Type::UUID => uuid::Uuid::parse_str(s)?.to_sql(ty, out),
                _ => s.to_sql(ty, out),
            },
            Value::Bytes(b) => b.to_sql(ty, out),
            Value::Uuid(u) => u.to_sql(ty, out),
            Value::Date(d) => d.to_sql(ty, out),
            Value::Timestamp(t) => t.to_sql(ty, out),
            Value::TimestampTz(t) => t.to_sql(ty, out),
            Value::Json(j) => j.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}
