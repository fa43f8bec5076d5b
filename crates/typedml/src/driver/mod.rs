//! Driver contracts consumed by the execution pipeline.
//!
//! [`Driver`] / [`PreparedStatement`] describe a blocking connection;
//! [`AsyncDriver`] / [`AsyncPreparedStatement`] describe the same protocol
//! with suspension points at prepare, execute and key retrieval.

pub mod blocking;
mod nonblocking;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use nonblocking::{AsyncDriver, AsyncPreparedStatement};

use crate::error::{StmtError, StmtResult};
use crate::query_builder::Arg;
use crate::value::Value;
use std::fmt;
use thiserror::Error;

/// How generated keys should be requested when preparing a statement.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum KeyRetrieval {
    #[default]
    None,
    /// Every generated column.
    All,
    /// Only the named identifier columns.
    Columns(Vec<String>),
}

impl KeyRetrieval {
    pub fn is_requested(&self) -> bool {
        !matches!(self, KeyRetrieval::None)
    }
}

/// Classification of a driver failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    UniqueViolation,
    ForeignKeyViolation,
    CheckViolation,
    NotNullViolation,
    Connection,
    Other,
}

/// Error reported by a driver while preparing, binding or executing.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub message: String,
    /// SQLSTATE code, when the database reported one.
    pub sql_state: Option<String>,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl DriverError {
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            sql_state: None,
            source: None,
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Other, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Connection, message)
    }

    pub fn with_sql_state(mut self, code: impl Into<String>) -> Self {
        self.sql_state = Some(code.into());
        self
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Classify a SQLSTATE code.
    pub fn kind_for_sql_state(code: &str) -> DriverErrorKind {
        match code {
            "23505" => DriverErrorKind::UniqueViolation,
            "23503" => DriverErrorKind::ForeignKeyViolation,
            "23514" => DriverErrorKind::CheckViolation,
            "23502" => DriverErrorKind::NotNullViolation,
            c if c.starts_with("08") => DriverErrorKind::Connection,
            _ => DriverErrorKind::Other,
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        self.kind == DriverErrorKind::UniqueViolation
    }

    pub fn is_foreign_key_violation(&self) -> bool {
        self.kind == DriverErrorKind::ForeignKeyViolation
    }

    pub fn is_connection(&self) -> bool {
        self.kind == DriverErrorKind::Connection
    }
}

/// One row returned by the driver: generated keys or RETURNING output.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultRow {
    columns: Vec<(String, Value)>,
}

impl ResultRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column, replacing an existing entry with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.columns.push((name, value)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Like [`get`](Self::get) but fails with `NotFound`.
    pub fn try_get(&self, name: &str) -> StmtResult<&Value> {
        self.get(name)
            .ok_or_else(|| StmtError::NotFound(format!("column '{name}' is not in the result row")))
    }

    /// Integer column value.
    pub fn get_i64(&self, name: &str) -> StmtResult<i64> {
        let value = self.try_get(name)?;
        value
            .as_i64()
            .ok_or_else(|| StmtError::decode(name, format!("expected an integer, got {}", value.type_name())))
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Overlay `other` on top of this row.
    pub fn merge(&mut self, other: ResultRow) {
        for (name, value) in other.columns {
            self.insert(name, value);
        }
    }
}

impl<N: Into<String>> FromIterator<(N, Value)> for ResultRow {
    fn from_iter<I: IntoIterator<Item = (N, Value)>>(iter: I) -> Self {
        let mut row = ResultRow::new();
        for (n, v) in iter {
            row.insert(n, v);
        }
        row
    }
}

impl fmt::Display for ResultRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (n, v)) in self.columns.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{n}: {v}")?;
        }
        f.write_str("}")
    }
}

/// A blocking connection able to prepare statements.
pub trait Driver {
    type Prepared<'a>: PreparedStatement
    where
        Self: 'a;

    /// Prepare `sql` (with `?` placeholders), requesting generated keys as given.
    fn prepare<'a>(
        &'a mut self,
        sql: &str,
        keys: &KeyRetrieval,
    ) -> Result<Self::Prepared<'a>, DriverError>;
}

/// A prepared statement handle. Dropping it releases the statement.
pub trait PreparedStatement {
    type Cursor: Iterator<Item = Result<ResultRow, DriverError>>;

    /// Bind one round of arguments, replacing the previous binding.
    fn fill_parameters(&mut self, args: &[Arg]) -> Result<(), DriverError>;

    /// Queue the current binding as one batch round.
    fn add_batch(&mut self) -> Result<(), DriverError>;

    fn execute_update(&mut self) -> Result<u64, DriverError>;

    /// Execute every queued round; one affected count per round.
    fn execute_batch(&mut self) -> Result<Vec<u64>, DriverError>;

    fn execute_query(self) -> Result<Self::Cursor, DriverError>;

    /// Key rows produced by the last execution, if any were requested.
    fn generated_keys(&mut self) -> Result<Option<Vec<ResultRow>>, DriverError>;
}
