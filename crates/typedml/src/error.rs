//! Error types for typedml

use crate::context::StatementContext;
use crate::driver::DriverError;
use std::fmt;
use thiserror::Error;

/// Result type alias for typedml operations
pub type StmtResult<T> = Result<T, StmtError>;

/// Error types for statement construction and execution
#[derive(Debug, Error)]
pub enum StmtError {
    /// The same column was assigned twice within one row
    #[error("Column '{column}' is already assigned in this row")]
    DuplicateAssignment { column: String },

    /// NULL was assigned to a NOT NULL column
    #[error("Trying to set NULL to not nullable column '{column}'")]
    NotNullViolation { column: String },

    /// A value is not acceptable for the column's type
    #[error("Invalid value for column '{column}': {message}")]
    InvalidValue { column: String, message: String },

    /// An expression was assigned to a column earlier batch rows bound to a literal
    #[error(
        "Column '{column}' was bound to a literal in a previous batch row and cannot take an expression"
    )]
    BatchExpressionConflict { column: String },

    /// A batch row cannot be merged with the rows before it
    #[error("Batch data for table '{table}' is inconsistent: {message}")]
    BatchDataInconsistent {
        table: String,
        columns: Vec<String>,
        message: String,
    },

    /// The dialect's physical batch-size cap was reached
    #[error("Too many rows in one batch for table '{table}': limit is {limit}")]
    BatchRowLimitExceeded { table: String, limit: usize },

    /// The active dialect cannot express the requested feature
    #[error("{feature} is not supported by the {dialect} dialect")]
    UnsupportedByDialect {
        dialect: &'static str,
        feature: String,
    },

    /// UPDATE without any SET column
    #[error("UPDATE on '{table}' has no columns to set")]
    EmptyUpdate { table: String },

    /// A statement that needs at least one column got none
    #[error("Statement on '{table}' has no columns to insert")]
    NoColumnsToInsert { table: String },

    /// Invalid table/column definition
    #[error("Schema error: {0}")]
    Schema(String),

    /// Statement state is not valid for rendering or execution
    #[error("Validation error: {0}")]
    Validation(String),

    /// A before-execution interceptor aborted the statement
    #[error("Statement aborted by interceptor: {0}")]
    Aborted(String),

    /// The driver failed while preparing, binding or executing
    #[error("Database error: {source}{}", DisplayContexts(.contexts))]
    Database {
        #[source]
        source: DriverError,
        contexts: Vec<StatementContext>,
    },

    /// Statement timeout
    #[error("Statement timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// Result value decode error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// A requested result value does not exist
    #[error("Not found: {0}")]
    NotFound(String),
}

struct DisplayContexts<'a>(&'a [StatementContext]);

impl fmt::Display for DisplayContexts<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            [] => Ok(()),
            [only] => write!(f, "\nSQL: {}", only.expanded_sql()),
            [first, rest @ ..] => write!(
                f,
                "\nSQL: {} (and {} more round(s))",
                first.expanded_sql(),
                rest.len()
            ),
        }
    }
}

impl StmtError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a schema error
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema(message.into())
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create an unsupported-feature error for a dialect
    pub fn unsupported(dialect: &'static str, feature: impl Into<String>) -> Self {
        Self::UnsupportedByDialect {
            dialect,
            feature: feature.into(),
        }
    }

    /// Create a batch inconsistency error naming the offending columns
    pub fn batch_inconsistent(
        table: impl Into<String>,
        columns: Vec<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::BatchDataInconsistent {
            table: table.into(),
            columns,
            message: message.into(),
        }
    }

    /// Check if this error belongs to the batch catch/flush/restart recovery path
    pub fn is_batch_recoverable(&self) -> bool {
        matches!(
            self,
            Self::BatchDataInconsistent { .. } | Self::BatchRowLimitExceeded { .. }
        )
    }

    /// Check if this is a database (driver) error
    pub fn is_database(&self) -> bool {
        matches!(self, Self::Database { .. })
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Statement contexts attached to a database error
    pub fn contexts(&self) -> &[StatementContext] {
        match self {
            Self::Database { contexts, .. } => contexts,
            _ => &[],
        }
    }
}
