use super::{
    MutationStatement, RawOutcome, Rendered, Returnable, SqlStatement, ensure_column, render_single,
};
use crate::column_values::ColumnValues;
use crate::context::StatementKind;
use crate::dialect::{Dialect, UpdateParts};
use crate::error::{StmtError, StmtResult};
use crate::expr::Expr;
use crate::query_builder::QueryBuilder;
use crate::schema::{ColumnRef, Table};
use crate::value::Value;
use std::sync::Arc;

/// `UPDATE t SET ... [WHERE ...] [LIMIT n]`.
///
/// Rendering fails with `EmptyUpdate` while no column is set.
#[derive(Debug)]
pub struct UpdateStatement {
    table: Arc<Table>,
    values: ColumnValues,
    predicate: Option<Expr>,
    limit: Option<u64>,
}

impl UpdateStatement {
    pub fn new(table: &Arc<Table>) -> Self {
        Self {
            table: Arc::clone(table),
            values: ColumnValues::new(),
            predicate: None,
            limit: None,
        }
    }

    /// Repeated calls are AND-ed together.
    pub fn where_(mut self, predicate: Expr) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn set(&mut self, column: &ColumnRef, value: impl Into<Value>) -> StmtResult<&mut Self> {
        ensure_column(&self.table, column)?;
        self.values.assign(column, value)?;
        Ok(self)
    }

    pub fn set_expr(&mut self, column: &ColumnRef, expr: Expr) -> StmtResult<&mut Self> {
        ensure_column(&self.table, column)?;
        self.values.assign_expr(column, expr)?;
        Ok(self)
    }

    pub fn set_default(&mut self, column: &ColumnRef) -> StmtResult<&mut Self> {
        ensure_column(&self.table, column)?;
        self.values.assign_default(column)?;
        Ok(self)
    }

    pub fn values(&self) -> &ColumnValues {
        &self.values
    }

    pub fn predicate(&self) -> Option<&Expr> {
        self.predicate.as_ref()
    }
}

impl SqlStatement for UpdateStatement {
    fn kind(&self) -> StatementKind {
        StatementKind::Update
    }

    fn targets(&self) -> Vec<String> {
        vec![self.table.name().to_string()]
    }

    fn render(&self, dialect: &dyn Dialect, prepared: bool) -> StmtResult<Rendered> {
        render_single(prepared, |qb| self.write(qb, dialect))
    }
}

impl Returnable for UpdateStatement {
    fn write(&self, qb: &mut QueryBuilder, dialect: &dyn Dialect) -> StmtResult<()> {
        if self.values.is_empty() {
            return Err(StmtError::EmptyUpdate {
                table: self.table.name().to_string(),
            });
        }
        if self.limit.is_some() && !dialect.supports_limit_with_update_or_delete() {
            return Err(StmtError::unsupported(dialect.name(), "LIMIT in UPDATE"));
        }
        let set = self.values.snapshot();
        dialect.update(
            qb,
            &UpdateParts {
                table: &self.table,
                set: &set,
                predicate: self.predicate.as_ref(),
                limit: self.limit,
            },
        )
    }
}

impl MutationStatement for UpdateStatement {
    type Output = u64;

    fn interpret(&mut self, outcome: RawOutcome, _dialect: &dyn Dialect) -> StmtResult<u64> {
        Ok(outcome.affected())
    }
}
