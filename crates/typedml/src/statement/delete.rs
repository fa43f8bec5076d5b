use super::{MutationStatement, RawOutcome, Rendered, Returnable, SqlStatement, render_single};
use crate::context::StatementKind;
use crate::dialect::{DeleteParts, Dialect};
use crate::error::{StmtError, StmtResult};
use crate::expr::Expr;
use crate::query_builder::QueryBuilder;
use crate::schema::Table;
use std::sync::Arc;

/// `DELETE FROM t [WHERE ...]`. Without a predicate every row is deleted.
#[derive(Debug)]
pub struct DeleteStatement {
    table: Arc<Table>,
    predicate: Option<Expr>,
    limit: Option<u64>,
    offset: Option<u64>,
    ignore: bool,
}

impl DeleteStatement {
    pub fn new(table: &Arc<Table>) -> Self {
        Self {
            table: Arc::clone(table),
            predicate: None,
            limit: None,
            offset: None,
            ignore: false,
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

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Ignore errors raised while deleting individual rows.
    pub fn ignore(mut self) -> Self {
        self.ignore = true;
        self
    }
}

impl SqlStatement for DeleteStatement {
    fn kind(&self) -> StatementKind {
        StatementKind::Delete
    }

    fn targets(&self) -> Vec<String> {
        vec![self.table.name().to_string()]
    }

    fn render(&self, dialect: &dyn Dialect, prepared: bool) -> StmtResult<Rendered> {
        render_single(prepared, |qb| self.write(qb, dialect))
    }
}

impl Returnable for DeleteStatement {
    fn write(&self, qb: &mut QueryBuilder, dialect: &dyn Dialect) -> StmtResult<()> {
        if self.limit.is_some() && !dialect.supports_limit_with_update_or_delete() {
            return Err(StmtError::unsupported(dialect.name(), "LIMIT in DELETE"));
        }
        if self.offset.is_some() && !dialect.supports_offset_in_delete() {
            return Err(StmtError::unsupported(dialect.name(), "OFFSET in DELETE"));
        }
        if self.ignore && !dialect.supports_delete_ignore() {
            return Err(StmtError::unsupported(dialect.name(), "DELETE IGNORE"));
        }
        dialect.delete(
            qb,
            &DeleteParts {
                table: &self.table,
                predicate: self.predicate.as_ref(),
                limit: self.limit,
                offset: self.offset,
                ignore: self.ignore,
            },
        )
    }
}

impl MutationStatement for DeleteStatement {
    type Output = u64;

    fn interpret(&mut self, outcome: RawOutcome, _dialect: &dyn Dialect) -> StmtResult<u64> {
        Ok(outcome.affected())
    }
}
