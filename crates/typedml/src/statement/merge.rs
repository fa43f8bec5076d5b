use super::{MutationStatement, RawOutcome, Rendered, SqlStatement, ensure_column, render_single};
use crate::column_values::{BoundValue, ColumnValues};
use crate::context::StatementKind;
use crate::dialect::{Dialect, MergeParts};
use crate::error::{StmtError, StmtResult};
use crate::expr::Expr;
use crate::schema::{ColumnRef, Table};
use std::sync::Arc;

/// Rows merged into the target.
#[derive(Debug, Clone)]
pub enum MergeSource {
    Table(Arc<Table>),
    /// A subquery, referenced by `alias` in the ON condition and clauses.
    Query { query: Expr, alias: String },
}

/// One `WHEN [NOT] MATCHED [AND ...] THEN ...` branch.
#[derive(Debug, Clone)]
pub enum MergeClause {
    Insert {
        values: Vec<(ColumnRef, BoundValue)>,
        predicate: Option<Expr>,
    },
    Update {
        values: Vec<(ColumnRef, BoundValue)>,
        predicate: Option<Expr>,
    },
    Delete {
        predicate: Option<Expr>,
    },
}

/// `MERGE INTO target USING source ON ... WHEN ...`.
///
/// Branch values are built in a [`ColumnValues`], so duplicate and null
/// checks apply. Literals become parameters; `Expr::col` values referencing
/// the source render inline.
///
/// ```ignore
/// let mut merge = MergeStatement::using_table(&target, &staging, Expr::eq_col(&t_id, &s_id));
/// merge.when_matched_update(None, |v| v.assign_expr(&t_name, Expr::col(&s_name)))?;
/// merge.when_not_matched_insert(None, |v| {
///     v.assign_expr(&t_id, Expr::col(&s_id))?;
///     v.assign_expr(&t_name, Expr::col(&s_name))
/// })?;
/// ```
#[derive(Debug)]
pub struct MergeStatement {
    table: Arc<Table>,
    source: MergeSource,
    on: Expr,
    clauses: Vec<MergeClause>,
}

impl MergeStatement {
    pub fn using_table(target: &Arc<Table>, source: &Arc<Table>, on: Expr) -> Self {
        Self {
            table: Arc::clone(target),
            source: MergeSource::Table(Arc::clone(source)),
            on,
            clauses: Vec::new(),
        }
    }

    pub fn using_query(
        target: &Arc<Table>,
        query: Expr,
        alias: impl Into<String>,
        on: Expr,
    ) -> Self {
        Self {
            table: Arc::clone(target),
            source: MergeSource::Query {
                query,
                alias: alias.into(),
            },
            on,
            clauses: Vec::new(),
        }
    }

    fn collect(
        &self,
        build: impl FnOnce(&mut ColumnValues) -> StmtResult<()>,
    ) -> StmtResult<Vec<(ColumnRef, BoundValue)>> {
        let mut values = ColumnValues::new();
        build(&mut values)?;
        for column in values.columns() {
            ensure_column(&self.table, column)?;
        }
        Ok(values.snapshot())
    }

    pub fn when_not_matched_insert(
        &mut self,
        predicate: Option<Expr>,
        build: impl FnOnce(&mut ColumnValues) -> StmtResult<()>,
    ) -> StmtResult<&mut Self> {
        let values = self.collect(build)?;
        if values.is_empty() {
            return Err(StmtError::NoColumnsToInsert {
                table: self.table.name().to_string(),
            });
        }
        self.clauses.push(MergeClause::Insert { values, predicate });
        Ok(self)
    }

    pub fn when_matched_update(
        &mut self,
        predicate: Option<Expr>,
        build: impl FnOnce(&mut ColumnValues) -> StmtResult<()>,
    ) -> StmtResult<&mut Self> {
        let values = self.collect(build)?;
        if values.is_empty() {
            return Err(StmtError::EmptyUpdate {
                table: self.table.name().to_string(),
            });
        }
        self.clauses.push(MergeClause::Update { values, predicate });
        Ok(self)
    }

    pub fn when_matched_delete(&mut self, predicate: Option<Expr>) -> &mut Self {
        self.clauses.push(MergeClause::Delete { predicate });
        self
    }

    pub fn clauses(&self) -> &[MergeClause] {
        &self.clauses
    }
}

impl SqlStatement for MergeStatement {
    fn kind(&self) -> StatementKind {
        StatementKind::Merge
    }

    fn targets(&self) -> Vec<String> {
        vec![self.table.name().to_string()]
    }

    fn render(&self, dialect: &dyn Dialect, prepared: bool) -> StmtResult<Rendered> {
        if !dialect.supports_merge() {
            return Err(StmtError::unsupported(dialect.name(), "MERGE"));
        }
        if self.clauses.is_empty() {
            return Err(StmtError::validation(format!(
                "MERGE into '{}' has no WHEN clauses",
                self.table.name()
            )));
        }
        render_single(prepared, |qb| {
            dialect.merge(
                qb,
                &MergeParts {
                    table: &self.table,
                    source: &self.source,
                    on: &self.on,
                    clauses: &self.clauses,
                },
            )
        })
    }
}

impl MutationStatement for MergeStatement {
    type Output = u64;

    fn interpret(&mut self, outcome: RawOutcome, _dialect: &dyn Dialect) -> StmtResult<u64> {
        Ok(outcome.affected())
    }
}
