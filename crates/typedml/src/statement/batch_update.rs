use super::{MutationStatement, RawOutcome, Rendered, SqlStatement, ensure_column};
use crate::column_values::ColumnValues;
use crate::context::StatementKind;
use crate::dialect::{Dialect, UpdateParts};
use crate::error::{StmtError, StmtResult};
use crate::expr::Expr;
use crate::query_builder::QueryBuilder;
use crate::schema::{ColumnRef, Table};
use crate::value::Value;
use std::sync::Arc;

/// One `UPDATE t SET ... WHERE t.id = ?` round per row, keyed by the
/// table's single-column primary key.
///
/// ```ignore
/// let mut batch = BatchUpdateStatement::new(&users)?;
/// batch.add_batch(1_i64)?.set(&name, "a")?;
/// batch.add_batch(2_i64)?.set(&name, "b")?;
/// let updated = tx.exec(&mut batch)?;
/// ```
#[derive(Debug)]
pub struct BatchUpdateStatement {
    table: Arc<Table>,
    id: ColumnRef,
    rows: Vec<(Value, ColumnValues)>,
}

impl BatchUpdateStatement {
    pub fn new(table: &Arc<Table>) -> StmtResult<Self> {
        let id = match table.primary_key() {
            [id] => Arc::clone(id),
            _ => {
                return Err(StmtError::validation(format!(
                    "batch update on '{}' needs a single-column primary key",
                    table.name()
                )));
            }
        };
        Ok(Self {
            table: Arc::clone(table),
            id,
            rows: Vec::new(),
        })
    }

    /// Start the row for the entity with primary key `id`.
    pub fn add_batch(&mut self, id: impl Into<Value>) -> StmtResult<&mut Self> {
        let id = id.into();
        if id.is_null() {
            return Err(StmtError::NotNullViolation {
                column: self.id.qualified_name(),
            });
        }
        let id = self.id.column_type().validate(self.id.name(), id)?;
        self.rows.push((id, ColumnValues::new()));
        Ok(self)
    }

    fn current(&mut self, column: &ColumnRef) -> StmtResult<&mut ColumnValues> {
        ensure_column(&self.table, column)?;
        if *column == self.id {
            return Err(StmtError::validation(format!(
                "'{}' identifies the row and cannot be updated in a batch update",
                column.qualified_name()
            )));
        }
        match self.rows.last_mut() {
            Some((_, values)) => Ok(values),
            None => Err(StmtError::validation(
                "call add_batch with the row id before setting values",
            )),
        }
    }

    pub fn set(&mut self, column: &ColumnRef, value: impl Into<Value>) -> StmtResult<&mut Self> {
        self.current(column)?.assign(column, value)?;
        Ok(self)
    }

    pub fn set_expr(&mut self, column: &ColumnRef, expr: Expr) -> StmtResult<&mut Self> {
        self.current(column)?.assign_expr(column, expr)?;
        Ok(self)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn write_row(
        &self,
        qb: &mut QueryBuilder,
        dialect: &dyn Dialect,
        id: &Value,
        values: &ColumnValues,
    ) -> StmtResult<()> {
        if values.is_empty() {
            return Err(StmtError::EmptyUpdate {
                table: self.table.name().to_string(),
            });
        }
        let set = values.snapshot();
        let predicate = Expr::eq(&self.id, id.clone());
        dialect.update(
            qb,
            &UpdateParts {
                table: &self.table,
                set: &set,
                predicate: Some(&predicate),
                limit: None,
            },
        )
    }
}

impl SqlStatement for BatchUpdateStatement {
    fn kind(&self) -> StatementKind {
        StatementKind::Update
    }

    fn targets(&self) -> Vec<String> {
        vec![self.table.name().to_string()]
    }

    fn render(&self, dialect: &dyn Dialect, prepared: bool) -> StmtResult<Rendered> {
        if self.rows.is_empty() {
            return Err(StmtError::batch_inconsistent(
                self.table.name(),
                Vec::new(),
                "no data to execute",
            ));
        }

        let statements = self
            .rows
            .iter()
            .map(|(id, values)| {
                let mut qb = QueryBuilder::new(prepared);
                self.write_row(&mut qb, dialect, id, values)?;
                Ok(qb.finish())
            })
            .collect::<StmtResult<Vec<_>>>()?;
        if prepared {
            // Rows updating different columns run under their own template.
            return Ok(Rendered::from_rounds(statements));
        }
        let rounds = vec![Vec::new(); statements.len()];
        let sql: Vec<String> = statements.into_iter().map(|(sql, _)| sql).collect();
        Ok(Rendered::new(sql.join(";\n"), rounds))
    }

    fn always_batch(&self, _dialect: &dyn Dialect) -> bool {
        true
    }
}

impl MutationStatement for BatchUpdateStatement {
    type Output = u64;

    fn interpret(&mut self, outcome: RawOutcome, _dialect: &dyn Dialect) -> StmtResult<u64> {
        Ok(outcome.affected())
    }
}
