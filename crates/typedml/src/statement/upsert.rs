use super::insert::{
    first_value, key_columns, process_results, resolve_client_defaults, shape_row,
    unassigned_auto_increment, values_and_defaults,
};
use super::{
    MutationStatement, RawOutcome, Rendered, Returnable, SqlStatement, ensure_column, render_single,
};
use crate::column_values::{BoundValue, ColumnValues};
use crate::context::StatementKind;
use crate::dialect::{Dialect, InsertParts, UpsertParts};
use crate::driver::ResultRow;
use crate::error::{StmtError, StmtResult};
use crate::expr::Expr;
use crate::query_builder::QueryBuilder;
use crate::schema::{ColumnRef, Table};
use crate::value::Value;
use std::sync::Arc;

/// Value written to a column when the upsert takes the update branch.
#[derive(Debug, Clone)]
pub enum ConflictValue {
    /// The value the insert branch would have written (`EXCLUDED.c`, `VALUES(c)`, ...).
    Inserted,
    Bound(BoundValue),
}

impl From<Value> for ConflictValue {
    fn from(v: Value) -> Self {
        ConflictValue::Bound(BoundValue::Value(v))
    }
}

impl From<Expr> for ConflictValue {
    fn from(e: Expr) -> Self {
        ConflictValue::Bound(BoundValue::Expr(e))
    }
}

/// Conflict handling shared by single-row and batch upserts.
#[derive(Debug, Clone, Default)]
pub(crate) struct UpsertOptions {
    keys: Vec<ColumnRef>,
    on_update: Vec<(ColumnRef, ConflictValue)>,
    exclude: Vec<ColumnRef>,
    filter: Option<Expr>,
}

impl UpsertOptions {
    pub(crate) fn set_keys(&mut self, table: &Table, keys: &[ColumnRef]) -> StmtResult<()> {
        for k in keys {
            ensure_column(table, k)?;
        }
        self.keys = keys.to_vec();
        Ok(())
    }

    pub(crate) fn add_update(
        &mut self,
        table: &Table,
        column: &ColumnRef,
        value: ConflictValue,
    ) -> StmtResult<()> {
        ensure_column(table, column)?;
        if self.on_update.iter().any(|(c, _)| c == column) {
            return Err(StmtError::DuplicateAssignment {
                column: column.qualified_name(),
            });
        }
        let value = match value {
            ConflictValue::Bound(BoundValue::Value(v)) => {
                if v.is_null() && !column.is_nullable() {
                    return Err(StmtError::NotNullViolation {
                        column: column.qualified_name(),
                    });
                }
                let v = column.column_type().validate(column.name(), v)?;
                ConflictValue::Bound(BoundValue::Value(v))
            }
            other => other,
        };
        self.on_update.push((Arc::clone(column), value));
        Ok(())
    }

    pub(crate) fn exclude(&mut self, columns: &[ColumnRef]) {
        self.exclude.extend(columns.iter().cloned());
    }

    pub(crate) fn filter(&mut self, predicate: Expr) {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
    }

    /// Explicit keys, else the primary key, else the first unique index.
    fn resolve_keys(&self, table: &Table) -> StmtResult<Vec<ColumnRef>> {
        if !self.keys.is_empty() {
            return Ok(self.keys.clone());
        }
        if !table.primary_key().is_empty() {
            return Ok(table.primary_key().to_vec());
        }
        table.unique_indices().first().cloned().ok_or_else(|| {
            StmtError::validation(format!(
                "upsert on '{}' needs conflict keys: declare a primary key or unique index, or pass keys",
                table.name()
            ))
        })
    }

    fn resolve_update(
        &self,
        columns: &[ColumnRef],
        keys: &[ColumnRef],
    ) -> Vec<(ColumnRef, ConflictValue)> {
        if !self.on_update.is_empty() {
            return self.on_update.clone();
        }
        columns
            .iter()
            .filter(|c| !keys.contains(c) && !self.exclude.contains(c))
            .map(|c| (Arc::clone(c), ConflictValue::Inserted))
            .collect()
    }

    pub(crate) fn write(
        &self,
        qb: &mut QueryBuilder,
        dialect: &dyn Dialect,
        insert: &InsertParts<'_>,
    ) -> StmtResult<()> {
        if self.filter.is_some() && !dialect.supports_upsert_filter() {
            return Err(StmtError::unsupported(dialect.name(), "upsert WHERE filter"));
        }
        if insert.columns.is_empty() {
            return Err(StmtError::NoColumnsToInsert {
                table: insert.table.name().to_string(),
            });
        }
        let keys = self.resolve_keys(insert.table)?;
        let on_update = self.resolve_update(insert.columns, &keys);
        dialect.upsert(
            qb,
            &UpsertParts {
                insert: *insert,
                keys: &keys,
                on_update: &on_update,
                filter: self.filter.as_ref(),
            },
        )
    }
}

/// Insert-or-update keyed on a unique column set.
///
/// By default the update branch rewrites every inserted non-key column with
/// the inserted value. On some vendors the generated key reported for a row
/// that took the update branch is a fresh value, not the existing row's key.
#[derive(Debug)]
pub struct UpsertStatement {
    table: Arc<Table>,
    values: ColumnValues,
    options: UpsertOptions,
    result_rows: Option<Vec<ResultRow>>,
}

impl UpsertStatement {
    pub fn new(table: &Arc<Table>) -> Self {
        Self {
            table: Arc::clone(table),
            values: ColumnValues::new(),
            options: UpsertOptions::default(),
            result_rows: None,
        }
    }

    /// Conflict target columns.
    pub fn keys(mut self, keys: &[ColumnRef]) -> StmtResult<Self> {
        self.options.set_keys(&self.table, keys)?;
        Ok(self)
    }

    /// Leave `columns` untouched on the update branch.
    pub fn on_update_exclude(mut self, columns: &[ColumnRef]) -> Self {
        self.options.exclude(columns);
        self
    }

    /// Extra predicate on the update branch.
    pub fn where_(mut self, predicate: Expr) -> Self {
        self.options.filter(predicate);
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

    /// Set an explicit update-branch value. Once any is given, only the
    /// explicit list is updated.
    pub fn on_update(
        &mut self,
        column: &ColumnRef,
        value: impl Into<ConflictValue>,
    ) -> StmtResult<&mut Self> {
        self.options.add_update(&self.table, column, value.into())?;
        Ok(self)
    }

    pub fn values(&self) -> &ColumnValues {
        &self.values
    }

    pub fn result_rows(&self) -> Option<&[ResultRow]> {
        self.result_rows.as_deref()
    }

    pub fn get(&self, column: &ColumnRef) -> StmtResult<Value> {
        self.get_or_null(column).ok_or_else(|| {
            StmtError::NotFound(format!(
                "no value for '{}' in the upsert result",
                column.qualified_name()
            ))
        })
    }

    pub fn get_or_null(&self, column: &ColumnRef) -> Option<Value> {
        first_value(self.result_rows.as_deref(), column)
    }
}

impl SqlStatement for UpsertStatement {
    fn kind(&self) -> StatementKind {
        StatementKind::Upsert
    }

    fn targets(&self) -> Vec<String> {
        vec![self.table.name().to_string()]
    }

    fn render(&self, dialect: &dyn Dialect, prepared: bool) -> StmtResult<Rendered> {
        render_single(prepared, |qb| self.write(qb, dialect))
    }

    fn key_columns(&self, dialect: &dyn Dialect) -> Vec<ColumnRef> {
        key_columns(&self.table, |c| self.values.contains(c), dialect)
    }

    fn resolve_defaults(&mut self) -> StmtResult<()> {
        resolve_client_defaults(&self.table, &mut self.values)
    }
}

impl Returnable for UpsertStatement {
    fn write(&self, qb: &mut QueryBuilder, dialect: &dyn Dialect) -> StmtResult<()> {
        let row = values_and_defaults(&self.table, self.values.snapshot())?;
        let (columns, values) = shape_row(row, dialect);
        self.options.write(
            qb,
            dialect,
            &InsertParts {
                table: &self.table,
                columns: &columns,
                rows: std::slice::from_ref(&values),
            },
        )
    }
}

impl MutationStatement for UpsertStatement {
    type Output = u64;

    fn interpret(&mut self, outcome: RawOutcome, dialect: &dyn Dialect) -> StmtResult<u64> {
        let affected = outcome.affected();
        let input = values_and_defaults(&self.table, self.values.snapshot())?;
        let auto_inc = unassigned_auto_increment(&self.table, &input);
        self.result_rows = Some(process_results(
            &auto_inc,
            &[input],
            outcome.generated_keys,
            dialect,
        )?);
        Ok(affected)
    }
}
