use super::batch::{BatchRows, BatchStatement, complete_row};
use super::insert::{
    key_columns, process_results, shape_row, unassigned_auto_increment, values_and_defaults,
};
use super::upsert::{ConflictValue, UpsertOptions};
use super::{MutationStatement, RawOutcome, Rendered, SqlStatement};
use crate::column_values::BoundValue;
use crate::context::StatementKind;
use crate::dialect::{Dialect, InsertParts};
use crate::driver::ResultRow;
use crate::error::{StmtError, StmtResult};
use crate::expr::Expr;
use crate::query_builder::{Arg, QueryBuilder};
use crate::schema::{ColumnRef, Table};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
enum OnConflict<'a> {
    Fail,
    Ignore,
    Replace,
    Upsert(&'a UpsertOptions),
}

/// State and behavior shared by the insert-shaped batch statements.
///
/// Rows are rendered one at a time. Consecutive rows that render the same
/// SQL share a template; a row that renders differently (an omitted
/// auto-increment column, `DEFAULT` where an earlier row bound a value, an
/// expression) starts the next one.
#[derive(Debug)]
struct BatchCore {
    rows: BatchRows,
    result_rows: Vec<ResultRow>,
}

type Shaped = (Vec<ColumnRef>, Vec<BoundValue>);

impl BatchCore {
    fn new(table: &Arc<Table>, cap: Option<usize>) -> Self {
        Self {
            rows: BatchRows::new(table, cap),
            result_rows: Vec::new(),
        }
    }

    fn write_one(
        on_conflict: OnConflict<'_>,
        qb: &mut QueryBuilder,
        dialect: &dyn Dialect,
        parts: &InsertParts<'_>,
    ) -> StmtResult<()> {
        let no_columns = || StmtError::NoColumnsToInsert {
            table: parts.table.name().to_string(),
        };
        match on_conflict {
            OnConflict::Fail | OnConflict::Ignore if parts.columns.is_empty() => Err(no_columns()),
            OnConflict::Fail => dialect.insert(qb, false, parts),
            OnConflict::Ignore => dialect.insert(qb, true, parts),
            OnConflict::Replace if parts.columns.is_empty() => Err(no_columns()),
            OnConflict::Replace => dialect.replace(qb, parts),
            OnConflict::Upsert(options) => options.write(qb, dialect, parts),
        }
    }

    fn shaped_rows(&self, dialect: &dyn Dialect) -> StmtResult<Vec<Shaped>> {
        let table = self.rows.table();
        self.rows
            .execution_rows()?
            .into_iter()
            .map(|row| Ok(shape_row(complete_row(table, row)?, dialect)))
            .collect()
    }

    /// One statement per row, or one multi-row statement per run of rows
    /// with the same columns.
    fn statements(
        &self,
        on_conflict: OnConflict<'_>,
        dialect: &dyn Dialect,
        prepared: bool,
        shaped: &[Shaped],
    ) -> StmtResult<Vec<(String, Vec<Arg>)>> {
        let table = self.rows.table();
        if !dialect.batch_uses_multi_row_values() {
            return shaped
                .iter()
                .map(|(columns, values)| {
                    let mut qb = QueryBuilder::new(prepared);
                    Self::write_one(on_conflict, &mut qb, dialect, &parts(table, columns, values))?;
                    Ok(qb.finish())
                })
                .collect();
        }

        if let Some(cap) = dialect.max_batch_rows() {
            if shaped.len() > cap {
                return Err(StmtError::BatchRowLimitExceeded {
                    table: table.name().to_string(),
                    limit: cap,
                });
            }
        }
        shaped
            .chunk_by(|a, b| a.0 == b.0)
            .map(|run| {
                let rows: Vec<Vec<BoundValue>> = run.iter().map(|(_, v)| v.clone()).collect();
                let mut qb = QueryBuilder::new(prepared);
                Self::write_one(
                    on_conflict,
                    &mut qb,
                    dialect,
                    &InsertParts {
                        table,
                        columns: &run[0].0,
                        rows: &rows,
                    },
                )?;
                Ok(qb.finish())
            })
            .collect()
    }

    fn render(
        &self,
        on_conflict: OnConflict<'_>,
        dialect: &dyn Dialect,
        prepared: bool,
    ) -> StmtResult<Rendered> {
        let shaped = self.shaped_rows(dialect)?;
        let statements = self.statements(on_conflict, dialect, prepared, &shaped)?;
        if prepared {
            return Ok(Rendered::from_rounds(statements));
        }
        let rounds = vec![Vec::new(); statements.len()];
        let sql: Vec<String> = statements.into_iter().map(|(sql, _)| sql).collect();
        Ok(Rendered::new(sql.join(";\n"), rounds))
    }

    /// Input rows covered by each template, in order.
    fn template_rows(&self, on_conflict: OnConflict<'_>, dialect: &dyn Dialect) -> StmtResult<Vec<usize>> {
        let shaped = self.shaped_rows(dialect)?;
        if dialect.batch_uses_multi_row_values() {
            return Ok(shaped.chunk_by(|a, b| a.0 == b.0).map(|run| run.len()).collect());
        }
        let statements = self.statements(on_conflict, dialect, true, &shaped)?;
        Ok(Rendered::from_rounds(statements).template_sizes())
    }

    fn key_columns(&self, dialect: &dyn Dialect) -> Vec<ColumnRef> {
        key_columns(self.rows.table(), |c| self.rows.assigned_in_every_row(c), dialect)
    }

    /// Pair rows with the keys of the prepared statement that inserted them.
    fn interpret(
        &mut self,
        template_rows: Vec<usize>,
        outcome: RawOutcome,
        dialect: &dyn Dialect,
    ) -> StmtResult<Vec<ResultRow>> {
        let table = Arc::clone(self.rows.table());
        let inputs = self
            .rows
            .execution_rows()?
            .into_iter()
            .map(|row| values_and_defaults(&table, row))
            .collect::<StmtResult<Vec<_>>>()?;

        let mut keys = outcome.generated_keys.unwrap_or_default().into_iter();
        let segments: Vec<(usize, usize)> = if outcome.key_counts.len() == template_rows.len() {
            template_rows.into_iter().zip(outcome.key_counts).collect()
        } else {
            vec![(inputs.len(), keys.len())]
        };

        let mut rows = Vec::with_capacity(inputs.len());
        let mut start = 0;
        for (size, key_count) in segments {
            let end = (start + size).min(inputs.len());
            let segment = &inputs[start..end];
            let Some(first) = segment.first() else {
                break;
            };
            let auto_inc = unassigned_auto_increment(&table, first);
            let segment_keys: Vec<ResultRow> = keys.by_ref().take(key_count).collect();
            rows.extend(process_results(&auto_inc, segment, Some(segment_keys), dialect)?);
            start = end;
        }
        self.result_rows = rows.clone();
        Ok(rows)
    }
}

fn parts<'a>(table: &'a Table, columns: &'a [ColumnRef], values: &'a Vec<BoundValue>) -> InsertParts<'a> {
    InsertParts {
        table,
        columns,
        rows: std::slice::from_ref(values),
    }
}

macro_rules! batch_statement {
    ($name:ident, $kind:expr) => {
        impl BatchStatement for $name {
            fn rows(&self) -> &BatchRows {
                &self.core.rows
            }

            fn rows_mut(&mut self) -> &mut BatchRows {
                &mut self.core.rows
            }
        }

        impl $name {
            pub fn table(&self) -> &Arc<Table> {
                self.core.rows.table()
            }

            /// One row per executed input row: bound literals plus generated keys.
            pub fn result_rows(&self) -> &[ResultRow] {
                &self.core.result_rows
            }
        }

        impl SqlStatement for $name {
            fn kind(&self) -> StatementKind {
                $kind
            }

            fn targets(&self) -> Vec<String> {
                vec![self.core.rows.table().name().to_string()]
            }

            fn render(&self, dialect: &dyn Dialect, prepared: bool) -> StmtResult<Rendered> {
                self.core.render(self.on_conflict(), dialect, prepared)
            }

            fn key_columns(&self, dialect: &dyn Dialect) -> Vec<ColumnRef> {
                self.core.key_columns(dialect)
            }

            fn always_batch(&self, dialect: &dyn Dialect) -> bool {
                !dialect.batch_uses_multi_row_values()
            }

            fn resolve_defaults(&mut self) -> StmtResult<()> {
                self.core.rows.resolve_defaults()
            }
        }

        impl MutationStatement for $name {
            type Output = Vec<ResultRow>;

            fn interpret(
                &mut self,
                outcome: RawOutcome,
                dialect: &dyn Dialect,
            ) -> StmtResult<Vec<ResultRow>> {
                let template_rows = self.core.template_rows(self.on_conflict(), dialect)?;
                self.core.interpret(template_rows, outcome, dialect)
            }
        }
    };
}

/// Multi-row insert. Each row is one round of the same prepared template,
/// or one multi-row `VALUES` list on dialects that batch that way.
#[derive(Debug)]
pub struct BatchInsertStatement {
    core: BatchCore,
    ignore: bool,
}

impl BatchInsertStatement {
    pub fn new(table: &Arc<Table>) -> Self {
        Self {
            core: BatchCore::new(table, None),
            ignore: false,
        }
    }

    pub fn ignore(table: &Arc<Table>) -> Self {
        Self {
            core: BatchCore::new(table, None),
            ignore: true,
        }
    }

    /// Batch capped at the dialect's physical row limit.
    pub fn for_dialect(table: &Arc<Table>, dialect: &dyn Dialect) -> Self {
        Self {
            core: BatchCore::new(table, dialect.max_batch_rows()),
            ignore: false,
        }
    }

    fn on_conflict(&self) -> OnConflict<'_> {
        if self.ignore {
            OnConflict::Ignore
        } else {
            OnConflict::Fail
        }
    }
}

batch_statement!(BatchInsertStatement, StatementKind::Insert);

#[derive(Debug)]
pub struct BatchReplaceStatement {
    core: BatchCore,
}

impl BatchReplaceStatement {
    pub fn new(table: &Arc<Table>) -> Self {
        Self {
            core: BatchCore::new(table, None),
        }
    }

    pub fn for_dialect(table: &Arc<Table>, dialect: &dyn Dialect) -> Self {
        Self {
            core: BatchCore::new(table, dialect.max_batch_rows()),
        }
    }

    fn on_conflict(&self) -> OnConflict<'_> {
        OnConflict::Replace
    }
}

batch_statement!(BatchReplaceStatement, StatementKind::Insert);

/// Batch form of [`UpsertStatement`](super::UpsertStatement).
#[derive(Debug)]
pub struct BatchUpsertStatement {
    core: BatchCore,
    options: UpsertOptions,
}

impl BatchUpsertStatement {
    pub fn new(table: &Arc<Table>) -> Self {
        Self {
            core: BatchCore::new(table, None),
            options: UpsertOptions::default(),
        }
    }

    pub fn for_dialect(table: &Arc<Table>, dialect: &dyn Dialect) -> Self {
        Self {
            core: BatchCore::new(table, dialect.max_batch_rows()),
            options: UpsertOptions::default(),
        }
    }

    fn on_conflict(&self) -> OnConflict<'_> {
        OnConflict::Upsert(&self.options)
    }

    pub fn keys(mut self, keys: &[ColumnRef]) -> StmtResult<Self> {
        self.options.set_keys(self.core.rows.table(), keys)?;
        Ok(self)
    }

    pub fn on_update_exclude(mut self, columns: &[ColumnRef]) -> Self {
        self.options.exclude(columns);
        self
    }

    pub fn where_(mut self, predicate: Expr) -> Self {
        self.options.filter(predicate);
        self
    }

    pub fn on_update(
        &mut self,
        column: &ColumnRef,
        value: impl Into<ConflictValue>,
    ) -> StmtResult<&mut Self> {
        self.options
            .add_update(self.core.rows.table(), column, value.into())?;
        Ok(self)
    }
}

batch_statement!(BatchUpsertStatement, StatementKind::Upsert);
