use super::{
    MutationStatement, RawOutcome, Rendered, Returnable, SqlStatement, ensure_column, render_single,
};
use crate::column_values::{BoundValue, ColumnValues};
use crate::context::StatementKind;
use crate::dialect::{Dialect, InsertParts};
use crate::driver::ResultRow;
use crate::error::{StmtError, StmtResult};
use crate::expr::Expr;
use crate::query_builder::QueryBuilder;
use crate::schema::{ColumnRef, Table};
use crate::value::Value;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InsertMode {
    Insert,
    Ignore,
    Replace,
}

/// `INSERT INTO t (...) VALUES (...)`.
///
/// Unassigned columns with a client default get the generated value; columns
/// with a database default are written as `DEFAULT`. After execution the
/// first result row combines the bound literals with the generated keys.
///
/// ```ignore
/// let mut insert = InsertStatement::new(&users);
/// insert.set(&name, "alice")?;
/// tx.exec(&mut insert)?;
/// let id = insert.get(&id)?;
/// ```
#[derive(Debug)]
pub struct InsertStatement {
    table: Arc<Table>,
    mode: InsertMode,
    values: ColumnValues,
    inserted_count: u64,
    result_rows: Option<Vec<ResultRow>>,
}

impl InsertStatement {
    pub fn new(table: &Arc<Table>) -> Self {
        Self::with_mode(table, InsertMode::Insert)
    }

    /// Insert that skips rows conflicting with existing data.
    pub fn ignore(table: &Arc<Table>) -> Self {
        Self::with_mode(table, InsertMode::Ignore)
    }

    fn with_mode(table: &Arc<Table>, mode: InsertMode) -> Self {
        Self {
            table: Arc::clone(table),
            mode,
            values: ColumnValues::new(),
            inserted_count: 0,
            result_rows: None,
        }
    }

    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    pub fn is_ignore(&self) -> bool {
        self.mode == InsertMode::Ignore
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

    /// Write `DEFAULT` for `column` explicitly.
    pub fn set_default(&mut self, column: &ColumnRef) -> StmtResult<&mut Self> {
        ensure_column(&self.table, column)?;
        self.values.assign_default(column)?;
        Ok(self)
    }

    /// Explicit assignments only.
    pub fn values(&self) -> &ColumnValues {
        &self.values
    }

    /// Explicit assignments plus default expansion, in column order.
    pub fn values_and_defaults(&self) -> StmtResult<Vec<(ColumnRef, BoundValue)>> {
        values_and_defaults(&self.table, self.values.snapshot())
    }

    /// Rows affected by the last execution.
    pub fn inserted_count(&self) -> u64 {
        self.inserted_count
    }

    pub fn result_rows(&self) -> Option<&[ResultRow]> {
        self.result_rows.as_deref()
    }

    /// Value of `column` in the first result row.
    pub fn get(&self, column: &ColumnRef) -> StmtResult<Value> {
        self.get_or_null(column).ok_or_else(|| {
            StmtError::NotFound(format!(
                "no value for '{}' in the insert result",
                column.qualified_name()
            ))
        })
    }

    pub fn get_or_null(&self, column: &ColumnRef) -> Option<Value> {
        first_value(self.result_rows.as_deref(), column)
    }
}

impl SqlStatement for InsertStatement {
    fn kind(&self) -> StatementKind {
        StatementKind::Insert
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

impl Returnable for InsertStatement {
    fn write(&self, qb: &mut QueryBuilder, dialect: &dyn Dialect) -> StmtResult<()> {
        let row = self.values_and_defaults()?;
        let (columns, values) = shape_row(row, dialect);
        let parts = InsertParts {
            table: &self.table,
            columns: &columns,
            rows: std::slice::from_ref(&values),
        };
        match self.mode {
            InsertMode::Insert => dialect.insert(qb, false, &parts),
            InsertMode::Ignore => dialect.insert(qb, true, &parts),
            InsertMode::Replace => {
                if columns.is_empty() {
                    return Err(StmtError::NoColumnsToInsert {
                        table: self.table.name().to_string(),
                    });
                }
                dialect.replace(qb, &parts)
            }
        }
    }
}

impl MutationStatement for InsertStatement {
    type Output = u64;

    fn interpret(&mut self, outcome: RawOutcome, dialect: &dyn Dialect) -> StmtResult<u64> {
        let affected = outcome.affected();
        let input = self.values_and_defaults()?;
        let auto_inc = unassigned_auto_increment(&self.table, &input);
        let rows = process_results(&auto_inc, &[input], outcome.generated_keys, dialect)?;
        self.inserted_count = affected;
        self.result_rows = Some(rows);
        Ok(affected)
    }
}

/// `REPLACE INTO`, or the dialect's delete-then-insert equivalent.
#[derive(Debug)]
pub struct ReplaceStatement {
    inner: InsertStatement,
}

impl ReplaceStatement {
    pub fn new(table: &Arc<Table>) -> Self {
        Self {
            inner: InsertStatement::with_mode(table, InsertMode::Replace),
        }
    }

    pub fn set(&mut self, column: &ColumnRef, value: impl Into<Value>) -> StmtResult<&mut Self> {
        self.inner.set(column, value)?;
        Ok(self)
    }

    pub fn set_expr(&mut self, column: &ColumnRef, expr: Expr) -> StmtResult<&mut Self> {
        self.inner.set_expr(column, expr)?;
        Ok(self)
    }

    pub fn values(&self) -> &ColumnValues {
        self.inner.values()
    }

    pub fn result_rows(&self) -> Option<&[ResultRow]> {
        self.inner.result_rows()
    }

    pub fn get(&self, column: &ColumnRef) -> StmtResult<Value> {
        self.inner.get(column)
    }

    pub fn get_or_null(&self, column: &ColumnRef) -> Option<Value> {
        self.inner.get_or_null(column)
    }
}

impl SqlStatement for ReplaceStatement {
    fn kind(&self) -> StatementKind {
        StatementKind::Insert
    }

    fn targets(&self) -> Vec<String> {
        self.inner.targets()
    }

    fn render(&self, dialect: &dyn Dialect, prepared: bool) -> StmtResult<Rendered> {
        self.inner.render(dialect, prepared)
    }

    fn key_columns(&self, dialect: &dyn Dialect) -> Vec<ColumnRef> {
        self.inner.key_columns(dialect)
    }

    fn resolve_defaults(&mut self) -> StmtResult<()> {
        self.inner.resolve_defaults()
    }
}

impl MutationStatement for ReplaceStatement {
    type Output = u64;

    fn interpret(&mut self, outcome: RawOutcome, dialect: &dyn Dialect) -> StmtResult<u64> {
        self.inner.interpret(outcome, dialect)
    }
}

// ---------------------------------------------------------------------------
// Shared by every insert-shaped statement
// ---------------------------------------------------------------------------

/// Add client-default literals and `DEFAULT` markers for unassigned columns.
pub(crate) fn values_and_defaults(
    table: &Table,
    mut row: Vec<(ColumnRef, BoundValue)>,
) -> StmtResult<Vec<(ColumnRef, BoundValue)>> {
    for column in table.columns() {
        if column.is_auto_increment() || row.iter().any(|(c, _)| c == column) {
            continue;
        }
        if let Some(default) = column.client_default() {
            let value = column
                .column_type()
                .validate(column.name(), default.generate())?;
            row.push((Arc::clone(column), BoundValue::Value(value)));
        } else if column.db_default().is_some() {
            row.push((Arc::clone(column), BoundValue::Default));
        }
    }
    row.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(row)
}

/// Assign generated client defaults so later renders reuse the same values.
pub(crate) fn resolve_client_defaults(table: &Table, values: &mut ColumnValues) -> StmtResult<()> {
    for column in table.columns() {
        if values.contains(column) || column.is_auto_increment() {
            continue;
        }
        if let Some(default) = column.client_default() {
            values.assign(column, default.generate())?;
        }
    }
    Ok(())
}

/// Split a row into its column list and aligned values. `DEFAULT` entries
/// are dropped when the dialect cannot write them inside `VALUES`.
pub(crate) fn shape_row(
    row: Vec<(ColumnRef, BoundValue)>,
    dialect: &dyn Dialect,
) -> (Vec<ColumnRef>, Vec<BoundValue>) {
    row.into_iter()
        .filter(|(_, v)| dialect.supports_default_in_values() || !v.is_default())
        .unzip()
}

/// Columns to fetch back as generated keys.
pub(crate) fn key_columns(
    table: &Table,
    assigned: impl Fn(&ColumnRef) -> bool,
    dialect: &dyn Dialect,
) -> Vec<ColumnRef> {
    let identifiers_only = dialect.supports_only_identifiers_in_generated_keys();
    table
        .columns()
        .iter()
        .filter(|c| !assigned(*c))
        .filter(|c| c.is_auto_increment() || (!identifiers_only && c.db_default().is_some()))
        .cloned()
        .collect()
}

pub(crate) fn unassigned_auto_increment(
    table: &Table,
    row: &[(ColumnRef, BoundValue)],
) -> Vec<ColumnRef> {
    table
        .auto_increment_columns()
        .filter(|c| !row.iter().any(|(r, _)| r == *c))
        .cloned()
        .collect()
}

/// Pair each input row with its generated key row (by index) and merge the
/// row's literal values in.
///
/// Dialects that only report the last generated key get the earlier keys
/// synthesized by decrementing from it. This assumes the sequence steps by
/// exactly one and that no other session allocated keys in between. Without
/// a single unassigned auto-increment column the lone key row can't be
/// attributed and is dropped.
pub(crate) fn process_results(
    auto_inc: &[ColumnRef],
    inputs: &[Vec<(ColumnRef, BoundValue)>],
    keys: Option<Vec<ResultRow>>,
    dialect: &dyn Dialect,
) -> StmtResult<Vec<ResultRow>> {
    let mut key_rows = keys.unwrap_or_default();
    let last_key_only =
        inputs.len() > 1 && key_rows.len() == 1 && !dialect.supports_multiple_generated_keys();

    if last_key_only && auto_inc.len() != 1 {
        key_rows.clear();
    } else if last_key_only {
        let column = &auto_inc[0];
        let last_row = key_rows.remove(0);
        let last = last_row.get_i64(column.name())?;
        let n = inputs.len() as i64;
        tracing::debug!(
            target: "typedml.exec",
            column = %column.qualified_name(),
            last,
            rows = n,
            "back-filling generated keys from the last key"
        );
        for i in 0..n {
            let value = column
                .column_type()
                .validate(column.name(), Value::BigInt(last - (n - 1 - i)))?;
            key_rows.push(ResultRow::new().with(column.name(), value));
        }
        if let Some(synthesized) = key_rows.last_mut() {
            synthesized.merge(last_row);
        }
    }

    Ok(inputs
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut result: ResultRow = row
                .iter()
                .filter_map(|(c, v)| v.as_value().map(|v| (c.name().to_string(), v.clone())))
                .collect();
            if let Some(keys) = key_rows.get(i) {
                result.merge(keys.clone());
            }
            result
        })
        .collect())
}

pub(crate) fn first_value(rows: Option<&[ResultRow]>, column: &ColumnRef) -> Option<Value> {
    rows?.first()?.get(column.name()).cloned()
}
