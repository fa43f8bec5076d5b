//! Row accumulation for batch statements.
//!
//! A row is only checked once the caller says it is complete (the next
//! [`BatchRows::add_batch`] call, or execution), because its columns may be
//! set across several calls. Sealed rows are frozen snapshots; the working
//! row is a fresh [`ColumnValues`].

use super::ensure_column;
use super::insert::values_and_defaults;
use crate::column_values::{BoundValue, ColumnValues};
use crate::error::{StmtError, StmtResult};
use crate::expr::Expr;
use crate::schema::{ColumnKey, ColumnRef, Table};
use crate::value::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

type Row = Vec<(ColumnRef, BoundValue)>;

/// Sealed rows plus the row currently being built.
#[derive(Debug)]
pub struct BatchRows {
    table: Arc<Table>,
    sealed: Vec<Row>,
    /// Union of the columns of all sealed rows.
    seen: BTreeMap<ColumnKey, ColumnRef>,
    open: ColumnValues,
    cap: Option<usize>,
}

impl BatchRows {
    pub fn new(table: &Arc<Table>, cap: Option<usize>) -> Self {
        Self {
            table: Arc::clone(table),
            sealed: Vec::new(),
            seen: BTreeMap::new(),
            open: ColumnValues::new(),
            cap,
        }
    }

    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    pub fn cap(&self) -> Option<usize> {
        self.cap
    }

    pub fn sealed_rows(&self) -> &[Vec<(ColumnRef, BoundValue)>] {
        &self.sealed
    }

    pub fn open_row(&self) -> &ColumnValues {
        &self.open
    }

    /// Sealed rows plus the working row when it holds data.
    pub fn row_count(&self) -> usize {
        self.sealed.len() + usize::from(!self.open.is_empty())
    }

    fn check_previous(&self, column: &ColumnRef) -> StmtResult<()> {
        ensure_column(&self.table, column)?;
        let Some(previous) = self.sealed.last() else {
            return Ok(());
        };
        if !column.is_defaultable() && !previous.iter().any(|(c, _)| c == column) {
            return Err(StmtError::batch_inconsistent(
                self.table.name(),
                vec![column.name().to_string()],
                format!(
                    "can't set '{}' because the previous row can't be defaulted for that column",
                    column.qualified_name()
                ),
            ));
        }
        Ok(())
    }

    pub fn set(&mut self, column: &ColumnRef, value: impl Into<Value>) -> StmtResult<()> {
        self.check_previous(column)?;
        self.open.assign(column, value)
    }

    pub fn set_expr(&mut self, column: &ColumnRef, expr: Expr) -> StmtResult<()> {
        self.check_previous(column)?;
        self.open.assign_expr(column, expr)
    }

    pub fn set_default(&mut self, column: &ColumnRef) -> StmtResult<()> {
        self.check_previous(column)?;
        self.open.assign_default(column)
    }

    fn validate(&self, row: &ColumnValues) -> StmtResult<()> {
        let missing: Vec<String> = self
            .seen
            .values()
            .filter(|c| !row.contains(c) && !c.is_defaultable())
            .map(|c| c.name().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(StmtError::batch_inconsistent(
                self.table.name(),
                missing,
                "row lacks columns set in earlier rows that can't be defaulted",
            ));
        }

        let required: Vec<String> = self
            .table
            .required_columns()
            .filter(|c| !row.contains(c))
            .map(|c| c.name().to_string())
            .collect();
        if !required.is_empty() {
            return Err(StmtError::batch_inconsistent(
                self.table.name(),
                required,
                "row lacks columns required by the table",
            ));
        }
        Ok(())
    }

    /// Seal the working row and open the next one.
    ///
    /// A batch that has never received data stays untouched. When the row
    /// cap would be reached, fails with `BatchRowLimitExceeded` and keeps the
    /// working row, so every row so far can still be executed.
    pub fn add_batch(&mut self) -> StmtResult<()> {
        if self.open.is_empty() && self.sealed.is_empty() {
            return Ok(());
        }
        self.validate(&self.open)?;
        if let Some(cap) = self.cap {
            if self.sealed.len() + 1 >= cap {
                return Err(StmtError::BatchRowLimitExceeded {
                    table: self.table.name().to_string(),
                    limit: cap,
                });
            }
        }

        let row = self.open.snapshot();
        for (column, _) in &row {
            self.seen
                .entry(column.key())
                .or_insert_with(|| Arc::clone(column));
        }
        self.open = ColumnValues::with_literal_only(literal_keys(&row));
        self.sealed.push(row);
        Ok(())
    }

    /// Check the working row without sealing it.
    pub fn validate_last_batch(&self) -> StmtResult<()> {
        if self.open.is_empty() {
            return Ok(());
        }
        self.validate(&self.open)
    }

    /// Drop the working row and reopen the last sealed row in its place.
    pub fn remove_last_batch(&mut self) {
        self.open = match self.sealed.pop() {
            Some(last) => {
                let literal_only = self.sealed.last().map(|r| literal_keys(r)).unwrap_or_default();
                ColumnValues::from_snapshot(last, literal_only)
            }
            None => ColumnValues::new(),
        };
        self.seen = self
            .sealed
            .iter()
            .flatten()
            .map(|(c, _)| (c.key(), Arc::clone(c)))
            .collect();
    }

    /// Rows to execute: every sealed row, plus the working row if non-empty.
    pub fn execution_rows(&self) -> StmtResult<Vec<Row>> {
        let mut rows = self.sealed.clone();
        if !self.open.is_empty() {
            self.validate(&self.open)?;
            rows.push(self.open.snapshot());
        }
        if rows.is_empty() {
            return Err(StmtError::batch_inconsistent(
                self.table.name(),
                Vec::new(),
                "no data to execute",
            ));
        }
        Ok(rows)
    }

    /// Whether every row, the working row included when it holds data,
    /// assigns `column`.
    pub(crate) fn assigned_in_every_row(&self, column: &ColumnRef) -> bool {
        self.sealed.iter().all(|row| row.iter().any(|(c, _)| c == column))
            && (self.open.is_empty() || self.open.contains(column))
    }

    /// Evaluate client default generators into every row.
    pub(crate) fn resolve_defaults(&mut self) -> StmtResult<()> {
        for row in &mut self.sealed {
            for column in self.table.columns() {
                let Some(default) = column.client_default() else {
                    continue;
                };
                if column.is_auto_increment() || row.iter().any(|(c, _)| c == column) {
                    continue;
                }
                let value = column
                    .column_type()
                    .validate(column.name(), default.generate())?;
                row.push((Arc::clone(column), BoundValue::Value(value)));
            }
            row.sort_by(|a, b| a.0.cmp(&b.0));
        }
        if !self.open.is_empty() {
            super::insert::resolve_client_defaults(&self.table, &mut self.open)?;
        }
        Ok(())
    }
}

fn literal_keys(row: &[(ColumnRef, BoundValue)]) -> BTreeSet<ColumnKey> {
    row.iter()
        .filter(|(_, v)| v.is_literal())
        .map(|(c, _)| c.key())
        .collect()
}

/// Default expansion for a batch row; nullable columns the row leaves out
/// are bound to NULL so every row has the same shape.
pub(crate) fn complete_row(table: &Table, row: Row) -> StmtResult<Row> {
    let mut row = values_and_defaults(table, row)?;
    let missing: Vec<ColumnRef> = table
        .columns()
        .iter()
        .filter(|c| c.is_nullable() && !c.is_database_generated())
        .filter(|c| !row.iter().any(|(r, _)| r == *c))
        .cloned()
        .collect();
    if !missing.is_empty() {
        row.extend(missing.into_iter().map(|c| (c, BoundValue::Value(Value::Null))));
        row.sort_by(|a, b| a.0.cmp(&b.0));
    }
    Ok(row)
}

/// Row-level operations shared by the batch statements.
///
/// ```ignore
/// let mut batch = BatchInsertStatement::new(&users);
/// for user in users_to_add {
///     batch.set(&name, user.name)?;
///     batch.add_batch()?;
/// }
/// tx.exec(&mut batch)?;
/// ```
pub trait BatchStatement {
    fn rows(&self) -> &BatchRows;

    fn rows_mut(&mut self) -> &mut BatchRows;

    fn set(&mut self, column: &ColumnRef, value: impl Into<Value>) -> StmtResult<&mut Self>
    where
        Self: Sized,
    {
        self.rows_mut().set(column, value)?;
        Ok(self)
    }

    fn set_expr(&mut self, column: &ColumnRef, expr: Expr) -> StmtResult<&mut Self>
    where
        Self: Sized,
    {
        self.rows_mut().set_expr(column, expr)?;
        Ok(self)
    }

    fn set_default(&mut self, column: &ColumnRef) -> StmtResult<&mut Self>
    where
        Self: Sized,
    {
        self.rows_mut().set_default(column)?;
        Ok(self)
    }

    fn add_batch(&mut self) -> StmtResult<()> {
        self.rows_mut().add_batch()
    }

    fn validate_last_batch(&self) -> StmtResult<()> {
        self.rows().validate_last_batch()
    }

    fn remove_last_batch(&mut self) {
        self.rows_mut().remove_last_batch()
    }

    fn row_count(&self) -> usize {
        self.rows().row_count()
    }
}
