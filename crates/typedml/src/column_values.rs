//! Column-to-value assignments for the row being built.

use crate::error::{StmtError, StmtResult};
use crate::expr::Expr;
use crate::schema::{ColumnKey, ColumnRef};
use crate::value::Value;
use std::collections::{BTreeMap, BTreeSet};

/// What a column is bound to.
#[derive(Debug, Clone)]
pub enum BoundValue {
    /// A literal, bound as a parameter.
    Value(Value),
    /// An expression rendered inline with its own arguments.
    Expr(Expr),
    /// Use the column's database default; renders as `DEFAULT`, binds nothing.
    Default,
}

impl BoundValue {
    pub fn is_literal(&self) -> bool {
        matches!(self, BoundValue::Value(_))
    }

    pub fn is_default(&self) -> bool {
        matches!(self, BoundValue::Default)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            BoundValue::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl From<Value> for BoundValue {
    fn from(v: Value) -> Self {
        BoundValue::Value(v)
    }
}

impl From<Expr> for BoundValue {
    fn from(e: Expr) -> Self {
        BoundValue::Expr(e)
    }
}

/// Ordered column assignments for one logical row.
///
/// Entries are kept sorted by the column sort key (table, declaration index),
/// so two structurally identical rows always snapshot in the same order.
#[derive(Debug, Clone, Default)]
pub struct ColumnValues {
    values: BTreeMap<ColumnKey, (ColumnRef, BoundValue)>,
    /// Columns an earlier batch row bound to a literal.
    literal_only: BTreeSet<ColumnKey>,
}

impl ColumnValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_literal_only(literal_only: BTreeSet<ColumnKey>) -> Self {
        Self {
            values: BTreeMap::new(),
            literal_only,
        }
    }

    pub(crate) fn from_snapshot(
        row: Vec<(ColumnRef, BoundValue)>,
        literal_only: BTreeSet<ColumnKey>,
    ) -> Self {
        Self {
            values: row.into_iter().map(|(c, v)| (c.key(), (c, v))).collect(),
            literal_only,
        }
    }

    fn check_unassigned(&self, column: &ColumnRef) -> StmtResult<()> {
        if self.values.contains_key(&column.key()) {
            return Err(StmtError::DuplicateAssignment {
                column: column.qualified_name(),
            });
        }
        Ok(())
    }

    /// Assign a literal.
    pub fn assign(&mut self, column: &ColumnRef, value: impl Into<Value>) -> StmtResult<()> {
        self.check_unassigned(column)?;
        let value = value.into();
        if value.is_null() && !column.is_nullable() {
            return Err(StmtError::NotNullViolation {
                column: column.qualified_name(),
            });
        }
        let value = column.column_type().validate(column.name(), value)?;
        self.values
            .insert(column.key(), (column.clone(), BoundValue::Value(value)));
        Ok(())
    }

    /// Assign an expression rendered inline.
    pub fn assign_expr(&mut self, column: &ColumnRef, expr: Expr) -> StmtResult<()> {
        self.check_unassigned(column)?;
        if self.literal_only.contains(&column.key()) {
            return Err(StmtError::BatchExpressionConflict {
                column: column.qualified_name(),
            });
        }
        self.values
            .insert(column.key(), (column.clone(), BoundValue::Expr(expr)));
        Ok(())
    }

    /// Bind the column to its database default.
    pub fn assign_default(&mut self, column: &ColumnRef) -> StmtResult<()> {
        self.check_unassigned(column)?;
        self.values
            .insert(column.key(), (column.clone(), BoundValue::Default));
        Ok(())
    }

    pub fn contains(&self, column: &ColumnRef) -> bool {
        self.values.contains_key(&column.key())
    }

    pub fn get(&self, column: &ColumnRef) -> Option<&BoundValue> {
        self.values.get(&column.key()).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &ColumnRef> {
        self.values.values().map(|(c, _)| c)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ColumnRef, &BoundValue)> {
        self.values.values().map(|(c, v)| (c, v))
    }

    /// Current assignments ordered by column sort key.
    pub fn snapshot(&self) -> Vec<(ColumnRef, BoundValue)> {
        self.values.values().cloned().collect()
    }

    /// Drop all assignments. Literal-only markers survive.
    pub fn clear(&mut self) {
        self.values.clear();
    }
}
