use super::{Rendered, Returnable, SqlStatement, render_single};
use crate::context::StatementKind;
use crate::dialect::Dialect;
use crate::error::{StmtError, StmtResult};
use crate::schema::ColumnRef;

/// A DML statement extended with `RETURNING`, executed as a query.
///
/// ```ignore
/// let mut stmt = ReturningStatement::new(insert, &[id.clone(), created_at.clone()]);
/// for row in tx.query(&mut stmt)? {
///     let row = row?;
/// }
/// ```
#[derive(Debug)]
pub struct ReturningStatement<S> {
    inner: S,
    columns: Vec<ColumnRef>,
}

impl<S: Returnable> ReturningStatement<S> {
    /// Return `columns`, or every column when empty.
    pub fn new(inner: S, columns: &[ColumnRef]) -> Self {
        Self {
            inner,
            columns: columns.to_vec(),
        }
    }

    pub fn all(inner: S) -> Self {
        Self::new(inner, &[])
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    pub fn columns(&self) -> &[ColumnRef] {
        &self.columns
    }
}

impl<S: Returnable> SqlStatement for ReturningStatement<S> {
    fn kind(&self) -> StatementKind {
        self.inner.kind()
    }

    fn targets(&self) -> Vec<String> {
        self.inner.targets()
    }

    fn render(&self, dialect: &dyn Dialect, prepared: bool) -> StmtResult<Rendered> {
        if !dialect.supports_returning() {
            return Err(StmtError::unsupported(dialect.name(), "RETURNING"));
        }
        render_single(prepared, |qb| {
            self.inner.write(qb, dialect)?;
            dialect.returning(qb, &self.columns)
        })
    }

    fn resolve_defaults(&mut self) -> StmtResult<()> {
        self.inner.resolve_defaults()
    }
}
