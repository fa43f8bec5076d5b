//! Statement variants.
//!
//! Every statement implements [`SqlStatement`]: it renders itself through a
//! [`Dialect`] in one walk that produces both the SQL and the ordered
//! argument rounds. DML statements also implement [`MutationStatement`],
//! which turns the raw driver outcome into a typed result.
//!
//! | Statement | Output |
//! |---|---|
//! | [`InsertStatement`], [`ReplaceStatement`], [`UpsertStatement`] | affected rows, keys kept on the statement |
//! | [`UpdateStatement`], [`DeleteStatement`], [`MergeStatement`] | affected rows |
//! | [`BatchInsertStatement`], [`BatchReplaceStatement`], [`BatchUpsertStatement`] | one [`ResultRow`] per input row |
//! | [`BatchUpdateStatement`] | affected rows |
//! | [`ReturningStatement`] | row cursor (see `Transaction::query`) |

mod batch;
mod batch_insert;
mod batch_update;
mod delete;
mod insert;
mod merge;
mod returning;
mod update;
mod upsert;


pub use batch::{BatchRows, BatchStatement};
pub use batch_insert::{BatchInsertStatement, BatchReplaceStatement, BatchUpsertStatement};
pub use batch_update::BatchUpdateStatement;
pub use delete::DeleteStatement;
pub use insert::{InsertStatement, ReplaceStatement};
pub use merge::{MergeClause, MergeSource, MergeStatement};
pub use returning::ReturningStatement;
pub use update::UpdateStatement;
pub use upsert::{ConflictValue, UpsertStatement};

use crate::context::StatementKind;
use crate::dialect::Dialect;
use crate::driver::ResultRow;
use crate::error::{StmtError, StmtResult};
use crate::query_builder::{Arg, QueryBuilder};
use crate::schema::{ColumnRef, Table};

/// SQL template plus one argument list per execution round.
///
/// Batch rows that render differently (a column bound to `DEFAULT` in one row
/// and to a parameter in the next, say) cannot share a template. Such rounds
/// are kept in order and each run of equal SQL becomes its own template.
#[derive(Debug, Clone)]
pub struct Rendered {
    /// Template of the first round. With literals inlined, every statement
    /// joined by `;\n`.
    pub sql: String,
    /// Empty argument lists when rendered with literals inlined.
    pub rounds: Vec<Vec<Arg>>,
    /// `(first round, sql)` for each later template.
    pub switches: Vec<(usize, String)>,
}

impl Rendered {
    pub fn new(sql: String, rounds: Vec<Vec<Arg>>) -> Self {
        Self {
            sql,
            rounds,
            switches: Vec::new(),
        }
    }

    /// Collect rounds rendered one by one. A round whose SQL differs from the
    /// previous round's starts a new template.
    pub(crate) fn from_rounds(rounds: impl IntoIterator<Item = (String, Vec<Arg>)>) -> Self {
        let mut rendered = Self::new(String::new(), Vec::new());
        for (sql, args) in rounds {
            let index = rendered.rounds.len();
            if index == 0 {
                rendered.sql = sql;
            } else if sql != rendered.round_sql(index - 1) {
                rendered.switches.push((index, sql));
            }
            rendered.rounds.push(args);
        }
        rendered
    }

    /// Template used by `round`.
    pub fn round_sql(&self, round: usize) -> &str {
        self.switches
            .iter()
            .rev()
            .find(|(start, _)| *start <= round)
            .map_or(self.sql.as_str(), |(_, sql)| sql.as_str())
    }

    /// Rounds per template, in order.
    pub fn template_sizes(&self) -> Vec<usize> {
        let starts: Vec<usize> = std::iter::once(0)
            .chain(self.switches.iter().map(|(start, _)| *start))
            .chain(std::iter::once(self.rounds.len()))
            .collect();
        starts.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

/// What the driver reported for one execution.
#[derive(Debug, Clone, Default)]
pub struct RawOutcome {
    /// Affected rows, one entry per round.
    pub counts: Vec<u64>,
    /// Key rows of every prepared statement, concatenated.
    pub generated_keys: Option<Vec<ResultRow>>,
    /// How many key rows each prepared statement reported.
    pub key_counts: Vec<usize>,
}

impl RawOutcome {
    pub fn affected(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Record the key rows of one prepared statement.
    pub(crate) fn push_keys(&mut self, keys: Option<Vec<ResultRow>>) {
        self.key_counts.push(keys.as_ref().map_or(0, Vec::len));
        if let Some(keys) = keys {
            self.generated_keys.get_or_insert_with(Vec::new).extend(keys);
        }
    }
}

/// A statement that renders to SQL and arguments.
pub trait SqlStatement {
    fn kind(&self) -> StatementKind;

    /// Names of the tables the statement modifies.
    fn targets(&self) -> Vec<String>;

    /// Render SQL and argument rounds in one walk.
    fn render(&self, dialect: &dyn Dialect, prepared: bool) -> StmtResult<Rendered>;

    /// Columns whose generated values should be fetched after execution.
    fn key_columns(&self, _dialect: &dyn Dialect) -> Vec<ColumnRef> {
        Vec::new()
    }

    /// Execute through the driver's batch path even with a single round.
    fn always_batch(&self, _dialect: &dyn Dialect) -> bool {
        false
    }

    /// Evaluate client-side default generators once, so rendering and result
    /// interpretation see the same values.
    fn resolve_defaults(&mut self) -> StmtResult<()> {
        Ok(())
    }

    /// SQL of the first round.
    fn prepare_sql(&self, dialect: &dyn Dialect) -> StmtResult<String> {
        Ok(self.render(dialect, true)?.sql)
    }

    fn arguments(&self, dialect: &dyn Dialect) -> StmtResult<Vec<Vec<Arg>>> {
        Ok(self.render(dialect, true)?.rounds)
    }

    /// SQL with literals inlined. For diagnostics only.
    fn to_sql(&self, dialect: &dyn Dialect) -> StmtResult<String> {
        Ok(self.render(dialect, false)?.sql)
    }
}

/// A DML statement whose execution yields a typed outcome.
pub trait MutationStatement: SqlStatement {
    type Output;

    fn interpret(&mut self, outcome: RawOutcome, dialect: &dyn Dialect) -> StmtResult<Self::Output>;
}

/// A single-round statement that can be extended with `RETURNING`.
pub trait Returnable: SqlStatement {
    /// Write the statement into `qb`.
    fn write(&self, qb: &mut QueryBuilder, dialect: &dyn Dialect) -> StmtResult<()>;
}

pub(crate) fn render_single(
    prepared: bool,
    write: impl FnOnce(&mut QueryBuilder) -> StmtResult<()>,
) -> StmtResult<Rendered> {
    let mut qb = QueryBuilder::new(prepared);
    write(&mut qb)?;
    let (sql, args) = qb.finish();
    Ok(Rendered::new(sql, vec![args]))
}

/// Reject columns of other tables.
pub(crate) fn ensure_column(table: &Table, column: &ColumnRef) -> StmtResult<()> {
    if table.contains(column) {
        Ok(())
    } else {
        Err(StmtError::schema(format!(
            "column '{}' does not belong to table '{}'",
            column.qualified_name(),
            table.name()
        )))
    }
}
