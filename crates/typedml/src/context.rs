//! Execution contexts: one per round of a statement execution.

use crate::args::expand_args;
use crate::query_builder::Arg;
use std::fmt;

/// The type of statement being executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Insert,
    Update,
    Delete,
    Upsert,
    Merge,
    Other,
}

impl StatementKind {
    /// Whether statements of this kind modify their target tables.
    pub fn is_dml(self) -> bool {
        !matches!(self, StatementKind::Other)
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatementKind::Insert => "INSERT",
            StatementKind::Update => "UPDATE",
            StatementKind::Delete => "DELETE",
            StatementKind::Upsert => "UPSERT",
            StatementKind::Merge => "MERGE",
            StatementKind::Other => "OTHER",
        };
        f.write_str(s)
    }
}

/// A statement's SQL paired with the arguments of one round.
#[derive(Debug, Clone)]
pub struct StatementContext {
    /// SQL template with `?` placeholders.
    pub sql: String,
    /// Arguments for this round, in placeholder order.
    pub args: Vec<Arg>,
    pub kind: StatementKind,
    /// Zero-based round index.
    pub round: usize,
}

impl StatementContext {
    pub fn new(sql: impl Into<String>, args: Vec<Arg>, kind: StatementKind, round: usize) -> Self {
        Self {
            sql: sql.into(),
            args,
            kind,
            round,
        }
    }

    /// The SQL with literals substituted, for diagnostics.
    pub fn expanded_sql(&self) -> String {
        expand_args(&self.sql, &self.args)
    }

    pub fn param_count(&self) -> usize {
        self.args.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;

    #[test]
    fn test_expanded_sql() {
        let ctx = StatementContext::new(
            "DELETE FROM t WHERE t.id = ?",
            vec![Arg::new(ColumnType::BigInt, 3_i64)],
            StatementKind::Delete,
            0,
        );
        assert_eq!(ctx.expanded_sql(), "DELETE FROM t WHERE t.id = 3");
        assert_eq!(ctx.param_count(), 1);
    }
}
