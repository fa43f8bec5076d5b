//! Vendor SQL dialects.
//!
//! A [`Dialect`] answers capability questions and renders the shape of a
//! statement into a [`QueryBuilder`]. The provided renderers emit ANSI SQL;
//! vendors override the ones whose syntax differs.

mod h2;
mod mysql;
mod postgres;
mod sqlite;
mod sqlserver;

pub use h2::H2Dialect;
pub use mysql::MysqlDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;
pub use sqlserver::SqlServerDialect;

use crate::column_values::BoundValue;
use crate::error::{StmtError, StmtResult};
use crate::expr::Expr;
use crate::query_builder::QueryBuilder;
use crate::schema::{ColumnRef, Table};
use crate::statement::{ConflictValue, MergeClause, MergeSource};
use std::fmt;

/// Insert-shaped statement data: one column list, one or more value rows.
#[derive(Debug, Clone, Copy)]
pub struct InsertParts<'a> {
    pub table: &'a Table,
    pub columns: &'a [ColumnRef],
    /// Each row is aligned with `columns`.
    pub rows: &'a [Vec<BoundValue>],
}

#[derive(Debug, Clone, Copy)]
pub struct UpsertParts<'a> {
    pub insert: InsertParts<'a>,
    pub keys: &'a [ColumnRef],
    pub on_update: &'a [(ColumnRef, ConflictValue)],
    pub filter: Option<&'a Expr>,
}

#[derive(Debug, Clone, Copy)]
pub struct UpdateParts<'a> {
    pub table: &'a Table,
    pub set: &'a [(ColumnRef, BoundValue)],
    pub predicate: Option<&'a Expr>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
pub struct DeleteParts<'a> {
    pub table: &'a Table,
    pub predicate: Option<&'a Expr>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub ignore: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct MergeParts<'a> {
    pub table: &'a Table,
    pub source: &'a MergeSource,
    pub on: &'a Expr,
    pub clauses: &'a [MergeClause],
}

/// One database vendor's SQL syntax and capabilities.
pub trait Dialect: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn supports_limit_with_update_or_delete(&self) -> bool {
        false
    }

    fn supports_offset_in_delete(&self) -> bool {
        false
    }

    /// Generated keys can only be requested by naming identifier columns.
    fn supports_only_identifiers_in_generated_keys(&self) -> bool {
        false
    }

    /// A multi-row execution returns one key row per inserted row
    /// (as opposed to only the last one).
    fn supports_multiple_generated_keys(&self) -> bool {
        true
    }

    fn supports_generated_keys(&self) -> bool {
        true
    }

    fn supports_returning(&self) -> bool {
        false
    }

    fn supports_merge(&self) -> bool {
        false
    }

    fn supports_delete_ignore(&self) -> bool {
        false
    }

    /// `DEFAULT` is accepted inside `VALUES (...)`.
    fn supports_default_in_values(&self) -> bool {
        true
    }

    /// Upserts accept an extra predicate on the update branch.
    fn supports_upsert_filter(&self) -> bool {
        false
    }

    /// Physical row cap of one batch.
    fn max_batch_rows(&self) -> Option<usize> {
        None
    }

    /// Batches render as one multi-row `VALUES` round instead of one
    /// prepared round per row.
    fn batch_uses_multi_row_values(&self) -> bool {
        false
    }

    fn insert(&self, qb: &mut QueryBuilder, ignore: bool, parts: &InsertParts<'_>) -> StmtResult<()> {
        if ignore {
            return Err(StmtError::unsupported(self.name(), "INSERT IGNORE"));
        }
        qb.push("INSERT INTO ").push(parts.table.name());
        write_insert_body(qb, parts, " DEFAULT VALUES");
        Ok(())
    }

    fn replace(&self, _qb: &mut QueryBuilder, _parts: &InsertParts<'_>) -> StmtResult<()> {
        Err(StmtError::unsupported(self.name(), "REPLACE"))
    }

    fn upsert(&self, _qb: &mut QueryBuilder, _parts: &UpsertParts<'_>) -> StmtResult<()> {
        Err(StmtError::unsupported(self.name(), "UPSERT"))
    }

    fn update(&self, qb: &mut QueryBuilder, parts: &UpdateParts<'_>) -> StmtResult<()> {
        qb.push("UPDATE ").push(parts.table.name()).push(" SET ");
        write_set_list(qb, parts.set);
        write_where(qb, parts.predicate);
        if let Some(limit) = parts.limit {
            qb.push(" LIMIT ").push(&limit.to_string());
        }
        Ok(())
    }

    fn delete(&self, qb: &mut QueryBuilder, parts: &DeleteParts<'_>) -> StmtResult<()> {
        qb.push("DELETE ");
        if parts.ignore {
            qb.push("IGNORE ");
        }
        qb.push("FROM ").push(parts.table.name());
        write_where(qb, parts.predicate);
        if let Some(limit) = parts.limit {
            qb.push(" LIMIT ").push(&limit.to_string());
        }
        if let Some(offset) = parts.offset {
            qb.push(" OFFSET ").push(&offset.to_string());
        }
        Ok(())
    }

    fn merge(&self, qb: &mut QueryBuilder, parts: &MergeParts<'_>) -> StmtResult<()> {
        write_merge(qb, parts)
    }

    /// Append a `RETURNING` clause (`*` when `columns` is empty).
    fn returning(&self, qb: &mut QueryBuilder, columns: &[ColumnRef]) -> StmtResult<()> {
        if !self.supports_returning() {
            return Err(StmtError::unsupported(self.name(), "RETURNING"));
        }
        qb.push(" RETURNING ");
        if columns.is_empty() {
            qb.push("*");
        } else {
            write_names(qb, columns);
        }
        Ok(())
    }
}

/// Look up a dialect by its name (case-insensitive).
pub fn dialect_for_name(name: &str) -> Option<Box<dyn Dialect>> {
    match name.to_ascii_lowercase().as_str() {
        "postgres" | "postgresql" => Some(Box::new(PostgresDialect)),
        "mysql" | "mariadb" => Some(Box::new(MysqlDialect)),
        "sqlite" => Some(Box::new(SqliteDialect::default())),
        "h2" => Some(Box::new(H2Dialect)),
        "sqlserver" | "mssql" => Some(Box::new(SqlServerDialect)),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Shared fragments
// ---------------------------------------------------------------------------

/// Write a value bound to `column`.
pub(crate) fn write_bound(qb: &mut QueryBuilder, column: &ColumnRef, value: &BoundValue) {
    match value {
        BoundValue::Value(v) => {
            qb.register_argument(column.column_type(), v);
        }
        BoundValue::Expr(e) => {
            qb.append_expr(e);
        }
        BoundValue::Default => {
            qb.push("DEFAULT");
        }
    }
}

/// `a, b, c` (unqualified names)
pub(crate) fn write_names(qb: &mut QueryBuilder, columns: &[ColumnRef]) {
    qb.append_separated(columns, ", ", |qb, c| {
        qb.push(c.name());
    });
}

/// `VALUES (?, ?), (?, ?)`
pub(crate) fn write_values(qb: &mut QueryBuilder, columns: &[ColumnRef], rows: &[Vec<BoundValue>]) {
    qb.push("VALUES ");
    qb.append_separated(rows, ", ", |qb, row| {
        qb.push_char('(');
        qb.append_separated(columns.iter().zip(row), ", ", |qb, (c, v)| {
            write_bound(qb, c, v);
        });
        qb.push_char(')');
    });
}

/// ` (a, b) VALUES (...)`, or `empty` when there are no columns.
pub(crate) fn write_insert_body(qb: &mut QueryBuilder, parts: &InsertParts<'_>, empty: &str) {
    if parts.columns.is_empty() {
        qb.push(empty);
        return;
    }
    qb.push(" (");
    write_names(qb, parts.columns);
    qb.push(") ");
    write_values(qb, parts.columns, parts.rows);
}

/// `a = ?, b = DEFAULT`
pub(crate) fn write_set_list(qb: &mut QueryBuilder, set: &[(ColumnRef, BoundValue)]) {
    qb.append_separated(set, ", ", |qb, (c, v)| {
        qb.push(c.name()).push(" = ");
        write_bound(qb, c, v);
    });
}

pub(crate) fn write_where(qb: &mut QueryBuilder, predicate: Option<&Expr>) {
    if let Some(p) = predicate {
        qb.push(" WHERE ");
        qb.append_expr(p);
    }
}

/// Upsert update list where inserted values are referenced through `inserted`.
pub(crate) fn write_conflict_set(
    qb: &mut QueryBuilder,
    on_update: &[(ColumnRef, ConflictValue)],
    inserted: impl Fn(&mut QueryBuilder, &ColumnRef),
) {
    qb.append_separated(on_update, ", ", |qb, (c, v)| {
        qb.push(c.name()).push(" = ");
        match v {
            ConflictValue::Inserted => inserted(qb, c),
            ConflictValue::Bound(b) => write_bound(qb, c, b),
        }
    });
}

/// `ON CONFLICT (keys) DO UPDATE SET ... [WHERE ...]` as written by
/// Postgres and SQLite. `excluded` is the pseudo-table name.
pub(crate) fn write_on_conflict(qb: &mut QueryBuilder, parts: &UpsertParts<'_>, excluded: &str) {
    qb.push(" ON CONFLICT (");
    write_names(qb, parts.keys);
    qb.push_char(')');
    if parts.on_update.is_empty() {
        qb.push(" DO NOTHING");
        return;
    }
    qb.push(" DO UPDATE SET ");
    write_conflict_set(qb, parts.on_update, |qb, c| {
        qb.push(excluded).push_char('.').push(c.name());
    });
    write_where(qb, parts.filter);
}

/// `MERGE`-based upsert for vendors without an insert-level conflict clause.
pub(crate) fn write_merge_upsert(
    dialect: &dyn Dialect,
    qb: &mut QueryBuilder,
    parts: &UpsertParts<'_>,
) -> StmtResult<()> {
    let insert = &parts.insert;
    if insert
        .rows
        .iter()
        .any(|row| row.iter().any(BoundValue::is_default))
    {
        return Err(StmtError::unsupported(
            dialect.name(),
            "DEFAULT in upsert source rows",
        ));
    }
    let table = insert.table.name();

    qb.push("MERGE INTO ").push(table).push(" USING (");
    write_values(qb, insert.columns, insert.rows);
    qb.push(") AS S(");
    write_names(qb, insert.columns);
    qb.push(") ON ");
    qb.append_separated(parts.keys, " AND ", |qb, k| {
        qb.push(table)
            .push_char('.')
            .push(k.name())
            .push(" = S.")
            .push(k.name());
    });

    if !parts.on_update.is_empty() {
        qb.push(" WHEN MATCHED");
        if let Some(filter) = parts.filter {
            qb.push(" AND ");
            qb.append_expr(filter);
        }
        qb.push(" THEN UPDATE SET ");
        write_conflict_set(qb, parts.on_update, |qb, c| {
            qb.push("S.").push(c.name());
        });
    }

    qb.push(" WHEN NOT MATCHED THEN INSERT (");
    write_names(qb, insert.columns);
    qb.push(") VALUES (");
    qb.append_separated(insert.columns, ", ", |qb, c| {
        qb.push("S.").push(c.name());
    });
    qb.push_char(')');
    Ok(())
}

/// ANSI `MERGE INTO ... USING ... ON ... WHEN ...`
pub(crate) fn write_merge(qb: &mut QueryBuilder, parts: &MergeParts<'_>) -> StmtResult<()> {
    qb.push("MERGE INTO ").push(parts.table.name()).push(" USING ");
    match parts.source {
        MergeSource::Table(source) => {
            qb.push(source.name());
        }
        MergeSource::Query { query, alias } => {
            qb.push_char('(');
            qb.append_expr(query);
            qb.push(") AS ").push(alias);
        }
    }
    qb.push(" ON ");
    qb.append_expr(parts.on);

    for clause in parts.clauses {
        let (matched, predicate) = match clause {
            MergeClause::Insert { predicate, .. } => (false, predicate),
            MergeClause::Update { predicate, .. } | MergeClause::Delete { predicate } => {
                (true, predicate)
            }
        };
        qb.push(if matched { " WHEN MATCHED" } else { " WHEN NOT MATCHED" });
        if let Some(p) = predicate {
            qb.push(" AND ");
            qb.append_expr(p);
        }
        qb.push(" THEN ");
        match clause {
            MergeClause::Insert { values, .. } => {
                qb.push("INSERT (");
                qb.append_separated(values, ", ", |qb, (c, _)| {
                    qb.push(c.name());
                });
                qb.push(") VALUES (");
                qb.append_separated(values, ", ", |qb, (c, v)| write_bound(qb, c, v));
                qb.push_char(')');
            }
            MergeClause::Update { values, .. } => {
                qb.push("UPDATE SET ");
                write_set_list(qb, values);
            }
            MergeClause::Delete { .. } => {
                qb.push("DELETE");
            }
        }
    }
    Ok(())
}
