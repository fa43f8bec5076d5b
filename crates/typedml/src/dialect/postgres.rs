use super::{
    Dialect, InsertParts, UpsertParts, write_conflict_set, write_insert_body, write_names,
    write_on_conflict,
};
use crate::error::{StmtError, StmtResult};
use crate::query_builder::QueryBuilder;
use crate::statement::ConflictValue;

/// PostgreSQL 15+.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn supports_returning(&self) -> bool {
        true
    }

    fn supports_merge(&self) -> bool {
        true
    }

    fn supports_upsert_filter(&self) -> bool {
        true
    }

    fn insert(&self, qb: &mut QueryBuilder, ignore: bool, parts: &InsertParts<'_>) -> StmtResult<()> {
        qb.push("INSERT INTO ").push(parts.table.name());
        write_insert_body(qb, parts, " DEFAULT VALUES");
        if ignore {
            qb.push(" ON CONFLICT DO NOTHING");
        }
        Ok(())
    }

    /// Upsert on the primary key, overwriting every other inserted column.
    fn replace(&self, qb: &mut QueryBuilder, parts: &InsertParts<'_>) -> StmtResult<()> {
        let keys = parts.table.primary_key();
        if keys.is_empty() {
            return Err(StmtError::unsupported(
                self.name(),
                format!("REPLACE on '{}' without a primary key", parts.table.name()),
            ));
        }
        qb.push("INSERT INTO ").push(parts.table.name());
        write_insert_body(qb, parts, " DEFAULT VALUES");
        qb.push(" ON CONFLICT (");
        write_names(qb, keys);
        qb.push_char(')');

        let on_update: Vec<_> = parts
            .columns
            .iter()
            .filter(|c| !keys.contains(c))
            .map(|c| (c.clone(), ConflictValue::Inserted))
            .collect();
        if on_update.is_empty() {
            qb.push(" DO NOTHING");
        } else {
            qb.push(" DO UPDATE SET ");
            write_conflict_set(qb, &on_update, |qb, c| {
                qb.push("EXCLUDED.").push(c.name());
            });
        }
        Ok(())
    }

    fn upsert(&self, qb: &mut QueryBuilder, parts: &UpsertParts<'_>) -> StmtResult<()> {
        qb.push("INSERT INTO ").push(parts.insert.table.name());
        write_insert_body(qb, &parts.insert, " DEFAULT VALUES");
        write_on_conflict(qb, parts, "EXCLUDED");
        Ok(())
    }
}
