use super::{
    Dialect, DeleteParts, InsertParts, MergeParts, UpdateParts, UpsertParts, write_merge,
    write_merge_upsert, write_set_list, write_where,
};
use crate::error::{StmtError, StmtResult};
use crate::query_builder::QueryBuilder;
use crate::statement::ConflictValue;

/// Rows per `INSERT ... VALUES` statement accepted by SQL Server.
pub const SQL_SERVER_MAX_BATCH_ROWS: usize = 1000;

/// Microsoft SQL Server.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerDialect;

impl Dialect for SqlServerDialect {
    fn name(&self) -> &'static str {
        "sqlserver"
    }

    fn supports_limit_with_update_or_delete(&self) -> bool {
        true
    }

    fn supports_only_identifiers_in_generated_keys(&self) -> bool {
        true
    }

    /// `SCOPE_IDENTITY()` reports the last identity only.
    fn supports_multiple_generated_keys(&self) -> bool {
        false
    }

    fn supports_merge(&self) -> bool {
        true
    }

    fn supports_upsert_filter(&self) -> bool {
        true
    }

    fn max_batch_rows(&self) -> Option<usize> {
        Some(SQL_SERVER_MAX_BATCH_ROWS)
    }

    fn batch_uses_multi_row_values(&self) -> bool {
        true
    }

    fn replace(&self, qb: &mut QueryBuilder, parts: &InsertParts<'_>) -> StmtResult<()> {
        let keys = parts.table.primary_key();
        if keys.is_empty() {
            return Err(StmtError::unsupported(
                self.name(),
                format!("REPLACE on '{}' without a primary key", parts.table.name()),
            ));
        }
        let on_update: Vec<_> = parts
            .columns
            .iter()
            .filter(|c| !keys.contains(c))
            .map(|c| (c.clone(), ConflictValue::Inserted))
            .collect();
        self.upsert(
            qb,
            &UpsertParts {
                insert: *parts,
                keys,
                on_update: &on_update,
                filter: None,
            },
        )
    }

    fn upsert(&self, qb: &mut QueryBuilder, parts: &UpsertParts<'_>) -> StmtResult<()> {
        write_merge_upsert(self, qb, parts)?;
        qb.push_char(';');
        Ok(())
    }

    fn update(&self, qb: &mut QueryBuilder, parts: &UpdateParts<'_>) -> StmtResult<()> {
        qb.push("UPDATE ");
        if let Some(limit) = parts.limit {
            qb.push("TOP (").push(&limit.to_string()).push(") ");
        }
        qb.push(parts.table.name()).push(" SET ");
        write_set_list(qb, parts.set);
        write_where(qb, parts.predicate);
        Ok(())
    }

    fn delete(&self, qb: &mut QueryBuilder, parts: &DeleteParts<'_>) -> StmtResult<()> {
        qb.push("DELETE ");
        if let Some(limit) = parts.limit {
            qb.push("TOP (").push(&limit.to_string()).push(") ");
        }
        qb.push("FROM ").push(parts.table.name());
        write_where(qb, parts.predicate);
        Ok(())
    }

    fn merge(&self, qb: &mut QueryBuilder, parts: &MergeParts<'_>) -> StmtResult<()> {
        write_merge(qb, parts)?;
        qb.push_char(';');
        Ok(())
    }
}
