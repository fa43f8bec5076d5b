use super::{Dialect, InsertParts, UpsertParts, write_conflict_set, write_insert_body};
use crate::error::StmtResult;
use crate::query_builder::QueryBuilder;

/// MySQL / MariaDB.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDialect;

impl Dialect for MysqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn supports_limit_with_update_or_delete(&self) -> bool {
        true
    }

    fn supports_only_identifiers_in_generated_keys(&self) -> bool {
        true
    }

    fn supports_delete_ignore(&self) -> bool {
        true
    }

    fn insert(&self, qb: &mut QueryBuilder, ignore: bool, parts: &InsertParts<'_>) -> StmtResult<()> {
        qb.push(if ignore { "INSERT IGNORE INTO " } else { "INSERT INTO " })
            .push(parts.table.name());
        write_insert_body(qb, parts, " () VALUES ()");
        Ok(())
    }

    fn replace(&self, qb: &mut QueryBuilder, parts: &InsertParts<'_>) -> StmtResult<()> {
        qb.push("REPLACE INTO ").push(parts.table.name());
        write_insert_body(qb, parts, " () VALUES ()");
        Ok(())
    }

    /// `ON DUPLICATE KEY UPDATE`; MySQL picks the conflicting key itself.
    fn upsert(&self, qb: &mut QueryBuilder, parts: &UpsertParts<'_>) -> StmtResult<()> {
        if parts.on_update.is_empty() {
            return self.insert(qb, true, &parts.insert);
        }
        self.insert(qb, false, &parts.insert)?;
        qb.push(" ON DUPLICATE KEY UPDATE ");
        write_conflict_set(qb, parts.on_update, |qb, c| {
            qb.push("VALUES(").push(c.name()).push_char(')');
        });
        Ok(())
    }
}
