use super::{Dialect, InsertParts, UpsertParts, write_insert_body, write_on_conflict};
use crate::error::StmtResult;
use crate::query_builder::QueryBuilder;

/// SQLite 3.35+.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect {
    update_delete_limit: bool,
}

impl SqliteDialect {
    pub fn new() -> Self {
        Self::default()
    }

    /// For builds compiled with `SQLITE_ENABLE_UPDATE_DELETE_LIMIT`.
    pub fn with_update_delete_limit(mut self) -> Self {
        self.update_delete_limit = true;
        self
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn supports_limit_with_update_or_delete(&self) -> bool {
        self.update_delete_limit
    }

    fn supports_offset_in_delete(&self) -> bool {
        self.update_delete_limit
    }

    fn supports_only_identifiers_in_generated_keys(&self) -> bool {
        true
    }

    /// Only `last_insert_rowid()` is reported.
    fn supports_multiple_generated_keys(&self) -> bool {
        false
    }

    fn supports_returning(&self) -> bool {
        true
    }

    fn supports_default_in_values(&self) -> bool {
        false
    }

    fn supports_upsert_filter(&self) -> bool {
        true
    }

    fn insert(&self, qb: &mut QueryBuilder, ignore: bool, parts: &InsertParts<'_>) -> StmtResult<()> {
        qb.push(if ignore {
            "INSERT OR IGNORE INTO "
        } else {
            "INSERT INTO "
        })
        .push(parts.table.name());
        write_insert_body(qb, parts, " DEFAULT VALUES");
        Ok(())
    }

    fn replace(&self, qb: &mut QueryBuilder, parts: &InsertParts<'_>) -> StmtResult<()> {
        qb.push("INSERT OR REPLACE INTO ").push(parts.table.name());
        write_insert_body(qb, parts, " DEFAULT VALUES");
        Ok(())
    }

    fn upsert(&self, qb: &mut QueryBuilder, parts: &UpsertParts<'_>) -> StmtResult<()> {
        self.insert(qb, false, &parts.insert)?;
        write_on_conflict(qb, parts, "excluded");
        Ok(())
    }
}
