use super::{
    Dialect, InsertParts, UpsertParts, write_insert_body, write_merge_upsert, write_names,
    write_values,
};
use crate::error::{StmtError, StmtResult};
use crate::query_builder::QueryBuilder;
use crate::schema::ColumnRef;
use crate::statement::ConflictValue;

/// H2 in its native mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct H2Dialect;

impl H2Dialect {
    /// `MERGE INTO t (cols) KEY (keys) VALUES (...)`
    fn merge_key(&self, qb: &mut QueryBuilder, parts: &InsertParts<'_>, keys: &[ColumnRef]) {
        qb.push("MERGE INTO ").push(parts.table.name()).push(" (");
        write_names(qb, parts.columns);
        qb.push_char(')');
        if !keys.is_empty() {
            qb.push(" KEY (");
            write_names(qb, keys);
            qb.push_char(')');
        }
        qb.push_char(' ');
        write_values(qb, parts.columns, parts.rows);
    }
}

impl Dialect for H2Dialect {
    fn name(&self) -> &'static str {
        "h2"
    }

    fn supports_limit_with_update_or_delete(&self) -> bool {
        true
    }

    /// Batches report only the last generated key.
    fn supports_multiple_generated_keys(&self) -> bool {
        false
    }

    fn supports_merge(&self) -> bool {
        true
    }

    fn supports_upsert_filter(&self) -> bool {
        true
    }

    fn insert(&self, qb: &mut QueryBuilder, ignore: bool, parts: &InsertParts<'_>) -> StmtResult<()> {
        if ignore {
            return Err(StmtError::unsupported(self.name(), "INSERT IGNORE"));
        }
        qb.push("INSERT INTO ").push(parts.table.name());
        write_insert_body(qb, parts, " DEFAULT VALUES");
        Ok(())
    }

    fn replace(&self, qb: &mut QueryBuilder, parts: &InsertParts<'_>) -> StmtResult<()> {
        if parts.columns.is_empty() {
            return Err(StmtError::NoColumnsToInsert {
                table: parts.table.name().to_string(),
            });
        }
        self.merge_key(qb, parts, parts.table.primary_key());
        Ok(())
    }

    /// `MERGE ... KEY` overwrites every inserted column, so it only serves
    /// upserts that do exactly that; anything else goes through `MERGE USING`.
    fn upsert(&self, qb: &mut QueryBuilder, parts: &UpsertParts<'_>) -> StmtResult<()> {
        let insert = &parts.insert;
        let plain = parts.filter.is_none()
            && parts
                .on_update
                .iter()
                .all(|(_, v)| matches!(v, ConflictValue::Inserted))
            && insert
                .columns
                .iter()
                .filter(|c| !parts.keys.contains(c))
                .eq(parts.on_update.iter().map(|(c, _)| c));
        if plain && !parts.on_update.is_empty() {
            self.merge_key(qb, insert, parts.keys);
            Ok(())
        } else {
            write_merge_upsert(self, qb, parts)
        }
    }
}
