//! Streaming many rows through capped batches, flushing whenever a batch
//! reports that it is full.

mod common;

use common::{MemoryDriver, users};
use std::sync::Arc;
use typedml::{
    BatchInsertStatement, BatchStatement, Database, KeyRetrieval, PostgresDialect,
    SqlServerDialect, StatsInterceptor, StmtError, StmtResult, Transaction, Value,
};

fn flush(
    tx: &mut Transaction<MemoryDriver>,
    batch: &mut BatchInsertStatement,
    ids: &mut Vec<i64>,
) -> StmtResult<()> {
    for row in tx.exec(batch)? {
        ids.push(row.get_i64("id")?);
    }
    Ok(())
}

#[test]
fn stream_rows_through_capped_batches() -> StmtResult<()> {
    let users = users();
    let name = users.col("name")?;
    let stats = Arc::new(StatsInterceptor::new());
    let db = Database::new(SqlServerDialect).with_interceptor_arc(stats.clone());
    let driver = MemoryDriver::new().last_key_only();
    let mut tx = db.transaction(driver.clone());

    let mut ids = Vec::new();
    let mut batch = BatchInsertStatement::for_dialect(&users, db.dialect());
    for i in 0..2500 {
        batch.set(&name, format!("user{i}"))?;
        match batch.add_batch() {
            Ok(()) => {}
            Err(StmtError::BatchRowLimitExceeded { limit, .. }) => {
                assert_eq!(limit, 1000);
                assert_eq!(batch.row_count(), 1000);
                flush(&mut tx, &mut batch, &mut ids)?;
                batch = BatchInsertStatement::for_dialect(&users, db.dialect());
            }
            Err(e) => return Err(e),
        }
    }
    if batch.row_count() > 0 {
        flush(&mut tx, &mut batch, &mut ids)?;
    }

    assert_eq!(ids, (1..=2500).collect::<Vec<i64>>());
    assert_eq!(
        batch.result_rows().last().and_then(|r| r.get("name")),
        Some(&Value::Text("user2499".into()))
    );

    let executed = driver.executed();
    assert_eq!(executed.len(), 3);
    assert!(executed.iter().all(|e| e.rounds.len() == 1));
    assert_eq!(executed[0].rounds[0].len(), 2000);
    // name and note for each of the 1000 rows
    assert_eq!(executed[2].rounds[0].len(), 1000);
    assert_eq!(executed[0].keys, KeyRetrieval::Columns(vec!["id".to_string()]));

    let snapshot = stats.stats();
    assert_eq!(snapshot.executions, 3);
    assert_eq!(snapshot.insert_count, 3);
    assert_eq!(snapshot.affected_rows, 2500);
    assert_eq!(snapshot.batched, 0);
    assert!(tx.modified_tables().contains("users"));
    Ok(())
}

#[test]
fn prepared_batch_sends_one_round_per_row() -> StmtResult<()> {
    let users = users();
    let (name, note) = (users.col("name")?, users.col("note")?);
    let db = Database::new(PostgresDialect);
    let driver = MemoryDriver::new();
    let mut tx = db.transaction(driver.clone());

    let mut batch = BatchInsertStatement::new(&users);
    batch.set(&name, "a")?.set(&note, "first")?;
    batch.add_batch()?;
    batch.set(&name, "b")?;
    batch.add_batch()?;
    batch.set(&name, "c")?.set(&note, "third")?;

    let rows = tx.exec(&mut batch)?;
    let ids: Vec<i64> = rows.iter().map(|r| r.get_i64("id")).collect::<StmtResult<_>>()?;
    assert_eq!(ids, vec![1, 2, 3]);

    let executed = driver.executed();
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0].sql, "INSERT INTO users (name, note) VALUES (?, ?)");
    assert_eq!(executed[0].rounds.len(), 3);
    assert_eq!(executed[0].rounds[1][1].value, Value::Null);
    Ok(())
}

#[test]
fn rejected_row_is_dropped_and_the_rest_executes() -> StmtResult<()> {
    let users = users();
    let (name, note) = (users.col("name")?, users.col("note")?);
    let db = Database::new(PostgresDialect);
    let driver = MemoryDriver::new();
    let mut tx = db.transaction(driver.clone());

    let inputs = [(Some("a"), "x"), (None, "orphan"), (Some("c"), "z")];
    let mut batch = BatchInsertStatement::new(&users);
    let mut rejected = Vec::new();
    for (i, (n, x)) in inputs.iter().enumerate() {
        if let Some(n) = n {
            batch.set(&name, *n)?;
        }
        batch.set(&note, *x)?;
        if let Err(e) = batch.add_batch() {
            assert!(e.is_batch_recoverable());
            rejected.push(i);
            // Reopens the previous row; seal it again and keep going.
            batch.remove_last_batch();
            batch.add_batch()?;
        }
    }

    assert_eq!(rejected, vec![1]);
    let rows = tx.exec(&mut batch)?;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].get("name"), Some(&Value::Text("c".into())));
    assert_eq!(driver.executed()[0].rounds.len(), 2);
    Ok(())
}
