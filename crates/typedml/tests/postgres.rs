//! End-to-end checks against a live Postgres. Skipped unless `DATABASE_URL`
//! is set (a `.env` file is honored).

#![cfg(feature = "postgres")]

use futures_util::TryStreamExt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio_postgres::NoTls;
use typedml::driver::postgres::PgDriver;
use typedml::{
    BatchInsertStatement, BatchStatement, ColumnDef, ColumnType, Database, DeleteStatement,
    ExecutionConfig, Expr, InsertStatement, PostgresDialect, ReturningStatement, StatsInterceptor,
    StmtError, StmtResult, Table, TracingInterceptor, UpdateStatement, UpsertStatement, Value,
};

fn database_url(test: &str) -> Option<String> {
    let _ = dotenvy::dotenv();
    match std::env::var("DATABASE_URL") {
        Ok(v) => Some(v),
        Err(_) => {
            eprintln!("DATABASE_URL is not set; skipping {test}");
            None
        }
    }
}

fn unique_table_name() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before UNIX_EPOCH")
        .as_nanos();
    format!("typedml_it_{}_{}", std::process::id(), nanos)
}

#[tokio::test]
async fn insert_update_upsert_delete_roundtrip() -> StmtResult<()> {
    let Some(url) = database_url("insert_update_upsert_delete_roundtrip") else {
        return Ok(());
    };
    let (client, connection) = tokio_postgres::connect(&url, NoTls)
        .await
        .expect("connect to DATABASE_URL");
    tokio::spawn(async move {
        let _ = connection.await;
    });

    let name = unique_table_name();
    client
        .batch_execute(&format!(
            "CREATE TEMP TABLE {name} (
                id BIGSERIAL PRIMARY KEY,
                title VARCHAR(100) NOT NULL,
                note TEXT,
                created TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )"
        ))
        .await
        .expect("create temp table");

    let table = Table::builder(name.as_str())
        .column(ColumnDef::new("id", ColumnType::BigInt).auto_increment())
        .column(ColumnDef::new("title", ColumnType::Varchar(Some(100))))
        .column(ColumnDef::new("note", ColumnType::Text).nullable())
        .column(ColumnDef::new("created", ColumnType::Timestamp).db_default("CURRENT_TIMESTAMP"))
        .primary_key(&["id"])
        .build()?;
    let (id, title, note, created) = (
        table.col("id")?,
        table.col("title")?,
        table.col("note")?,
        table.col("created")?,
    );

    let stats = Arc::new(StatsInterceptor::new());
    let db = Database::new(PostgresDialect)
        .with_interceptor(TracingInterceptor::new())
        .with_interceptor_arc(stats.clone())
        .with_config(ExecutionConfig::new().log_sql(true));
    let mut tx = db.async_transaction(PgDriver::new(client));

    let mut insert = InsertStatement::new(&table);
    insert.set(&title, "first")?;
    assert_eq!(tx.exec(&mut insert).await?, 1);
    let first_id = insert.get(&id)?.as_i64().expect("integer id");
    assert!(!insert.get(&created)?.is_null());

    let mut batch = BatchInsertStatement::new(&table);
    for t in ["a", "b", "c"] {
        batch.set(&title, t)?.set(&note, format!("note {t}"))?;
        batch.add_batch()?;
    }
    let rows = tx.exec(&mut batch).await?;
    let ids: Vec<i64> = rows.iter().map(|r| r.get_i64("id")).collect::<StmtResult<_>>()?;
    assert_eq!(ids, vec![first_id + 1, first_id + 2, first_id + 3]);

    let mut update = UpdateStatement::new(&table).where_(Expr::eq(&id, first_id));
    update.set(&note, "updated")?;
    assert_eq!(tx.exec(&mut update).await?, 1);

    let mut upsert = UpsertStatement::new(&table);
    upsert.set(&id, first_id)?.set(&title, "replaced")?;
    assert_eq!(tx.exec(&mut upsert).await?, 1);

    let mut duplicate = InsertStatement::new(&table);
    duplicate.set(&id, first_id)?.set(&title, "dup")?;
    let err = tx.exec(&mut duplicate).await.unwrap_err();
    assert!(matches!(err, StmtError::Database { ref source, .. } if source.is_unique_violation()));

    let mut delete = ReturningStatement::new(
        DeleteStatement::new(&table).where_(Expr::gt(&id, first_id)),
        &[id.clone(), title.clone()],
    );
    let deleted: Vec<_> = tx.query(&mut delete).await?.try_collect().await?;
    assert_eq!(deleted.len(), 3);
    assert!(
        deleted
            .iter()
            .any(|r| r.get("title") == Some(&Value::Text("b".into())))
    );

    let snapshot = stats.stats();
    assert_eq!(snapshot.failed, 1);
    assert_eq!(snapshot.insert_count, 2);
    assert!(tx.modified_tables().contains(&name));
    Ok(())
}
