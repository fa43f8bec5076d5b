use typedml::{
    ColumnDef, ColumnType, DeleteStatement, Dialect, Expr, InsertStatement, MysqlDialect,
    PostgresDialect, SqlStatement, SqliteDialect, StmtResult, Table, UpdateStatement, Value,
    count_placeholders, expand_args, number_placeholders,
};

fn assert_expands_to_inline<S: SqlStatement>(stmt: &S, dialect: &dyn Dialect) -> StmtResult<()> {
    let rendered = stmt.render(dialect, true)?;
    assert_eq!(rendered.rounds.len(), 1);
    let args = &rendered.rounds[0];
    assert_eq!(count_placeholders(&rendered.sql), args.len());

    let expanded = expand_args(&rendered.sql, args);
    assert_eq!(expanded, stmt.to_sql(dialect)?);
    assert_eq!(count_placeholders(&expanded), 0, "{expanded}");
    Ok(())
}

#[test]
fn prepared_and_inline_rendering_agree() -> StmtResult<()> {
    let docs = Table::builder("docs")
        .column(ColumnDef::new("id", ColumnType::BigInt).auto_increment())
        .column(ColumnDef::new("title", ColumnType::Varchar(Some(200))))
        .column(ColumnDef::new("body", ColumnType::Text).nullable())
        .column(ColumnDef::new("flagged", ColumnType::Boolean).nullable())
        .primary_key(&["id"])
        .build()?;
    let (id, title, body, flagged) = (
        docs.col("id")?,
        docs.col("title")?,
        docs.col("body")?,
        docs.col("flagged")?,
    );

    let mut insert = InsertStatement::new(&docs);
    insert
        .set(&title, "what's new?")?
        .set(&body, Value::Null)?
        .set(&flagged, true)?;

    let mut update = UpdateStatement::new(&docs)
        .where_(Expr::eq(&id, 7_i64).and(Expr::like(&title, "%?%")));
    update.set(&body, "a 'quoted' ?? body")?;

    let delete = DeleteStatement::new(&docs).where_(Expr::in_list(&id, [1_i64, 2, 3]));

    for dialect in [
        &PostgresDialect as &dyn Dialect,
        &MysqlDialect,
        &SqliteDialect::new(),
    ] {
        assert_expands_to_inline(&insert, dialect)?;
        assert_expands_to_inline(&update, dialect)?;
        assert_expands_to_inline(&delete, dialect)?;
    }
    Ok(())
}

#[test]
fn numbered_placeholders_skip_string_literals() {
    let sql = "UPDATE t SET a = ?, b = 'why?' WHERE c = ? AND d = \"e?\"";
    assert_eq!(
        number_placeholders(sql),
        "UPDATE t SET a = $1, b = 'why?' WHERE c = $2 AND d = \"e?\""
    );
    assert_eq!(count_placeholders(sql), 2);
}
