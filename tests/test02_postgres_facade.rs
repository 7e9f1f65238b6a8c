mod common;

use std::sync::Arc;

use common::{consultants_table, count_consultants, postgres_target};
use dual_sql::prelude::*;
use tokio::sync::Barrier;

// Without test-utils, run with DUAL_SQL_TEST_POSTGRES_URL set and `-- --include-ignored`.
#[test]
#[cfg_attr(
    not(feature = "test-utils"),
    ignore = "needs a postgres server: set DUAL_SQL_TEST_POSTGRES_URL or enable test-utils"
)]
fn postgres_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let target = postgres_target("dual_sql_facade")?;
    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(async {
        let settings = BackendSettings::postgres_url(target.url.clone());
        let db = Arc::new(Database::connect(&settings).await?);
        assert_eq!(db.dialect(), Dialect::Postgres);
        consultants_table(&db).await?;

        generated_ids(&db).await?;
        reads_and_literals(&db).await?;
        transaction_control(&db).await?;
        unscoped_transactions(&db).await?;
        concurrent_transactions_are_isolated(&db).await?;
        failed_begin_does_not_leak(&db).await?;
        close_with_open_transaction(db, &settings).await?;
        Ok::<_, DualSqlError>(())
    });
    target.finish();
    outcome?;
    Ok(())
}

async fn generated_ids(db: &Database) -> Result<(), DualSqlError> {
    let ana = db
        .run("INSERT INTO consultants (name) VALUES (?)", &["Ana".into()])
        .await?;
    assert_eq!(ana.changes, 1);
    let ana_id = ana.last_insert_id.expect("generated id for INSERT");

    let row = db
        .get("SELECT name FROM consultants WHERE id = ?", &[ana_id.into()])
        .await?
        .expect("inserted row");
    assert_eq!(row.get("name").and_then(RowValues::as_text), Some("Ana"));

    // Already has RETURNING; appending another would be a syntax error.
    let bo = db
        .run(
            "INSERT INTO consultants (name) VALUES (?) RETURNING id",
            &["Bo".into()],
        )
        .await?;
    assert_eq!(bo.last_insert_id, Some(ana_id + 1));

    let updated = db
        .run("UPDATE consultants SET tag = ? WHERE id = ?", &["seed".into(), ana_id.into()])
        .await?;
    assert_eq!(updated, RunResult { changes: 1, last_insert_id: None });

    // "returning" as data or commentary is not a returning clause
    let literal = db
        .run(
            "INSERT INTO consultants (name, tag) VALUES ('returning customer', 'words')",
            &[],
        )
        .await?;
    assert_eq!(literal.changes, 1);
    assert!(literal.last_insert_id.is_some());

    let commented = db
        .run(
            "INSERT INTO consultants (name, tag) VALUES (?, 'words') -- seed row",
            &["Flo".into()],
        )
        .await?;
    assert_eq!(commented.changes, 1);
    let flo_id = commented.last_insert_id.expect("generated id despite trailing comment");

    let renamed = db
        .run("UPDATE consultants SET name = 'returning' WHERE id = ?", &[flo_id.into()])
        .await?;
    assert_eq!(renamed, RunResult { changes: 1, last_insert_id: None });
    assert_eq!(count_consultants(db, "words").await?, 2);
    Ok(())
}

async fn reads_and_literals(db: &Database) -> Result<(), DualSqlError> {
    db.run("INSERT INTO consultants (name, tag) VALUES ('who?', 'lit')", &[])
        .await?;
    let found = db
        .all(
            "SELECT id FROM consultants WHERE name = 'who?' -- matches ?\n AND tag = ?",
            &["lit".into()],
        )
        .await?;
    assert_eq!(found.len(), 1);

    assert!(
        db.get("SELECT id FROM consultants WHERE id = ?", &[(-1).into()])
            .await?
            .is_none()
    );
    assert!(
        db.all("SELECT id FROM consultants WHERE tag = ?", &["none".into()])
            .await?
            .is_empty()
    );
    Ok(())
}

async fn transaction_control(db: &Database) -> Result<(), DualSqlError> {
    db.execute("COMMIT").await?;
    db.execute("ROLLBACK").await?;

    Database::scope(async {
        db.execute("COMMIT").await?;
        db.execute("BEGIN").await?;
        assert!(matches!(
            db.execute("BEGIN TRANSACTION").await,
            Err(DualSqlError::TransactionAlreadyStarted)
        ));
        db.run(
            "INSERT INTO consultants (name, tag) VALUES (?, ?)",
            &["Cy".into(), "rolled".into()],
        )
        .await?;
        assert_eq!(count_consultants(db, "rolled").await?, 1);
        db.execute("ROLLBACK;").await?;
        Ok::<_, DualSqlError>(())
    })
    .await?;
    assert_eq!(count_consultants(db, "rolled").await?, 0);

    let id = db
        .transaction(|db| async move {
            let res = db
                .run(
                    "INSERT INTO consultants (name, tag) VALUES (?, ?)",
                    &["Di".into(), "closure".into()],
                )
                .await?;
            Ok(res.last_insert_id)
        })
        .await?;
    assert!(id.is_some());
    assert_eq!(count_consultants(db, "closure").await?, 1);
    assert_eq!(db.pool_status().map(|s| s.leased), Some(0));
    Ok(())
}

async fn unscoped_transactions(db: &Arc<Database>) -> Result<(), DualSqlError> {
    db.execute("BEGIN").await?;
    db.run(
        "INSERT INTO consultants (name, tag) VALUES (?, ?)",
        &["Gus".into(), "unscoped".into()],
    )
    .await?;
    assert_eq!(count_consultants(db, "unscoped").await?, 1);

    let outside = {
        let db = Arc::clone(db);
        tokio::spawn(async move { count_consultants(&db, "unscoped").await })
            .await
            .map_err(|e| DualSqlError::ExecutionError(e.to_string()))??
    };
    assert_eq!(outside, 0);

    db.execute("ROLLBACK").await?;
    assert_eq!(count_consultants(db, "unscoped").await?, 0);

    db.execute("BEGIN").await?;
    db.run(
        "INSERT INTO consultants (name, tag) VALUES (?, ?)",
        &["Hal".into(), "unscoped".into()],
    )
    .await?;
    db.execute("COMMIT").await?;
    assert_eq!(count_consultants(db, "unscoped").await?, 1);
    assert_eq!(db.pool_status().map(|s| s.leased), Some(0));
    Ok(())
}

async fn concurrent_transactions_are_isolated(db: &Arc<Database>) -> Result<(), DualSqlError> {
    let before = db.pool_status().expect("postgres reports pool status");
    let barrier = Arc::new(Barrier::new(2));

    let chains: Vec<_> = ["left", "right"]
        .into_iter()
        .map(|tag| {
            let db = Arc::clone(db);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(Database::scope(async move {
                db.execute("BEGIN").await?;
                for i in 0..3 {
                    db.run(
                        "INSERT INTO consultants (name, tag) VALUES (?, ?)",
                        &[format!("{tag}-{i}").into(), tag.into()],
                    )
                    .await?;
                }
                barrier.wait().await;

                let own = count_consultants(&db, tag).await?;
                let other = if tag == "left" { "right" } else { "left" };
                let theirs = count_consultants(&db, other).await?;
                barrier.wait().await;

                db.execute("COMMIT").await?;
                Ok::<_, DualSqlError>((own, theirs))
            }))
        })
        .collect();

    for chain in chains {
        let (own, theirs) = chain
            .await
            .map_err(|e| DualSqlError::ExecutionError(e.to_string()))??;
        assert_eq!(own, 3);
        assert_eq!(theirs, 0);
    }

    assert_eq!(count_consultants(db, "left").await?, 3);
    assert_eq!(count_consultants(db, "right").await?, 3);
    let after = db.pool_status().expect("postgres reports pool status");
    assert_eq!(after.leased, 0);
    assert!(after.available >= before.available);
    Ok(())
}

async fn failed_begin_does_not_leak(db: &Database) -> Result<(), DualSqlError> {
    Database::scope(async {
        db.fail_next_begin_for_tests();
        assert!(db.execute("BEGIN").await.is_err());
        assert_eq!(db.pool_status().map(|s| s.leased), Some(0));

        db.execute("BEGIN").await?;
        db.execute("ROLLBACK").await?;
        Ok::<_, DualSqlError>(())
    })
    .await?;
    assert_eq!(db.pool_status().map(|s| s.leased), Some(0));
    Ok(())
}

async fn close_with_open_transaction(
    db: Arc<Database>,
    settings: &BackendSettings,
) -> Result<(), DualSqlError> {
    let observer = Database::connect(settings).await?;

    Database::scope(async {
        db.execute("BEGIN").await?;
        db.run(
            "INSERT INTO consultants (name, tag) VALUES (?, ?)",
            &["Ed".into(), "abandoned".into()],
        )
        .await?;
        db.close().await?;
        Ok::<_, DualSqlError>(())
    })
    .await?;

    let status = db.pool_status().expect("postgres reports pool status");
    assert_eq!(status.leased, 0);
    assert!(matches!(db.run("SELECT 1", &[]).await, Err(DualSqlError::Closed)));
    assert_eq!(count_consultants(&observer, "abandoned").await?, 0);

    observer.close().await
}
