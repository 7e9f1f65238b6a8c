mod common;

use common::{consultants_table, count_consultants, open_sqlite};
use dual_sql::prelude::*;

#[test]
fn sqlite_generated_ids_and_reads() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let db = open_sqlite(dir.path()).await?;
        assert_eq!(db.dialect(), Dialect::Sqlite);
        assert!(db.pool_status().is_none());
        consultants_table(&db).await?;

        let ana = db
            .run("INSERT INTO consultants (name) VALUES (?)", &["Ana".into()])
            .await?;
        assert_eq!(ana.changes, 1);
        assert_eq!(ana.last_insert_id, Some(1));

        let bo = db
            .run(
                "INSERT INTO consultants (name) VALUES (?) RETURNING id",
                &["Bo".into()],
            )
            .await?;
        assert_eq!(bo, RunResult { changes: 1, last_insert_id: Some(2) });

        let renamed = db
            .run("UPDATE consultants SET name = ? WHERE id = ?", &["Ann".into(), 1.into()])
            .await?;
        assert_eq!(renamed, RunResult { changes: 1, last_insert_id: None });

        let row = db
            .get("SELECT id, name FROM consultants WHERE id = ?", &[1.into()])
            .await?
            .expect("row 1 exists");
        assert_eq!(row.get("name").and_then(RowValues::as_text), Some("Ann"));

        assert!(
            db.get("SELECT id FROM consultants WHERE id = ?", &[99.into()])
                .await?
                .is_none()
        );
        assert!(
            db.all("SELECT id FROM consultants WHERE name = ?", &["nobody".into()])
                .await?
                .is_empty()
        );

        let everyone = db
            .all("SELECT id, name FROM consultants ORDER BY id", &[])
            .await?;
        let names: Vec<_> = everyone
            .iter()
            .filter_map(|r| r.get("name").and_then(RowValues::as_text))
            .collect();
        assert_eq!(names, vec!["Ann", "Bo"]);

        // `?` inside a literal is data, not a placeholder.
        db.run("INSERT INTO consultants (name) VALUES ('who?')", &[]).await?;
        let quoted = db
            .get("SELECT id FROM consultants WHERE name = 'who?' AND id > ?", &[0.into()])
            .await?;
        assert!(quoted.is_some());

        db.close().await?;
        Ok(())
    })
}

#[test]
fn sqlite_transactions() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let db = open_sqlite(dir.path()).await?;
        consultants_table(&db).await?;

        db.execute("COMMIT").await?;
        db.execute("rollback;").await?;

        db.execute("BEGIN TRANSACTION").await?;
        assert!(matches!(
            db.execute("BEGIN").await,
            Err(DualSqlError::TransactionAlreadyStarted)
        ));
        db.run(
            "INSERT INTO consultants (name, tag) VALUES (?, ?)",
            &["Ana".into(), "tx".into()],
        )
        .await?;
        db.execute("ROLLBACK").await?;
        assert_eq!(count_consultants(&db, "tx").await?, 0);

        db.execute("begin").await?;
        db.run(
            "INSERT INTO consultants (name, tag) VALUES (?, ?)",
            &["Ana".into(), "tx".into()],
        )
        .await?;
        db.execute("Commit;").await?;
        assert_eq!(count_consultants(&db, "tx").await?, 1);

        let failed = db
            .transaction(|db| async move {
                db.run(
                    "INSERT INTO consultants (name, tag) VALUES (?, ?)",
                    &["Bo".into(), "closure".into()],
                )
                .await?;
                Err::<(), _>(DualSqlError::ExecutionError("abort".into()))
            })
            .await;
        assert!(failed.is_err());
        assert_eq!(count_consultants(&db, "closure").await?, 0);

        let id = db
            .transaction(|db| async move {
                let res = db
                    .run(
                        "INSERT INTO consultants (name, tag) VALUES (?, ?)",
                        &["Cy".into(), "closure".into()],
                    )
                    .await?;
                Ok(res.last_insert_id)
            })
            .await?;
        assert!(id.is_some());
        assert_eq!(count_consultants(&db, "closure").await?, 1);

        db.close().await?;
        Ok(())
    })
}

#[test]
fn sqlite_close_rolls_back_and_rejects_later_calls() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let db = open_sqlite(dir.path()).await?;
        consultants_table(&db).await?;

        db.execute("BEGIN").await?;
        db.run(
            "INSERT INTO consultants (name, tag) VALUES (?, ?)",
            &["Ana".into(), "open".into()],
        )
        .await?;
        db.close().await?;
        db.close().await?;

        assert!(matches!(db.execute("SELECT 1").await, Err(DualSqlError::Closed)));
        assert!(matches!(db.all("SELECT 1", &[]).await, Err(DualSqlError::Closed)));

        let reopened = open_sqlite(dir.path()).await?;
        assert_eq!(count_consultants(&reopened, "open").await?, 0);
        reopened.close().await?;
        Ok(())
    })
}
