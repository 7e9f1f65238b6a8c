use dual_sql::config::env::{DB_DIALECT, SQLITE_DIR, SQLITE_FILE};
use dual_sql::prelude::*;

#[test]
fn selected_sqlite_file_is_created_where_configured() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let data_dir = dir.path().join("nested").join("data");
    let env = EnvSnapshot::from_pairs([
        (DB_DIALECT, "SQLite3"),
        (SQLITE_DIR, data_dir.to_str().ok_or("non-utf8 temp path")?),
        (SQLITE_FILE, "app.db"),
        ("DATABASE_URL", "postgres://ignored@localhost/app"),
    ]);
    let settings = BackendSelector::new()
        .with_mount_path(dir.path().join("missing-mount"))
        .resolve(&env)?;
    assert_eq!(settings, BackendSettings::sqlite(data_dir.join("app.db")));

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let db = Database::connect(&settings).await?;
        db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)").await?;
        db.close().await?;
        Ok::<_, DualSqlError>(())
    })?;
    assert!(data_dir.join("app.db").exists());
    Ok(())
}

#[test]
fn command_line_override_beats_the_environment() -> Result<(), Box<dyn std::error::Error>> {
    let env = EnvSnapshot::from_pairs([("PGHOST", "db.internal")]);
    let selector = BackendSelector::new();
    assert_eq!(selector.select_dialect(&env), Dialect::Postgres);

    let env = env.with_var(DB_DIALECT, Dialect::Sqlite.as_str());
    assert_eq!(selector.select_dialect(&env), Dialect::Sqlite);

    let env = env.with_var(DB_DIALECT, "");
    assert_eq!(selector.select_dialect(&env), Dialect::Postgres);
    Ok(())
}

#[test]
fn postgres_without_location_is_a_config_error() {
    let env = EnvSnapshot::from_pairs([(DB_DIALECT, "postgresql")]);
    assert!(matches!(
        BackendSelector::new().resolve(&env),
        Err(DualSqlError::ConfigError(_))
    ));
}
