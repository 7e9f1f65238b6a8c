#![allow(dead_code)]

use std::env;
use std::path::Path;

use dual_sql::prelude::*;

/// External server for the Postgres tests, e.g. `postgres://user:pw@localhost/testing`.
pub const POSTGRES_URL_VAR: &str = "DUAL_SQL_TEST_POSTGRES_URL";

pub async fn open_sqlite(dir: &Path) -> Result<Database, DualSqlError> {
    Database::connect(&BackendSettings::sqlite(dir.join("test.sqlite"))).await
}

pub async fn consultants_table(db: &Database) -> Result<(), DualSqlError> {
    let id_column = match db.dialect() {
        Dialect::Sqlite => "id INTEGER PRIMARY KEY AUTOINCREMENT",
        Dialect::Postgres => "id SERIAL PRIMARY KEY",
    };
    db.execute("DROP TABLE IF EXISTS consultants").await?;
    db.execute(&format!(
        "CREATE TABLE consultants ({id_column}, name TEXT NOT NULL, tag TEXT)"
    ))
    .await
}

pub async fn count_consultants(db: &Database, tag: &str) -> Result<i64, DualSqlError> {
    let row = db
        .get(
            "SELECT COUNT(*) AS cnt FROM consultants WHERE tag = ?",
            &[RowValues::from(tag)],
        )
        .await?
        .ok_or_else(|| DualSqlError::ExecutionError("COUNT returned no row".into()))?;
    row.get("cnt")
        .and_then(RowValues::as_int)
        .copied()
        .ok_or_else(|| DualSqlError::ExecutionError("missing count".into()))
}

/// A Postgres server to test against.
pub struct PgTarget {
    pub url: String,
    #[cfg(feature = "test-utils")]
    embedded: Option<dual_sql::test_utils::EmbeddedPostgres>,
}

impl PgTarget {
    pub fn finish(self) {
        #[cfg(feature = "test-utils")]
        if let Some(embedded) = self.embedded {
            dual_sql::test_utils::stop_postgres_embedded(embedded);
        }
    }
}

/// The server named by [`POSTGRES_URL_VAR`], else an embedded one with `test-utils`.
///
/// Without either this is an error, so a Postgres test that is run never passes vacuously.
pub fn postgres_target(dbname: &str) -> Result<PgTarget, Box<dyn std::error::Error>> {
    if let Ok(url) = env::var(POSTGRES_URL_VAR) {
        return Ok(PgTarget {
            url,
            #[cfg(feature = "test-utils")]
            embedded: None,
        });
    }
    start_embedded(dbname)
}

#[cfg(feature = "test-utils")]
fn start_embedded(dbname: &str) -> Result<PgTarget, Box<dyn std::error::Error>> {
    let embedded = dual_sql::test_utils::setup_postgres_embedded(dbname)?;
    Ok(PgTarget {
        url: embedded.database_url.clone(),
        embedded: Some(embedded),
    })
}

#[cfg(not(feature = "test-utils"))]
fn start_embedded(_dbname: &str) -> Result<PgTarget, Box<dyn std::error::Error>> {
    Err(format!("no postgres server: set {POSTGRES_URL_VAR} or enable the test-utils feature").into())
}
