use async_trait::async_trait;
use rusqlite::params_from_iter;
use tracing::{debug, warn};

use crate::backend::DialectBackend;
use crate::error::DualSqlError;
use crate::results::{ResultSet, RunResult};
use crate::statement::{ControlStatement, is_insert};
use crate::types::{Dialect, RowValues};

use super::config::SqliteBackend;
use super::connection::run_blocking;
use super::params::Params;
use super::query::build_result_set;

/// Execute one or more statements with no parameters.
///
/// # Errors
/// Returns the `SQLite` error if any statement fails.
pub fn execute_batch(conn: &mut rusqlite::Connection, sql: &str) -> Result<(), DualSqlError> {
    conn.execute_batch(sql)?;
    Ok(())
}

/// Apply a control statement to the connection's native transaction state.
///
/// `COMMIT`/`ROLLBACK` with nothing open are no-ops. A failed `COMMIT` that leaves the
/// transaction open is rolled back so the connection always ends up outside a transaction.
///
/// # Errors
/// Returns [`DualSqlError::TransactionAlreadyStarted`] for a nested `BEGIN`, or the native
/// error from the command itself.
pub fn control(
    conn: &mut rusqlite::Connection,
    statement: ControlStatement,
) -> Result<(), DualSqlError> {
    let in_transaction = !conn.is_autocommit();
    match statement {
        ControlStatement::Begin if in_transaction => Err(DualSqlError::TransactionAlreadyStarted),
        ControlStatement::Begin => execute_batch(conn, statement.native_sql()),
        ControlStatement::Commit | ControlStatement::Rollback if !in_transaction => {
            debug!(?statement, "no open sqlite transaction; ignoring");
            Ok(())
        }
        ControlStatement::Commit => {
            let outcome = execute_batch(conn, statement.native_sql());
            if outcome.is_err() && !conn.is_autocommit() {
                rollback_quietly(conn);
            }
            outcome
        }
        ControlStatement::Rollback => execute_batch(conn, statement.native_sql()),
    }
}

pub(crate) fn rollback_quietly(conn: &mut rusqlite::Connection) {
    if let Err(err) = conn.execute_batch("ROLLBACK") {
        warn!(error = %err, "sqlite rollback during cleanup failed");
    }
}

/// Execute a parameterized statement and report changes plus the generated rowid for INSERTs.
///
/// Statements that return rows (e.g. `INSERT ... RETURNING id`) are stepped as queries; their
/// row count is the change count and a first-row `id` is preferred as the generated key.
///
/// # Errors
/// Returns the `SQLite` error from preparing or executing the statement.
pub fn run(
    conn: &mut rusqlite::Connection,
    sql: &str,
    params: &Params,
) -> Result<RunResult, DualSqlError> {
    let insert = is_insert(sql);
    let mut stmt = conn.prepare(sql)?;

    if stmt.column_count() == 0 {
        let changes = stmt.execute(params_from_iter(params.as_values().iter()))?;
        let last_insert_id = (insert && changes > 0).then(|| conn.last_insert_rowid());
        return Ok(RunResult {
            changes,
            last_insert_id,
        });
    }

    let rows = build_result_set(&mut stmt, params.as_values())?;
    let changes = rows.rows_affected;
    let last_insert_id = rows
        .first_generated_id()
        .or_else(|| (insert && changes > 0).then(|| conn.last_insert_rowid()));
    Ok(RunResult {
        changes,
        last_insert_id,
    })
}

/// Execute a parameterized statement and collect its rows.
///
/// # Errors
/// Returns the `SQLite` error from preparing or stepping the statement.
pub fn select(
    conn: &mut rusqlite::Connection,
    sql: &str,
    params: &Params,
) -> Result<ResultSet, DualSqlError> {
    let mut stmt = conn.prepare(sql)?;
    build_result_set(&mut stmt, params.as_values())
}

#[async_trait]
impl DialectBackend for SqliteBackend {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn execute(&self, sql: &str) -> Result<(), DualSqlError> {
        debug!(dialect = "sqlite", sql, "execute");
        let sql = sql.to_owned();
        run_blocking(self.conn.clone(), move |conn| execute_batch(conn, &sql)).await
    }

    async fn control(&self, statement: ControlStatement) -> Result<(), DualSqlError> {
        debug!(dialect = "sqlite", ?statement, "transaction control");
        run_blocking(self.conn.clone(), move |conn| control(conn, statement)).await
    }

    async fn run(&self, sql: &str, params: &[RowValues]) -> Result<RunResult, DualSqlError> {
        debug!(dialect = "sqlite", sql, params = params.len(), "run");
        let sql = sql.to_owned();
        let params = Params::convert(params);
        run_blocking(self.conn.clone(), move |conn| run(conn, &sql, &params)).await
    }

    async fn query(&self, sql: &str, params: &[RowValues]) -> Result<ResultSet, DualSqlError> {
        debug!(dialect = "sqlite", sql, params = params.len(), "query");
        let sql = sql.to_owned();
        let params = Params::convert(params);
        run_blocking(self.conn.clone(), move |conn| select(conn, &sql, &params)).await
    }

    async fn close(&self) -> Result<(), DualSqlError> {
        let shared = self.conn.clone();
        let taken = tokio::task::spawn_blocking(move || shared.blocking_lock().take())
            .await
            .map_err(|e| DualSqlError::join(&e))?;
        let Some(mut conn) = taken else {
            return Ok(());
        };

        tokio::task::spawn_blocking(move || {
            if !conn.is_autocommit() {
                warn!("closing sqlite database with an open transaction; rolling back");
                rollback_quietly(&mut conn);
            }
            conn.close().map_err(|(_, err)| DualSqlError::SqliteError(err))
        })
        .await
        .map_err(|e| DualSqlError::join(&e))??;

        tracing::info!(path = %self.path().display(), "sqlite database closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> Result<rusqlite::Connection, DualSqlError> {
        let mut conn = rusqlite::Connection::open_in_memory()?;
        execute_batch(
            &mut conn,
            "CREATE TABLE consultants (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL);",
        )?;
        Ok(conn)
    }

    #[test]
    fn insert_reports_rowid() -> Result<(), DualSqlError> {
        let mut conn = memory()?;
        let params = Params::convert(&[RowValues::Text("Ana".into())]);
        let first = run(&mut conn, "INSERT INTO consultants (name) VALUES (?)", &params)?;
        let second = run(&mut conn, "INSERT INTO consultants (name) VALUES (?)", &params)?;
        assert_eq!(first, RunResult { changes: 1, last_insert_id: Some(1) });
        assert_eq!(second.last_insert_id, Some(2));
        Ok(())
    }

    #[test]
    fn update_has_no_generated_id() -> Result<(), DualSqlError> {
        let mut conn = memory()?;
        run(&mut conn, "INSERT INTO consultants (name) VALUES ('a')", &Params::default())?;
        let res = run(&mut conn, "UPDATE consultants SET name = 'b'", &Params::default())?;
        assert_eq!(res, RunResult { changes: 1, last_insert_id: None });
        Ok(())
    }

    #[test]
    fn returning_rows_are_counted() -> Result<(), DualSqlError> {
        let mut conn = memory()?;
        let params = Params::convert(&[RowValues::Text("Bo".into())]);
        let res = run(
            &mut conn,
            "INSERT INTO consultants (name) VALUES (?) RETURNING id",
            &params,
        )?;
        assert_eq!(res, RunResult { changes: 1, last_insert_id: Some(1) });
        Ok(())
    }

    #[test]
    fn control_is_tolerant_and_rejects_nesting() -> Result<(), DualSqlError> {
        let mut conn = memory()?;
        control(&mut conn, ControlStatement::Commit)?;
        control(&mut conn, ControlStatement::Rollback)?;
        control(&mut conn, ControlStatement::Begin)?;
        assert!(matches!(
            control(&mut conn, ControlStatement::Begin),
            Err(DualSqlError::TransactionAlreadyStarted)
        ));
        assert!(!conn.is_autocommit());
        control(&mut conn, ControlStatement::Rollback)?;
        assert!(conn.is_autocommit());
        Ok(())
    }
}
