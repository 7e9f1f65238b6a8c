use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::backend::{DialectBackend, PoolStatus};
use crate::config::{BackendSelector, BackendSettings, EnvSnapshot};
use crate::error::DualSqlError;
use crate::postgres::PostgresBackend;
use crate::results::{CustomDbRow, RunResult};
use crate::sqlite::SqliteBackend;
use crate::statement::ControlStatement;
use crate::transaction;
use crate::translation::translate_placeholders;
use crate::types::{Dialect, RowValues};

/// Dialect-blind access to whichever backend was selected at startup.
///
/// Statements use `?` placeholders and may be the control statements `BEGIN`,
/// `BEGIN TRANSACTION`, `COMMIT` and `ROLLBACK`. On Postgres a transaction belongs to the
/// call chain that began it. Without a scope that chain is the current task; use
/// [`Database::scope`] (or [`Database::transaction`], which scopes for you) when the work
/// spans spawned tasks or should roll back once the future finishes:
///
/// ```rust,no_run
/// use dual_sql::prelude::*;
///
/// # async fn demo() -> Result<(), DualSqlError> {
/// let db = Database::from_env().await?;
/// db.execute("CREATE TABLE IF NOT EXISTS consultants (id INTEGER PRIMARY KEY, name TEXT)").await?;
///
/// Database::scope(async {
///     db.execute("BEGIN").await?;
///     let res = db.run("INSERT INTO consultants (name) VALUES (?)", &[RowValues::from("Ana")]).await?;
///     db.execute("COMMIT").await?;
///     println!("new id: {:?}", res.last_insert_id);
///     Ok::<_, DualSqlError>(())
/// })
/// .await?;
///
/// let everyone = db.all("SELECT id, name FROM consultants", &[]).await?;
/// # let _ = everyone;
/// db.close().await
/// # }
/// ```
pub struct Database {
    backend: Arc<dyn DialectBackend>,
    closed: AtomicBool,
}

impl Database {
    /// Open the backend described by `settings`.
    ///
    /// # Errors
    /// Returns configuration or connection errors from the backend.
    pub async fn connect(settings: &BackendSettings) -> Result<Self, DualSqlError> {
        let backend: Arc<dyn DialectBackend> = match settings {
            BackendSettings::Sqlite(sqlite) => Arc::new(SqliteBackend::open(sqlite).await?),
            BackendSettings::Postgres(pg) => Arc::new(PostgresBackend::connect(pg).await?),
        };
        info!(dialect = %backend.dialect(), "database ready");
        Ok(Self::from_backend(backend))
    }

    /// Select and open a backend from the process environment.
    ///
    /// # Errors
    /// Returns `DualSqlError::ConfigError` when the selected backend is missing required
    /// settings, or the error from opening it.
    pub async fn from_env() -> Result<Self, DualSqlError> {
        let settings = BackendSelector::new().resolve(&EnvSnapshot::from_env())?;
        Self::connect(&settings).await
    }

    #[must_use]
    pub fn from_backend(backend: Arc<dyn DialectBackend>) -> Self {
        Self {
            backend,
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.backend.dialect()
    }

    /// Run SQL with no parameters for its side effects. Control statements drive the
    /// call chain's transaction.
    ///
    /// # Errors
    /// Returns [`DualSqlError::Closed`] after [`Self::close`], transaction state errors, or the
    /// backend error unchanged.
    pub async fn execute(&self, sql: &str) -> Result<(), DualSqlError> {
        self.ensure_open()?;
        if let Some(statement) = ControlStatement::parse(sql) {
            return self.backend.control(statement).await;
        }
        self.backend.execute(&self.translate(sql)).await
    }

    /// Run a parameterized statement; reports affected rows and the generated id of an INSERT.
    ///
    /// # Errors
    /// See [`Self::execute`].
    pub async fn run(&self, sql: &str, params: &[RowValues]) -> Result<RunResult, DualSqlError> {
        self.ensure_open()?;
        if let Some(statement) = ControlStatement::parse(sql) {
            self.backend.control(statement).await?;
            return Ok(RunResult::default());
        }
        self.backend.run(&self.translate(sql), params).await
    }

    /// First row of the result, if any.
    ///
    /// # Errors
    /// See [`Self::execute`].
    pub async fn get(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<Option<CustomDbRow>, DualSqlError> {
        self.ensure_open()?;
        if let Some(statement) = ControlStatement::parse(sql) {
            self.backend.control(statement).await?;
            return Ok(None);
        }
        let result_set = self.backend.query(&self.translate(sql), params).await?;
        Ok(result_set.into_first())
    }

    /// Every row of the result in order; empty when nothing matches.
    ///
    /// # Errors
    /// See [`Self::execute`].
    pub async fn all(&self, sql: &str, params: &[RowValues]) -> Result<Vec<CustomDbRow>, DualSqlError> {
        self.ensure_open()?;
        if let Some(statement) = ControlStatement::parse(sql) {
            self.backend.control(statement).await?;
            return Ok(Vec::new());
        }
        let result_set = self.backend.query(&self.translate(sql), params).await?;
        Ok(result_set.results)
    }

    /// Roll back open transactions and release every connection. Later calls fail with
    /// [`DualSqlError::Closed`]; closing twice is a no-op.
    ///
    /// # Errors
    /// Returns the backend error from closing its handle.
    pub async fn close(&self) -> Result<(), DualSqlError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("database already closed");
            return Ok(());
        }
        self.backend.close().await
    }

    /// Pool occupancy for the Postgres backend; `None` for `SQLite`.
    #[must_use]
    pub fn pool_status(&self) -> Option<PoolStatus> {
        self.backend.pool_status()
    }

    /// Run `fut` as one call chain. Transactions begun inside stay bound to it, and a
    /// transaction still open when it finishes is rolled back.
    pub async fn scope<F>(fut: F) -> F::Output
    where
        F: Future,
    {
        transaction::scope(fut).await
    }

    /// Run `f` inside `BEGIN` ... `COMMIT`, rolling back if it returns an error.
    ///
    /// # Errors
    /// Returns the error from `f`, or from `BEGIN`/`COMMIT`. A failed rollback is logged and
    /// does not replace the error from `f`.
    pub async fn transaction<'a, T, F, Fut>(&'a self, f: F) -> Result<T, DualSqlError>
    where
        F: FnOnce(&'a Database) -> Fut,
        Fut: Future<Output = Result<T, DualSqlError>>,
    {
        transaction::scope(async move {
            self.execute("BEGIN").await?;
            match f(self).await {
                Ok(value) => {
                    self.execute("COMMIT").await?;
                    Ok(value)
                }
                Err(err) => {
                    if let Err(rollback_err) = self.execute("ROLLBACK").await {
                        warn!(error = %rollback_err, "rollback after failed transaction body failed");
                    }
                    Err(err)
                }
            }
        })
        .await
    }

    #[doc(hidden)]
    pub fn fail_next_begin_for_tests(&self) {
        self.backend.fail_next_begin_for_tests();
    }

    fn translate<'s>(&self, sql: &'s str) -> Cow<'s, str> {
        translate_placeholders(sql, self.dialect())
    }

    fn ensure_open(&self) -> Result<(), DualSqlError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(DualSqlError::Closed)
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("dialect", &self.dialect())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}
