use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backend::{DialectBackend, PoolStatus};
use crate::config::PostgresSettings;
use crate::error::DualSqlError;
use crate::results::{ResultSet, RunResult};
use crate::statement::{ControlStatement, append_returning_id};
use crate::transaction::{PoolSource, TransactionManager};
use crate::types::{Dialect, RowValues};

use super::config::{build_pool, spawn_idle_reaper};
use super::params::Params;
use super::query::build_result_set_from_rows;

/// Execute one or more statements with no parameters.
///
/// # Errors
/// Returns the Postgres error if any statement fails.
pub async fn execute_batch(client: &Client, sql: &str) -> Result<(), DualSqlError> {
    client.batch_execute(sql).await?;
    Ok(())
}

/// Execute a parameterized statement and report changes plus any generated `id`.
///
/// INSERTs without a returning clause get `RETURNING id` appended. The prepared statement's
/// columns decide how it runs: statements that return rows report the row count as changes
/// and the first row's `id` as the generated key.
///
/// # Errors
/// Returns the Postgres error from preparing or executing the statement.
pub async fn run(
    client: &Client,
    sql: &str,
    params: &[RowValues],
) -> Result<RunResult, DualSqlError> {
    let sql = append_returning_id(sql);
    let converted = Params::convert(params);
    let stmt = client.prepare(&sql).await?;

    if !stmt.columns().is_empty() {
        let rows = client.query(&stmt, converted.as_refs()).await?;
        let result_set = build_result_set_from_rows(&rows)?;
        return Ok(RunResult {
            changes: result_set.rows_affected,
            last_insert_id: result_set.first_generated_id(),
        });
    }

    let changes = client.execute(&stmt, converted.as_refs()).await?;
    Ok(RunResult {
        changes: usize::try_from(changes).map_err(|e| {
            DualSqlError::ExecutionError(format!("row count {changes} out of range: {e}"))
        })?,
        last_insert_id: None,
    })
}

/// Execute a parameterized statement and collect its rows.
///
/// # Errors
/// Returns the Postgres error from preparing or executing the statement.
pub async fn select(
    client: &Client,
    sql: &str,
    params: &[RowValues],
) -> Result<ResultSet, DualSqlError> {
    let converted = Params::convert(params);
    let stmt = client.prepare(sql).await?;
    let rows = client.query(&stmt, converted.as_refs()).await?;
    build_result_set_from_rows(&rows)
}

/// Client/server backend: a connection pool plus call-chain transactions on top of it.
pub struct PostgresBackend {
    transactions: TransactionManager<PoolSource>,
    reaper: CancellationToken,
}

impl PostgresBackend {
    /// Build the pool and start the idle reaper. No connection is opened until first use.
    ///
    /// # Errors
    /// Returns configuration errors from the settings or pool construction.
    pub async fn connect(settings: &PostgresSettings) -> Result<Self, DualSqlError> {
        let pool = build_pool(settings)?;
        let reaper = CancellationToken::new();
        if let Some(idle) = settings.idle_timeout {
            spawn_idle_reaper(pool.clone(), idle, reaper.clone());
        }
        Ok(Self {
            transactions: TransactionManager::new(PoolSource::new(pool)),
            reaper,
        })
    }

    #[must_use]
    pub fn pool(&self) -> &Pool {
        self.transactions.source().pool()
    }
}

impl std::fmt::Debug for PostgresBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresBackend")
            .field("pool", &self.pool().status())
            .field("closed", &self.transactions.is_closed())
            .finish()
    }
}

#[async_trait]
impl DialectBackend for PostgresBackend {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn execute(&self, sql: &str) -> Result<(), DualSqlError> {
        let route = self.transactions.route().await?;
        debug!(dialect = "postgres", leased = route.is_leased(), sql, "execute");
        execute_batch(route.conn(), sql).await
    }

    async fn control(&self, statement: ControlStatement) -> Result<(), DualSqlError> {
        debug!(dialect = "postgres", ?statement, "transaction control");
        self.transactions.control(statement).await
    }

    async fn run(&self, sql: &str, params: &[RowValues]) -> Result<RunResult, DualSqlError> {
        let route = self.transactions.route().await?;
        debug!(dialect = "postgres", leased = route.is_leased(), sql, params = params.len(), "run");
        run(route.conn(), sql, params).await
    }

    async fn query(&self, sql: &str, params: &[RowValues]) -> Result<ResultSet, DualSqlError> {
        let route = self.transactions.route().await?;
        debug!(dialect = "postgres", leased = route.is_leased(), sql, params = params.len(), "query");
        select(route.conn(), sql, params).await
    }

    async fn close(&self) -> Result<(), DualSqlError> {
        if self.transactions.is_closed() {
            return Ok(());
        }
        self.reaper.cancel();
        self.transactions.close().await;
        self.pool().close();
        info!("postgres pool closed");
        Ok(())
    }

    fn pool_status(&self) -> Option<PoolStatus> {
        let status = self.pool().status();
        Some(PoolStatus {
            max_size: status.max_size,
            size: status.size,
            available: status.available,
            leased: status.size.saturating_sub(status.available),
        })
    }

    fn fail_next_begin_for_tests(&self) {
        self.transactions.fail_next_begin_for_tests();
    }
}
