use async_trait::async_trait;
use serde::Serialize;

use crate::error::DualSqlError;
use crate::results::{ResultSet, RunResult};
use crate::statement::ControlStatement;
use crate::types::{Dialect, RowValues};

/// The statement contract both engines implement.
///
/// SQL reaching these methods is already in the backend's own placeholder syntax; the
/// [`crate::Database`] facade does the translation.
#[async_trait]
pub trait DialectBackend: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Run SQL without parameters for its side effects.
    async fn execute(&self, sql: &str) -> Result<(), DualSqlError>;

    /// Apply `BEGIN`, `COMMIT` or `ROLLBACK` for the current call chain.
    async fn control(&self, statement: ControlStatement) -> Result<(), DualSqlError>;

    /// Run a parameterized statement, reporting changes and any generated key.
    async fn run(&self, sql: &str, params: &[RowValues]) -> Result<RunResult, DualSqlError>;

    /// Run a parameterized statement and collect its rows.
    async fn query(&self, sql: &str, params: &[RowValues]) -> Result<ResultSet, DualSqlError>;

    /// Roll back anything still open and release every connection.
    async fn close(&self) -> Result<(), DualSqlError>;

    /// Pool occupancy, for backends that pool.
    fn pool_status(&self) -> Option<PoolStatus> {
        None
    }

    /// Make the next native begin command fail. Only the pooled backend honours this.
    #[doc(hidden)]
    fn fail_next_begin_for_tests(&self) {}
}

/// Snapshot of the client-server connection pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub max_size: usize,
    /// Connections currently open, idle or leased.
    pub size: usize,
    /// Idle connections ready to hand out.
    pub available: usize,
    /// Connections checked out right now.
    pub leased: usize,
}
