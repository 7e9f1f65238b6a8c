use async_trait::async_trait;
use deadpool_postgres::{Object, Pool};

use crate::error::DualSqlError;

/// Where leased connections come from and how control commands are sent on them.
#[async_trait]
pub trait LeaseSource: Send + Sync + 'static {
    type Conn: Send + Sync + 'static;

    /// Check a connection out of the pool.
    async fn acquire(&self) -> Result<Self::Conn, DualSqlError>;

    /// Send a parameterless command such as `BEGIN` on `conn`.
    async fn command(&self, conn: &Self::Conn, sql: &str) -> Result<(), DualSqlError>;

    /// Give up a connection whose transaction state is unknown instead of returning it to the
    /// pool.
    fn discard(&self, conn: Self::Conn) {
        drop(conn);
    }
}

/// Lease source backed by the Postgres pool.
#[derive(Clone)]
pub struct PoolSource {
    pool: Pool,
}

impl PoolSource {
    #[must_use]
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

#[async_trait]
impl LeaseSource for PoolSource {
    type Conn = Object;

    async fn acquire(&self) -> Result<Object, DualSqlError> {
        Ok(self.pool.get().await?)
    }

    async fn command(&self, conn: &Object, sql: &str) -> Result<(), DualSqlError> {
        conn.batch_execute(sql).await?;
        Ok(())
    }

    fn discard(&self, conn: Object) {
        drop(Object::take(conn));
    }
}
