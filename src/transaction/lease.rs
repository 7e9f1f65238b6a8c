use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::warn;

use crate::error::DualSqlError;

use super::source::LeaseSource;

/// A pooled connection with an open transaction, bound to one call chain.
///
/// Dropping a lease that was never finished rolls it back on a spawned task before the
/// connection goes back to the pool.
pub struct Lease<S: LeaseSource> {
    conn: Option<S::Conn>,
    source: Arc<S>,
}

impl<S: LeaseSource> Lease<S> {
    pub(crate) fn new(conn: S::Conn, source: Arc<S>) -> Self {
        Self {
            conn: Some(conn),
            source,
        }
    }

    pub(crate) fn conn_mut(&mut self) -> Option<&mut S::Conn> {
        self.conn.as_mut()
    }

    /// Send the terminal command and release the connection whatever the outcome.
    ///
    /// A connection whose terminal command failed is discarded rather than pooled.
    pub(crate) async fn finish(mut self, sql: &str) -> Result<(), DualSqlError> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        let outcome = self.source.command(&conn, sql).await;
        match outcome {
            Ok(()) => drop(conn),
            Err(_) => self.source.discard(conn),
        }
        outcome
    }
}

impl<S: LeaseSource> Drop for Lease<S> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        warn!("transaction abandoned without COMMIT or ROLLBACK; rolling back");
        let source = Arc::clone(&self.source);
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    match source.command(&conn, "ROLLBACK").await {
                        Ok(()) => drop(conn),
                        Err(err) => {
                            warn!(error = %err, "rollback of abandoned transaction failed");
                            source.discard(conn);
                        }
                    }
                });
            }
            Err(_) => source.discard(conn),
        }
    }
}
