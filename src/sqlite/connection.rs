use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::DualSqlError;

/// The single connection every statement goes through. `None` once closed.
pub type SharedSqliteConnection = Arc<Mutex<Option<rusqlite::Connection>>>;

/// Run synchronous `rusqlite` work on the blocking pool, holding the connection lock.
///
/// # Errors
/// Returns [`DualSqlError::Closed`] after close, the callback's own error, or an
/// execution error if the blocking task panicked.
pub(crate) async fn run_blocking<F, R>(
    conn: SharedSqliteConnection,
    func: F,
) -> Result<R, DualSqlError>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, DualSqlError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.blocking_lock();
        let raw = guard.as_mut().ok_or(DualSqlError::Closed)?;
        func(raw)
    })
    .await
    .map_err(|e| DualSqlError::join(&e))?
}
