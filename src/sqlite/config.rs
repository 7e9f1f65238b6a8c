use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::config::SqliteSettings;
use crate::error::DualSqlError;

use super::connection::SharedSqliteConnection;

/// Embedded backend: one persistent connection to a database file.
pub struct SqliteBackend {
    pub(crate) conn: SharedSqliteConnection,
    path: PathBuf,
}

impl SqliteBackend {
    /// Open (creating if needed) the database file and its parent directory.
    ///
    /// # Errors
    /// Returns `DualSqlError::ConnectionError` if the directory cannot be created, or the
    /// `SQLite` error if opening the file or applying pragmas fails.
    pub async fn open(settings: &SqliteSettings) -> Result<Self, DualSqlError> {
        let path = settings.path.clone();
        let open_path = path.clone();
        let conn = tokio::task::spawn_blocking(move || open_connection(&open_path))
            .await
            .map_err(|e| DualSqlError::join(&e))??;

        info!(path = %path.display(), "sqlite database opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            path,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn open_connection(path: &Path) -> Result<rusqlite::Connection, DualSqlError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| {
            DualSqlError::ConnectionError(format!(
                "failed to create sqlite directory {}: {e}",
                dir.display()
            ))
        })?;
    }
    let conn = rusqlite::Connection::open(path)?;
    let journal_mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    if !journal_mode.eq_ignore_ascii_case("wal") {
        tracing::warn!(journal_mode, "sqlite did not switch to WAL");
    }
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(conn)
}
