//! One statement syntax over an embedded `SQLite` file or a pooled `PostgreSQL` server.
//!
//! Callers write `?` placeholders and plain `BEGIN`/`COMMIT`/`ROLLBACK`; the [`Database`]
//! facade rewrites placeholders for Postgres, emulates generated-key retrieval, and binds
//! Postgres transactions to the current call chain (see [`Database::scope`]).
//!
//! The backend is chosen once, at startup, by [`config::BackendSelector`].

pub mod backend;
pub mod config;
pub mod db;
pub mod error;
pub mod postgres;
pub mod prelude;
pub mod results;
pub mod sqlite;
pub mod statement;
pub mod transaction;
pub mod translation;
pub mod types;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use backend::{DialectBackend, PoolStatus};
pub use config::{BackendSelector, BackendSettings, TlsPolicy};
pub use db::Database;
pub use error::DualSqlError;
pub use results::{CustomDbRow, ResultSet, RunResult};
pub use translation::{count_placeholders, executable_ranges, translate_placeholders};
pub use types::{Dialect, RowValues};
