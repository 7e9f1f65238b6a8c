//! Convenient imports for common functionality.
//!
//! This module re-exports the types most callers need to open a database and run
//! statements against it.

pub use crate::backend::PoolStatus;
pub use crate::config::{BackendSelector, BackendSettings, EnvSnapshot, TlsPolicy};
pub use crate::db::Database;
pub use crate::error::DualSqlError;
pub use crate::results::{CustomDbRow, ResultSet, RunResult};
pub use crate::translation::translate_placeholders;
pub use crate::types::{Dialect, RowValues};
