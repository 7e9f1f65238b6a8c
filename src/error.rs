use thiserror::Error;

#[derive(Debug, Error)]
pub enum DualSqlError {
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error(transparent)]
    PoolErrorPostgres(#[from] deadpool_postgres::PoolError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Parameter conversion error: {0}")]
    ParameterError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    /// `BEGIN` issued while the call chain already holds a transaction.
    #[error("transaction already started")]
    TransactionAlreadyStarted,

    #[error("database handle is closed")]
    Closed,
}

impl DualSqlError {
    pub(crate) fn join(err: &tokio::task::JoinError) -> Self {
        DualSqlError::ExecutionError(format!("sqlite spawn_blocking join error: {err}"))
    }
}
