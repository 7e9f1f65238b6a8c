//! Backend selection: which engine to open, and how to reach it.
//!
//! Resolution order:
//! 1. an explicit `DB_DIALECT` naming either engine (any accepted alias) wins;
//! 2. otherwise a connection string or `PGHOST` selects Postgres;
//! 3. otherwise the embedded `SQLite` file.
//!
//! Nothing here opens a connection.

pub mod env;
mod ssl;

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::error::DualSqlError;
use crate::types::Dialect;

pub use env::EnvSnapshot;
pub use ssl::{TlsPolicy, resolve_tls_policy, strip_ssl_mode, url_ssl_mode};

use env::{
    DATABASE_URL, DB_CLIENT, DB_DIALECT, PG_IDLE_TIMEOUT_MS, PG_POOL_MAX, PGDATABASE, PGHOST,
    PGPASSWORD, PGPORT, PGUSER, POSTGRES_URL, SQLITE_DIR, SQLITE_FILE,
};

pub const DEFAULT_SQLITE_FILE: &str = "database.sqlite";
pub const DEFAULT_MOUNT_PATH: &str = "/data";
pub const DEFAULT_PG_PORT: u16 = 5432;
pub const DEFAULT_PG_USER: &str = "postgres";
pub const DEFAULT_POOL_MAX: usize = 10;
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything needed to open one backend.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendSettings {
    Sqlite(SqliteSettings),
    Postgres(PostgresSettings),
}

impl BackendSettings {
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        match self {
            BackendSettings::Sqlite(_) => Dialect::Sqlite,
            BackendSettings::Postgres(_) => Dialect::Postgres,
        }
    }

    /// Settings for a `SQLite` file at `path`.
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        BackendSettings::Sqlite(SqliteSettings { path: path.into() })
    }

    /// Settings for a Postgres connection string with default pool sizing and no TLS.
    pub fn postgres_url(url: impl Into<String>) -> Self {
        BackendSettings::Postgres(PostgresSettings {
            connection: PgConnection::Url(url.into()),
            tls: TlsPolicy::Disabled,
            pool_max_size: DEFAULT_POOL_MAX,
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteSettings {
    /// Database file; its parent directory is created on open.
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostgresSettings {
    pub connection: PgConnection,
    pub tls: TlsPolicy,
    pub pool_max_size: usize,
    /// Pooled connections idle for longer are closed; `None` keeps them.
    pub idle_timeout: Option<Duration>,
}

/// Where the Postgres server is.
#[derive(Clone, PartialEq, Eq)]
pub enum PgConnection {
    Url(String),
    Params {
        host: String,
        port: u16,
        user: String,
        password: Option<String>,
        dbname: String,
    },
}

// Manual Debug so passwords never reach logs.
impl std::fmt::Debug for PgConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PgConnection::Url(_) => f.debug_tuple("Url").field(&"<redacted>").finish(),
            PgConnection::Params {
                host,
                port,
                user,
                dbname,
                ..
            } => f
                .debug_struct("Params")
                .field("host", host)
                .field("port", port)
                .field("user", user)
                .field("dbname", dbname)
                .finish_non_exhaustive(),
        }
    }
}

/// Resolves [`BackendSettings`] from an [`EnvSnapshot`].
#[derive(Debug, Clone)]
pub struct BackendSelector {
    mount_path: PathBuf,
    process_dir: PathBuf,
}

impl Default for BackendSelector {
    fn default() -> Self {
        Self {
            mount_path: PathBuf::from(DEFAULT_MOUNT_PATH),
            process_dir: process_dir(),
        }
    }
}

impl BackendSelector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the well-known mount path probed for the `SQLite` file.
    #[must_use]
    pub fn with_mount_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.mount_path = path.into();
        self
    }

    /// Replace the fallback directory used when neither override nor mount applies.
    #[must_use]
    pub fn with_process_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.process_dir = path.into();
        self
    }

    /// Pick the backend and its connection parameters.
    ///
    /// # Errors
    /// Returns [`DualSqlError::ConfigError`] when Postgres is selected without a connection
    /// string or host, or when a numeric setting does not parse.
    pub fn resolve(&self, env: &EnvSnapshot) -> Result<BackendSettings, DualSqlError> {
        let settings = match self.select_dialect(env) {
            Dialect::Sqlite => BackendSettings::Sqlite(self.sqlite_settings(env)),
            Dialect::Postgres => BackendSettings::Postgres(postgres_settings(env)?),
        };
        match &settings {
            BackendSettings::Sqlite(s) => {
                info!(dialect = "sqlite", path = %s.path.display(), "database backend selected");
            }
            BackendSettings::Postgres(p) => {
                info!(
                    dialect = "postgres",
                    tls = ?p.tls,
                    pool_max_size = p.pool_max_size,
                    "database backend selected"
                );
            }
        }
        Ok(settings)
    }

    /// The dialect alone, following the three-step priority.
    #[must_use]
    pub fn select_dialect(&self, env: &EnvSnapshot) -> Dialect {
        if let Some(raw) = env.first_of(&[DB_DIALECT, DB_CLIENT]) {
            match Dialect::parse(raw) {
                Some(dialect) => return dialect,
                None => warn!(value = raw, "ignoring unrecognised database dialect override"),
            }
        }
        if env.first_of(&[DATABASE_URL, POSTGRES_URL]).is_some() || env.is_set(PGHOST) {
            Dialect::Postgres
        } else {
            Dialect::Sqlite
        }
    }

    fn sqlite_settings(&self, env: &EnvSnapshot) -> SqliteSettings {
        let dir = match env.get(SQLITE_DIR) {
            Some(dir) => PathBuf::from(dir),
            None if self.mount_path.exists() => self.mount_path.clone(),
            None => self.process_dir.clone(),
        };
        let file = env.get(SQLITE_FILE).unwrap_or(DEFAULT_SQLITE_FILE);
        SqliteSettings {
            path: dir.join(file),
        }
    }
}

fn postgres_settings(env: &EnvSnapshot) -> Result<PostgresSettings, DualSqlError> {
    let url = env.first_of(&[DATABASE_URL, POSTGRES_URL]);
    let connection = match (url, env.get(PGHOST)) {
        (Some(url), _) => PgConnection::Url(url.to_string()),
        (None, Some(host)) => {
            let port = parse_number(env, PGPORT)?.unwrap_or(DEFAULT_PG_PORT);
            let user = env.get(PGUSER).unwrap_or(DEFAULT_PG_USER).to_string();
            let dbname = env.get(PGDATABASE).map_or_else(|| user.clone(), str::to_string);
            PgConnection::Params {
                host: host.to_string(),
                port,
                user,
                password: env.get(PGPASSWORD).map(str::to_string),
                dbname,
            }
        }
        (None, None) => {
            return Err(DualSqlError::ConfigError(format!(
                "postgres selected but neither {DATABASE_URL} nor {PGHOST} is set"
            )));
        }
    };

    let pool_max_size = parse_number::<usize>(env, PG_POOL_MAX)?.unwrap_or(DEFAULT_POOL_MAX);
    if pool_max_size == 0 {
        return Err(DualSqlError::ConfigError(format!(
            "{PG_POOL_MAX} must be at least 1"
        )));
    }
    let idle_timeout = match parse_number::<u64>(env, PG_IDLE_TIMEOUT_MS)? {
        Some(0) => None,
        Some(ms) => Some(Duration::from_millis(ms)),
        None => Some(DEFAULT_IDLE_TIMEOUT),
    };

    Ok(PostgresSettings {
        tls: resolve_tls_policy(env, url),
        connection,
        pool_max_size,
        idle_timeout,
    })
}

fn parse_number<T: std::str::FromStr>(
    env: &EnvSnapshot,
    key: &str,
) -> Result<Option<T>, DualSqlError> {
    env.get(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|_| {
                DualSqlError::ConfigError(format!("{key} must be a non-negative integer, got {raw:?}"))
            })
        })
        .transpose()
}

fn process_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}
