use std::collections::HashMap;

pub const DB_DIALECT: &str = "DB_DIALECT";
pub const DB_CLIENT: &str = "DB_CLIENT";
pub const DATABASE_URL: &str = "DATABASE_URL";
pub const POSTGRES_URL: &str = "POSTGRES_URL";
pub const PGHOST: &str = "PGHOST";
pub const PGPORT: &str = "PGPORT";
pub const PGUSER: &str = "PGUSER";
pub const PGPASSWORD: &str = "PGPASSWORD";
pub const PGDATABASE: &str = "PGDATABASE";
pub const SQLITE_DIR: &str = "SQLITE_DIR";
pub const SQLITE_FILE: &str = "SQLITE_FILE";
pub const DB_SSL: &str = "DB_SSL";
pub const PGSSL: &str = "PGSSL";
pub const PGSSLMODE: &str = "PGSSLMODE";
pub const DB_SSL_ACCEPT_INVALID_CERTS: &str = "DB_SSL_ACCEPT_INVALID_CERTS";
pub const PG_POOL_MAX: &str = "PG_POOL_MAX";
pub const PG_IDLE_TIMEOUT_MS: &str = "PG_IDLE_TIMEOUT_MS";

/// Point-in-time copy of the configuration variables the selector reads.
///
/// Blank values are treated as unset.
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    /// Capture the current process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_pairs(std::env::vars())
    }

    /// Build a snapshot from explicit pairs, e.g. in tests.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(_, v)| !v.trim().is_empty())
            .collect();
        Self { vars }
    }

    /// Override one variable, e.g. from a command-line flag.
    #[must_use]
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        let key = key.into();
        if value.trim().is_empty() {
            self.vars.remove(&key);
        } else {
            self.vars.insert(key, value);
        }
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// First of `keys` that is set.
    #[must_use]
    pub fn first_of(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| self.get(key))
    }

    #[must_use]
    pub fn is_set(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    /// `1`, `true`, `yes`, `on` and `require` count as enabled.
    #[must_use]
    pub fn flag(&self, keys: &[&str]) -> bool {
        self.first_of(keys).is_some_and(is_truthy)
    }
}

pub(crate) fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on" | "require"
    )
}
