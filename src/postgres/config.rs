use std::time::Duration;

use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use tokio_postgres::config::SslMode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{PgConnection, PostgresSettings, TlsPolicy, strip_ssl_mode};
use crate::error::DualSqlError;

use super::tls::make_connector;

/// Driver configuration for the selected connection parameters.
///
/// # Errors
/// Returns `DualSqlError::ConfigError` if the connection string does not parse.
pub fn pg_config(
    connection: &PgConnection,
    tls: TlsPolicy,
) -> Result<tokio_postgres::Config, DualSqlError> {
    let mut cfg = match connection {
        PgConnection::Url(url) => strip_ssl_mode(url)
            .parse::<tokio_postgres::Config>()
            .map_err(|e| {
                DualSqlError::ConfigError(format!("invalid postgres connection string: {e}"))
            })?,
        PgConnection::Params {
            host,
            port,
            user,
            password,
            dbname,
        } => {
            let mut cfg = tokio_postgres::Config::new();
            cfg.host(host.as_str())
                .port(*port)
                .user(user.as_str())
                .dbname(dbname.as_str());
            if let Some(password) = password {
                cfg.password(password.as_str());
            }
            cfg
        }
    };
    cfg.ssl_mode(if tls.is_enabled() {
        SslMode::Require
    } else {
        SslMode::Disable
    });
    Ok(cfg)
}

/// Build the connection pool. Connections are opened lazily on first use.
///
/// # Errors
/// Returns `DualSqlError::ConfigError` for unparsable settings or
/// `DualSqlError::ConnectionError` if the pool cannot be built.
pub fn build_pool(settings: &PostgresSettings) -> Result<Pool, DualSqlError> {
    let pg_cfg = pg_config(&settings.connection, settings.tls)?;
    let mut manager_cfg = ManagerConfig::default();
    manager_cfg.recycling_method = RecyclingMethod::Fast;

    let manager = match settings.tls {
        TlsPolicy::Disabled => Manager::from_config(pg_cfg, NoTls, manager_cfg),
        policy => Manager::from_config(pg_cfg, make_connector(policy)?, manager_cfg),
    };

    let pool = Pool::builder(manager)
        .max_size(settings.pool_max_size)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| {
            DualSqlError::ConnectionError(format!("Failed to create Postgres pool: {e}"))
        })?;

    info!(
        max_size = settings.pool_max_size,
        tls = ?settings.tls,
        "postgres pool created"
    );
    Ok(pool)
}

/// Close pooled connections left idle for longer than `idle`, until `stop` is cancelled.
pub fn spawn_idle_reaper(pool: Pool, idle: Duration, stop: CancellationToken) {
    let period = (idle / 2).max(Duration::from_millis(250));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                () = stop.cancelled() => break,
                _ = ticker.tick() => {
                    let reaped = pool.retain(|_, metrics| metrics.last_used() < idle);
                    if !reaped.removed.is_empty() {
                        debug!(closed = reaped.removed.len(), "closed idle postgres connections");
                    }
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discrete_params_map_onto_driver_config() -> Result<(), DualSqlError> {
        let cfg = pg_config(
            &PgConnection::Params {
                host: "db.internal".into(),
                port: 6543,
                user: "app".into(),
                password: Some("pw".into()),
                dbname: "sales".into(),
            },
            TlsPolicy::Verified,
        )?;
        assert_eq!(cfg.get_user(), Some("app"));
        assert_eq!(cfg.get_dbname(), Some("sales"));
        assert_eq!(cfg.get_ports(), &[6543]);
        assert_eq!(cfg.get_ssl_mode(), SslMode::Require);
        Ok(())
    }

    #[test]
    fn verify_modes_in_url_do_not_break_parsing() -> Result<(), DualSqlError> {
        let url = PgConnection::Url("postgres://app:pw@db:5432/sales?sslmode=verify-full".into());
        let cfg = pg_config(&url, TlsPolicy::Verified)?;
        assert_eq!(cfg.get_dbname(), Some("sales"));
        assert_eq!(cfg.get_ssl_mode(), SslMode::Require);

        let plain = pg_config(&url, TlsPolicy::Disabled)?;
        assert_eq!(plain.get_ssl_mode(), SslMode::Disable);
        Ok(())
    }

    #[tokio::test]
    async fn pool_is_lazy() -> Result<(), DualSqlError> {
        let mut settings = match crate::config::BackendSettings::postgres_url("postgres://u@127.0.0.1:1/none") {
            crate::config::BackendSettings::Postgres(pg) => pg,
            crate::config::BackendSettings::Sqlite(_) => unreachable!(),
        };
        settings.pool_max_size = 2;
        let pool = build_pool(&settings)?;
        let status = pool.status();
        assert_eq!(status.max_size, 2);
        assert_eq!(status.size, 0);
        Ok(())
    }
}
