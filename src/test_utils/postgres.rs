use postgresql_embedded::PostgreSQL;

use super::SHARED_RUNTIME;

/// A running embedded `PostgreSQL` instance.
pub struct EmbeddedPostgres {
    pub postgresql: PostgreSQL,
    pub port: u16,
    /// Connection string for the provisioned database.
    pub database_url: String,
}

/// Download (bundled), start and provision an embedded `PostgreSQL` with database `dbname`.
///
/// # Errors
/// Returns an error if the server cannot be set up or started, if the database cannot be
/// created, or if the post-start connectivity check fails.
pub fn setup_postgres_embedded(
    dbname: &str,
) -> Result<EmbeddedPostgres, Box<dyn std::error::Error>> {
    SHARED_RUNTIME.block_on(async {
        let mut postgresql = PostgreSQL::default();
        postgresql.setup().await?;
        postgresql.start().await?;
        postgresql.create_database(dbname).await?;

        let settings = postgresql.settings();
        let port = settings.port;
        let database_url = format!(
            "postgres://{}:{}@{}:{}/{}",
            settings.username, settings.password, settings.host, port, dbname
        );

        let (client, connection) =
            tokio_postgres::connect(&database_url, tokio_postgres::NoTls).await?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::debug!(error = %err, "embedded postgres check connection ended");
            }
        });
        client.simple_query("SELECT 1").await?;
        tracing::info!(port, "embedded postgres ready");

        Ok(EmbeddedPostgres {
            postgresql,
            port,
            database_url,
        })
    })
}

/// Stop a previously started embedded `PostgreSQL` instance.
pub fn stop_postgres_embedded(postgres: EmbeddedPostgres) {
    let EmbeddedPostgres { postgresql, .. } = postgres;
    SHARED_RUNTIME.block_on(async move {
        if let Err(err) = postgresql.stop().await {
            tracing::warn!(error = %err, "failed to stop embedded postgres");
        }
    });
}
