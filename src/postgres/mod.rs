// PostgreSQL backend, split like the SQLite one:
// - config: driver config, pool construction, idle reaper
// - tls: rustls client configs for the TLS policies
// - params: binding RowValues to Postgres parameters
// - query: result extraction
// - executor: statement execution and the backend itself

pub mod config;
pub mod executor;
pub mod params;
pub mod query;
pub mod tls;

pub use executor::{PostgresBackend, execute_batch, run, select};
pub use params::Params;
pub use query::build_result_set_from_rows;
