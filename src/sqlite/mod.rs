// SQLite module - the embedded, single-file backend.
//
// - config: opening the database file
// - connection: the one shared connection handle and its blocking bridge
// - params: parameter conversion between middleware and SQLite values
// - query: result extraction and building
// - executor: statement execution and the backend contract

pub mod config;
pub mod connection;
pub mod executor;
pub mod params;
pub mod query;

pub use config::SqliteBackend;
pub use params::Params;
pub use query::build_result_set;
