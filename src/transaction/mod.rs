//! Call-chain-scoped transactions over a connection pool.
//!
//! A call chain is one logical operation, established with [`scope`]. Within it, `BEGIN`
//! leases a pooled connection and binds it to the chain, so later statements in the same
//! chain run inside that transaction while concurrent chains keep using the pool. Outside
//! any scope each task is its own chain.

mod context;
mod lease;
mod manager;
mod source;

pub use context::{AmbientChains, CallChain, current, scope};
pub use lease::Lease;
pub use manager::{LeaseSlot, Route, TransactionManager};
pub use source::{LeaseSource, PoolSource};
