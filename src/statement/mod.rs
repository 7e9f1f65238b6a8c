//! Text-level classification of statements before they reach a driver.

mod control;
mod insert_key;

pub use control::ControlStatement;
pub use insert_key::{append_returning_id, has_returning, is_insert, needs_returning_id};
