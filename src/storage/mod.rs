//! Storage module - in-memory ledger, transaction pool and chain store

mod chain;
mod ledger;
mod pool;

pub use chain::*;
pub use ledger::*;
pub use pool::*;
