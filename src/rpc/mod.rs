//! JSON-RPC API Module
//!
//! Provides HTTP interface for external applications to submit transfers
//! and read the replayed ledger.

mod methods;
mod server;

pub use methods::*;
pub use server::*;
