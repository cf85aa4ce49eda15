//! Validation module - signed transactions

mod transaction;

pub use transaction::*;
