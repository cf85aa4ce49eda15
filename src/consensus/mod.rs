//! Consensus module - Block structure, sortition, validation, and rewards

mod block;
mod rewards;
mod sortition;
mod validation;

pub use block::*;
pub use rewards::*;
pub use sortition::*;
pub use validation::*;
