//! Node module - configuration, genesis founding, slot clock and runtime

mod client;
mod config;
mod genesis;
mod runtime;
mod slot;

pub use client::*;
pub use config::*;
pub use genesis::*;
pub use runtime::*;
pub use slot::*;
