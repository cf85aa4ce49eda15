//! Cryptography module - BLAKE3 digests, SHA-256 draw hashing, Schnorr keys

mod hash;
mod schnorr;

pub use hash::*;
pub use schnorr::*;
