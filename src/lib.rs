//! Slot Lottery Ledger Core Library
//!
//! A small decentralized ledger: a gossiping peer overlay that floods signed
//! transactions and sortition-elected blocks, a lottery that grants block
//! production to the privileged keys fixed at genesis, and a fork choice
//! that rebuilds balances by replaying the canonical chain.

pub mod consensus;
pub mod crypto;
pub mod validation;
pub mod storage;
pub mod p2p;
pub mod node;
pub mod rpc;

/// Protocol constants
pub mod constants {
    use std::time::Duration;

    /// Starting balance of every privileged account, and the scale factor
    /// applied to draw values so both live in comparable ranges
    pub const PREMIUM_ACCOUNT: u64 = 1_000_000;

    /// Number of ring successors a node dials when it joins
    pub const FAN_OUT: usize = 10;

    /// Default slot length in milliseconds
    pub const DEFAULT_SLOT_LENGTH_MS: u64 = 1_000;

    /// Upper bound on blocks buffered while waiting for their parent
    pub const MAX_ORPHANS: usize = 1_024;

    /// How long a joining node waits for the init info reply
    pub const BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(5);

    /// Default peer-to-peer listen address (port 0 picks a free port)
    pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:0";

    /// Chain name used in logs and RPC info
    pub const CHAIN_NAME: &str = "slot-lottery";
}
