//! Block producer rewards
//!
//! Rewards are not minted by a coinbase. They are credited to the block
//! sender while the canonical chain is replayed, so they are a pure
//! function of the chain and the genesis schedule.

use serde::{Deserialize, Serialize};

/// Reward schedule fixed at genesis
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSchedule {
    /// Flat reward for every non-genesis canonical block
    #[serde(default)]
    pub per_block: u64,
    /// Extra reward per transaction the block applied successfully
    #[serde(default)]
    pub per_transaction: u64,
}

impl RewardSchedule {
    /// Create a schedule
    pub fn new(per_block: u64, per_transaction: u64) -> Self {
        Self {
            per_block,
            per_transaction,
        }
    }

    /// Reward for a block that applied `applied` transactions
    ///
    /// This is a pure, deterministic function that saturates rather than
    /// overflowing.
    pub fn block_reward(&self, applied: u64) -> u64 {
        self.per_block
            .saturating_add(self.per_transaction.saturating_mul(applied))
    }

    /// Whether replay credits nothing
    pub fn is_zero(&self) -> bool {
        self.per_block == 0 && self.per_transaction == 0
    }
}
