//! Slot clock
//!
//! Slot numbers are derived from wall-clock time and the genesis anchor, so
//! nodes that join late agree on the current slot without syncing.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::consensus::GenesisBlock;

/// Milliseconds since the Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Maps wall-clock time to slot numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotClock {
    timestamp_ms: u64,
    slot_length_ms: u64,
}

impl SlotClock {
    /// Create a clock anchored at `timestamp_ms`
    pub fn new(timestamp_ms: u64, slot_length_ms: u64) -> Self {
        Self {
            timestamp_ms,
            slot_length_ms: slot_length_ms.max(1),
        }
    }

    /// Clock for a network
    pub fn from_genesis(genesis: &GenesisBlock) -> Self {
        Self::new(genesis.timestamp_ms, genesis.slot_length_ms)
    }

    /// Slot containing `now_ms`; times before the anchor map to slot 0
    pub fn slot_at(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.timestamp_ms) / self.slot_length_ms
    }

    /// Time left until the next slot starts
    pub fn until_next_slot(&self, now_ms: u64) -> Duration {
        let next_start = self
            .slot_at(now_ms)
            .saturating_add(1)
            .saturating_mul(self.slot_length_ms)
            .saturating_add(self.timestamp_ms);
        Duration::from_millis(next_start.saturating_sub(now_ms))
    }
}
