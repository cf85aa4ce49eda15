//! Node configuration
//!
//! Loaded from a JSON file; every field has a default so a partial file (or
//! none at all) is enough. Network parameters under "founder" settings only
//! matter when this node ends up creating the genesis block.

use primitive_types::U512;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::consensus::{default_hardness, GenesisParams, RewardSchedule};
use crate::constants::{DEFAULT_LISTEN_ADDR, DEFAULT_SLOT_LENGTH_MS, FAN_OUT};
use crate::crypto::{KeyPair, PublicKey};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid secret key")]
    InvalidSecretKey,
    #[error("Invalid privileged key {0}")]
    InvalidPrivilegedKey(String),
    #[error("Invalid hardness {0}: expected a decimal integer")]
    InvalidHardness(String),
    #[error("Slot length must be positive")]
    ZeroSlotLength,
}

/// Node configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Peer-to-peer listen address
    pub listen_addr: String,
    /// Address announced to peers; derived from the listener when unset
    pub advertise_addr: Option<String>,
    /// Existing member to join through; found a new network when unset
    pub bootstrap: Option<String>,
    /// JSON-RPC listen address; RPC is disabled when unset
    pub rpc_addr: Option<String>,
    /// Hex-encoded 32-byte secret; a fresh key is generated when unset
    pub secret_key_hex: Option<String>,
    /// Ring fan-out
    pub fan_out: usize,

    // Founder settings
    /// Extra privileged keys (Base58), besides the founder
    pub privileged_keys: Vec<String>,
    /// Genesis seed; random when unset
    pub seed: Option<u64>,
    /// Slot length in milliseconds
    pub slot_length_ms: u64,
    /// Minimum qualifying draw value as a decimal integer
    pub hardness: Option<String>,
    /// Reward per canonical block
    pub block_reward: u64,
    /// Reward per applied transaction
    pub transaction_reward: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            advertise_addr: None,
            bootstrap: None,
            rpc_addr: None,
            secret_key_hex: None,
            fan_out: FAN_OUT,
            privileged_keys: Vec::new(),
            seed: None,
            slot_length_ms: DEFAULT_SLOT_LENGTH_MS,
            hardness: None,
            block_reward: 0,
            transaction_reward: 0,
        }
    }
}

impl NodeConfig {
    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// The node identity
    pub fn keypair(&self) -> Result<KeyPair, ConfigError> {
        match &self.secret_key_hex {
            Some(secret) => {
                KeyPair::from_secret_hex(secret).map_err(|_| ConfigError::InvalidSecretKey)
            }
            None => Ok(KeyPair::generate()),
        }
    }

    /// Parsed extra privileged keys
    pub fn parsed_privileged_keys(&self) -> Result<Vec<PublicKey>, ConfigError> {
        self.privileged_keys
            .iter()
            .map(|key| {
                key.parse()
                    .map_err(|_| ConfigError::InvalidPrivilegedKey(key.clone()))
            })
            .collect()
    }

    /// Parsed hardness, or the default that admits about one draw in ten
    pub fn parsed_hardness(&self) -> Result<U512, ConfigError> {
        match &self.hardness {
            Some(text) => U512::from_dec_str(text.trim())
                .map_err(|_| ConfigError::InvalidHardness(text.clone())),
            None => Ok(default_hardness()),
        }
    }

    /// Genesis parameters for a network founded by this node
    pub fn genesis_params(&self, seed: u64, timestamp_ms: u64) -> Result<GenesisParams, ConfigError> {
        if self.slot_length_ms == 0 {
            return Err(ConfigError::ZeroSlotLength);
        }

        Ok(GenesisParams {
            privileged_keys: self.parsed_privileged_keys()?,
            seed,
            hardness: self.parsed_hardness()?,
            slot_length_ms: self.slot_length_ms,
            timestamp_ms,
            rewards: RewardSchedule::new(self.block_reward, self.transaction_reward),
        })
    }
}
