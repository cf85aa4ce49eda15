//! Genesis block creation
//!
//! Only a node that finds no reachable peer founds a network. It fixes the
//! seed, electorate, hardness, slot clock and rewards once; every later
//! member receives them through bootstrap.

use rand::Rng;
use tracing::info;

use super::{now_ms, ConfigError, NodeConfig};
use crate::consensus::GenesisBlock;
use crate::crypto::KeyPair;

/// Create the genesis block of a new network with `founder` as first king
pub fn found_network(founder: &KeyPair, config: &NodeConfig) -> Result<GenesisBlock, ConfigError> {
    let seed = config.seed.unwrap_or_else(|| rand::thread_rng().gen());
    let params = config.genesis_params(seed, now_ms())?;
    let genesis = GenesisBlock::found(founder, params);

    info!(
        seed = genesis.seed,
        kings = genesis.privileged_keys.len(),
        slot_length_ms = genesis.slot_length_ms,
        genesis = %genesis.signature().short(),
        "founded new network"
    );
    Ok(genesis)
}
