//! Block structures for the slot ledger
//!
//! A block names its slot, its parent (by signature), its producer and the
//! ids of the transactions it includes. The genesis block additionally fixes
//! the network parameters every node validates against.

use primitive_types::U512;
use serde::{Deserialize, Serialize};

use super::{default_hardness, draw, BlockError, RewardSchedule};
use crate::constants::DEFAULT_SLOT_LENGTH_MS;
use crate::crypto::{CanonicalWriter, Hash, KeyPair, PublicKey, SchnorrSignature};

/// Domain tag for block signatures
const BLOCK_DOMAIN: &[u8] = b"slot-ledger/block";

/// Domain tag for the genesis signature
const GENESIS_DOMAIN: &[u8] = b"slot-ledger/genesis";

/// A block produced for one slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Slot number
    pub id: u64,
    /// Signature of the parent block, `None` only for genesis
    pub previous: Option<SchnorrSignature>,
    /// Producer key
    pub sender: PublicKey,
    /// Included transaction ids, in order
    pub transaction_ids: Vec<String>,
    /// Producer signature; also the block's content id
    pub signature: SchnorrSignature,
    /// Sortition proof for `id`
    pub draw: SchnorrSignature,
}

impl Block {
    /// Assemble and sign a block
    pub fn new_signed(
        id: u64,
        previous: SchnorrSignature,
        producer: &KeyPair,
        transaction_ids: Vec<String>,
        draw: SchnorrSignature,
    ) -> Self {
        let mut block = Self {
            id,
            previous: Some(previous),
            sender: producer.public_key.clone(),
            transaction_ids,
            signature: SchnorrSignature([0u8; 64]),
            draw,
        };
        block.signature = producer.sign(&block.signing_hash());
        block
    }

    /// Digest signed by the producer: `(id, previous, sender, transaction_ids)`
    pub fn signing_hash(&self) -> Hash {
        let mut writer = CanonicalWriter::new(BLOCK_DOMAIN);
        self.write_fields(&mut writer);
        writer.digest()
    }

    fn write_fields(&self, writer: &mut CanonicalWriter) {
        let previous = self.previous.map(|p| p.0.to_vec()).unwrap_or_default();
        writer
            .put_u64(self.id)
            .put_bytes(&previous)
            .put_bytes(&self.sender.0)
            .put_u64(self.transaction_ids.len() as u64);
        for id in &self.transaction_ids {
            writer.put_str(id);
        }
    }

    /// Verify the producer signature
    pub fn verify_signature(&self) -> bool {
        self.sender.verify(&self.signing_hash(), &self.signature)
    }

    /// Check if this is the genesis block
    pub fn is_genesis(&self) -> bool {
        self.previous.is_none()
    }
}

/// Network parameters chosen by the founder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenesisParams {
    /// Additional privileged keys; the founder is always included
    pub privileged_keys: Vec<PublicKey>,
    /// Public randomness anchor
    pub seed: u64,
    /// Minimum qualifying draw value
    pub hardness: U512,
    /// Slot length in milliseconds
    pub slot_length_ms: u64,
    /// Wall-clock time of slot 0 in milliseconds since the Unix epoch
    pub timestamp_ms: u64,
    /// Producer rewards credited at replay
    pub rewards: RewardSchedule,
}

impl Default for GenesisParams {
    fn default() -> Self {
        Self {
            privileged_keys: Vec::new(),
            seed: 0,
            hardness: default_hardness(),
            slot_length_ms: DEFAULT_SLOT_LENGTH_MS,
            timestamp_ms: 0,
            rewards: RewardSchedule::default(),
        }
    }
}

/// The genesis block plus the parameters it fixes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisBlock {
    /// Slot 0 block; its signature covers every field below
    pub block: Block,
    /// Sortition electorate, sorted and de-duplicated
    pub privileged_keys: Vec<PublicKey>,
    /// Public randomness anchor
    pub seed: u64,
    /// Minimum qualifying draw value
    pub hardness: U512,
    /// Slot length in milliseconds
    pub slot_length_ms: u64,
    /// Wall-clock time of slot 0 in milliseconds since the Unix epoch
    pub timestamp_ms: u64,
    /// Producer rewards credited at replay
    #[serde(default)]
    pub rewards: RewardSchedule,
}

impl GenesisBlock {
    /// Create and sign the genesis block of a new network
    pub fn found(founder: &KeyPair, params: GenesisParams) -> Self {
        let mut privileged_keys = params.privileged_keys;
        privileged_keys.push(founder.public_key.clone());
        privileged_keys.sort();
        privileged_keys.dedup();

        let mut genesis = Self {
            block: Block {
                id: 0,
                previous: None,
                sender: founder.public_key.clone(),
                transaction_ids: Vec::new(),
                signature: SchnorrSignature([0u8; 64]),
                draw: draw(params.seed, 0, founder),
            },
            privileged_keys,
            seed: params.seed,
            hardness: params.hardness,
            slot_length_ms: params.slot_length_ms.max(1),
            timestamp_ms: params.timestamp_ms,
            rewards: params.rewards,
        };
        genesis.block.signature = founder.sign(&genesis.signing_hash());
        genesis
    }

    /// Digest signed by the founder
    pub fn signing_hash(&self) -> Hash {
        let mut hardness = [0u8; 64];
        self.hardness.to_big_endian(&mut hardness);

        let mut writer = CanonicalWriter::new(GENESIS_DOMAIN);
        self.block.write_fields(&mut writer);
        writer
            .put_bytes(&self.block.draw.0)
            .put_u64(self.privileged_keys.len() as u64);
        for key in &self.privileged_keys {
            writer.put_bytes(&key.0);
        }
        writer
            .put_u64(self.seed)
            .put_bytes(&hardness)
            .put_u64(self.slot_length_ms)
            .put_u64(self.timestamp_ms)
            .put_u64(self.rewards.per_block)
            .put_u64(self.rewards.per_transaction);
        writer.digest()
    }

    /// Check that bootstrap data is well formed and signed by its founder
    pub fn verify(&self) -> Result<(), BlockError> {
        let malformed = |reason: &str| -> Result<(), BlockError> {
            Err(BlockError::MalformedGenesis(reason.to_string()))
        };

        if self.block.id != 0 || !self.block.is_genesis() {
            return malformed("genesis must be slot 0 without a parent");
        }
        if !self.block.transaction_ids.is_empty() {
            return malformed("genesis carries no transactions");
        }
        if self.slot_length_ms == 0 {
            return malformed("slot length must be positive");
        }
        if self.privileged_keys.windows(2).any(|w| w[0] >= w[1]) {
            return malformed("privileged keys must be sorted and unique");
        }
        if !self.is_privileged(&self.block.sender) {
            return malformed("founder is not privileged");
        }
        if !self
            .block
            .sender
            .verify(&self.signing_hash(), &self.block.signature)
        {
            return malformed("founder signature does not verify");
        }
        Ok(())
    }

    /// Whether `key` belongs to the electorate
    pub fn is_privileged(&self, key: &PublicKey) -> bool {
        self.privileged_keys.binary_search(key).is_ok()
    }

    /// Content id of the genesis block
    pub fn signature(&self) -> SchnorrSignature {
        self.block.signature
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_signature_round() {
        let king = KeyPair::generate();
        let parent = SchnorrSignature([1u8; 64]);
        let block = Block::new_signed(3, parent, &king, vec!["a-0".into()], draw(1, 3, &king));

        assert!(block.verify_signature());
        assert!(!block.is_genesis());
    }

    #[test]
    fn test_block_signature_excludes_draw() {
        let king = KeyPair::generate();
        let parent = SchnorrSignature([1u8; 64]);
        let mut block = Block::new_signed(3, parent, &king, Vec::new(), draw(1, 3, &king));
        block.draw = draw(1, 4, &king);

        assert!(block.verify_signature());
    }

    #[test]
    fn test_transaction_order_is_signed() {
        let king = KeyPair::generate();
        let parent = SchnorrSignature([1u8; 64]);
        let mut block = Block::new_signed(
            2,
            parent,
            &king,
            vec!["a-0".into(), "a-1".into()],
            draw(1, 2, &king),
        );
        block.transaction_ids.reverse();

        assert!(!block.verify_signature());
    }

    #[test]
    fn test_genesis_includes_founder_sorted() {
        let founder = KeyPair::generate();
        let other = KeyPair::generate();
        let params = GenesisParams {
            privileged_keys: vec![other.public_key.clone(), other.public_key.clone()],
            seed: 42,
            ..GenesisParams::default()
        };
        let genesis = GenesisBlock::found(&founder, params);

        assert_eq!(genesis.privileged_keys.len(), 2);
        assert!(genesis.is_privileged(&founder.public_key));
        assert!(genesis.is_privileged(&other.public_key));
        assert!(genesis.verify().is_ok());
    }

    #[test]
    fn test_genesis_params_are_signed() {
        let founder = KeyPair::generate();
        let mut genesis = GenesisBlock::found(&founder, GenesisParams::default());
        genesis.hardness = U512::zero();

        assert!(matches!(genesis.verify(), Err(BlockError::MalformedGenesis(_))));
    }

    #[test]
    fn test_genesis_survives_bincode() {
        let founder = KeyPair::generate();
        let genesis = GenesisBlock::found(&founder, GenesisParams::default());

        let bytes = bincode::serialize(&genesis).unwrap();
        let decoded: GenesisBlock = bincode::deserialize(&bytes).unwrap();

        assert_eq!(decoded, genesis);
        assert!(decoded.verify().is_ok());
    }
}
