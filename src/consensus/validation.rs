//! Block validation
//!
//! Pure checks that need only the block and the genesis parameters. Checks
//! that depend on the stored chain (parent lookup, slot range, duplicate
//! slots) live in the chain store.

use thiserror::Error;

use crate::consensus::{is_eligible, Block, GenesisBlock};

/// Validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    #[error("Block signature does not verify under the sender key")]
    InvalidSignature,
    #[error("Draw for slot {slot} is not eligible")]
    IneligibleDraw { slot: u64 },
    #[error("Parent block {parent} is unknown")]
    UnknownParent { parent: String },
    #[error("Block slot {id} outside ({parent_id}, {upper}]")]
    SlotOutOfRange { id: u64, parent_id: u64, upper: u64 },
    #[error("Sender {sender} already produced a block for slot {slot}")]
    DuplicateSlot { sender: String, slot: u64 },
    #[error("Only genesis may omit its parent")]
    MissingParent,
    #[error("Malformed genesis block: {0}")]
    MalformedGenesis(String),
}

/// Validate the block signature
pub fn validate_block_signature(block: &Block) -> Result<(), BlockError> {
    if !block.verify_signature() {
        return Err(BlockError::InvalidSignature);
    }
    Ok(())
}

/// Validate the sortition proof against the genesis electorate and hardness
pub fn validate_draw(block: &Block, genesis: &GenesisBlock) -> Result<(), BlockError> {
    let eligible = is_eligible(
        genesis.seed,
        block.id,
        &block.draw,
        &block.sender,
        &genesis.privileged_keys,
        genesis.hardness,
    );

    if !eligible {
        return Err(BlockError::IneligibleDraw { slot: block.id });
    }
    Ok(())
}

/// Validate everything about a block that does not need the chain
pub fn validate_block(block: &Block, genesis: &GenesisBlock) -> Result<(), BlockError> {
    if block.previous.is_none() {
        return Err(BlockError::MissingParent);
    }
    validate_block_signature(block)?;
    validate_draw(block, genesis)
}

/// Validate the slot range rule: `parent_id < id <= local_slot + 1`
pub fn validate_slot_range(block: &Block, parent_id: u64, local_slot: u64) -> Result<(), BlockError> {
    let upper = local_slot.saturating_add(1);
    if block.id <= parent_id || block.id > upper {
        return Err(BlockError::SlotOutOfRange {
            id: block.id,
            parent_id,
            upper,
        });
    }
    Ok(())
}
