//! Block store, fork choice and ledger replay
//!
//! Blocks live in an arena keyed by their signature. Each stored block
//! records its height (hops to genesis), so fork choice is one pass over
//! the arena. Blocks whose parent has not arrived yet wait in a bounded
//! orphan buffer keyed by the missing parent.

use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;
use tracing::{debug, warn};

use super::Ledger;
use crate::constants::{MAX_ORPHANS, PREMIUM_ACCOUNT};
use crate::consensus::{validate_block, validate_slot_range, Block, BlockError, GenesisBlock};
use crate::crypto::{PublicKey, SchnorrSignature};
use crate::validation::SignedTransaction;

/// Replay errors: history needed for the ledger is not available locally
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplayError {
    #[error("Block {0} is missing from the chain store")]
    MissingBlock(String),
    #[error("Transaction {0} is unknown")]
    MissingTransaction(String),
}

/// Source of transaction contents for replay
pub trait TransactionLookup {
    /// Find a transaction by id
    fn transaction(&self, id: &str) -> Option<&SignedTransaction>;
}

impl TransactionLookup for HashMap<String, SignedTransaction> {
    fn transaction(&self, id: &str) -> Option<&SignedTransaction> {
        self.get(id)
    }
}

/// Result of offering a block to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Stored; the block followed by any orphans it connected, in order
    Accepted(Vec<Block>),
    /// Valid but waiting for its parent
    Orphaned,
    /// Already stored or buffered
    Duplicate,
}

#[derive(Debug, Clone)]
struct StoredBlock {
    block: Block,
    height: u64,
}

/// All blocks known to this node
#[derive(Debug)]
pub struct ChainStore {
    genesis: GenesisBlock,
    blocks: HashMap<SchnorrSignature, StoredBlock>,
    /// `(sender, slot)` pairs already used by a stored block
    slots: HashSet<(PublicKey, u64)>,
    /// Buffered blocks keyed by the parent they wait for
    orphans: HashMap<SchnorrSignature, Vec<Block>>,
    /// Buffered block signature to the parent it waits for
    orphan_parents: HashMap<SchnorrSignature, SchnorrSignature>,
    /// Buffered signatures, oldest first; may hold already adopted entries
    orphan_order: VecDeque<SchnorrSignature>,
}

impl ChainStore {
    /// Create a store holding only the genesis block
    pub fn new(genesis: GenesisBlock) -> Self {
        let mut blocks = HashMap::new();
        blocks.insert(
            genesis.block.signature,
            StoredBlock {
                block: genesis.block.clone(),
                height: 0,
            },
        );

        Self {
            genesis,
            blocks,
            slots: HashSet::new(),
            orphans: HashMap::new(),
            orphan_parents: HashMap::new(),
            orphan_order: VecDeque::new(),
        }
    }

    /// Genesis parameters
    pub fn genesis(&self) -> &GenesisBlock {
        &self.genesis
    }

    /// Offer a block received at local slot `local_slot`
    ///
    /// Checks run in order: duplicate, signature and draw, duplicate slot,
    /// parent lookup, slot range. A block with an unknown parent is buffered
    /// rather than rejected; a full orphan buffer drops its oldest entry.
    pub fn insert(&mut self, block: Block, local_slot: u64) -> Result<InsertOutcome, BlockError> {
        if self.contains(&block.signature) || self.orphan_parents.contains_key(&block.signature) {
            return Ok(InsertOutcome::Duplicate);
        }

        validate_block(&block, &self.genesis)?;
        self.check_slot_unused(&block)?;

        let Some(parent) = block.previous else {
            return Err(BlockError::MissingParent);
        };
        if !self.blocks.contains_key(&parent) {
            return self.buffer_orphan(block, parent);
        }

        let signature = block.signature;
        let mut accepted = vec![block.clone()];
        self.connect(block, local_slot)?;

        accepted.extend(self.adopt_orphans(signature, local_slot));
        Ok(InsertOutcome::Accepted(accepted))
    }

    fn check_slot_unused(&self, block: &Block) -> Result<(), BlockError> {
        if self.slots.contains(&(block.sender.clone(), block.id)) {
            return Err(BlockError::DuplicateSlot {
                sender: block.sender.short(),
                slot: block.id,
            });
        }
        Ok(())
    }

    fn buffer_orphan(
        &mut self,
        block: Block,
        parent: SchnorrSignature,
    ) -> Result<InsertOutcome, BlockError> {
        while self.orphan_parents.len() >= MAX_ORPHANS && self.evict_oldest_orphan() {}

        debug!(
            slot = block.id,
            parent = %parent.short(),
            "buffering block until its parent arrives"
        );
        self.orphan_parents.insert(block.signature, parent);
        self.orphan_order.push_back(block.signature);
        self.orphans.entry(parent).or_default().push(block);
        Ok(InsertOutcome::Orphaned)
    }

    /// Drop the oldest buffered block; false if nothing was buffered
    fn evict_oldest_orphan(&mut self) -> bool {
        while let Some(signature) = self.orphan_order.pop_front() {
            let Some(parent) = self.orphan_parents.remove(&signature) else {
                continue;
            };
            if let Some(siblings) = self.orphans.get_mut(&parent) {
                siblings.retain(|b| b.signature != signature);
                if siblings.is_empty() {
                    self.orphans.remove(&parent);
                }
            }
            debug!(block = %signature.short(), "evicted oldest buffered block");
            return true;
        }
        false
    }

    /// Store a block whose parent is present
    fn connect(&mut self, block: Block, local_slot: u64) -> Result<(), BlockError> {
        let parent = block.previous.ok_or(BlockError::MissingParent)?;
        let (parent_id, parent_height) = match self.blocks.get(&parent) {
            Some(stored) => (stored.block.id, stored.height),
            None => {
                return Err(BlockError::UnknownParent {
                    parent: parent.short(),
                })
            }
        };

        validate_slot_range(&block, parent_id, local_slot)?;
        self.check_slot_unused(&block)?;

        self.slots.insert((block.sender.clone(), block.id));
        self.blocks.insert(
            block.signature,
            StoredBlock {
                block,
                height: parent_height + 1,
            },
        );
        Ok(())
    }

    /// Connect every buffered descendant of `root`, breadth first
    fn adopt_orphans(&mut self, root: SchnorrSignature, local_slot: u64) -> Vec<Block> {
        let mut adopted = Vec::new();
        let mut queue = VecDeque::from([root]);

        while let Some(parent) = queue.pop_front() {
            let Some(children) = self.orphans.remove(&parent) else {
                continue;
            };

            for child in children {
                self.orphan_parents.remove(&child.signature);
                let signature = child.signature;
                let slot = child.id;

                match self.connect(child.clone(), local_slot) {
                    Ok(()) => {
                        debug!(slot, "adopted buffered block");
                        adopted.push(child);
                        queue.push_back(signature);
                    }
                    Err(e) => warn!(slot, error = %e, "dropping buffered block"),
                }
            }
        }

        if self.orphan_order.len() > 2 * MAX_ORPHANS {
            let live = &self.orphan_parents;
            self.orphan_order.retain(|signature| live.contains_key(signature));
        }
        adopted
    }

    /// Whether a block is stored
    pub fn contains(&self, signature: &SchnorrSignature) -> bool {
        self.blocks.contains_key(signature)
    }

    /// Look up a stored block
    pub fn get(&self, signature: &SchnorrSignature) -> Option<&Block> {
        self.blocks.get(signature).map(|stored| &stored.block)
    }

    /// Hops from a stored block to genesis
    pub fn height_of(&self, signature: &SchnorrSignature) -> Option<u64> {
        self.blocks.get(signature).map(|stored| stored.height)
    }

    /// Number of stored blocks, genesis included
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always false: genesis is stored from the start
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Number of buffered orphans
    pub fn orphan_count(&self) -> usize {
        self.orphan_parents.len()
    }

    /// Fork choice over blocks with `id < below_id`
    ///
    /// Picks the greatest height, then the greatest id, then the greatest
    /// signature. Genesis is returned when nothing else qualifies.
    pub fn select_canonical_chain(&self, below_id: u64) -> &Block {
        self.blocks
            .values()
            .filter(|stored| stored.block.id < below_id)
            .max_by(|a, b| {
                (a.height, a.block.id, a.block.signature)
                    .cmp(&(b.height, b.block.id, b.block.signature))
            })
            .map(|stored| &stored.block)
            .unwrap_or(&self.genesis.block)
    }

    /// Tip of the canonical chain over every stored block
    pub fn canonical_tip(&self) -> &Block {
        self.select_canonical_chain(u64::MAX)
    }

    /// Path from genesis to `tip`, genesis first
    pub fn path_to(&self, tip: &SchnorrSignature) -> Result<Vec<&Block>, ReplayError> {
        let mut path = Vec::new();
        let mut cursor = Some(*tip);

        while let Some(signature) = cursor {
            let block = self
                .get(&signature)
                .ok_or_else(|| ReplayError::MissingBlock(signature.short()))?;
            path.push(block);
            cursor = block.previous;
        }

        path.reverse();
        Ok(path)
    }

    /// Transaction ids included by `tip` and its ancestors
    pub fn ancestor_transaction_ids(&self, tip: &SchnorrSignature) -> Result<HashSet<String>, ReplayError> {
        Ok(self
            .path_to(tip)?
            .into_iter()
            .flat_map(|block| block.transaction_ids.iter().cloned())
            .collect())
    }

    /// Rebuild balances from the chain ending at `tip`
    ///
    /// Privileged keys start with the premium grant. A transaction id is
    /// consumed at its first occurrence along the path: if the sender cannot
    /// cover it there it is skipped for good. Producers earn the genesis
    /// reward schedule.
    pub fn replay_chain(
        &self,
        tip: &SchnorrSignature,
        transactions: &impl TransactionLookup,
    ) -> Result<Ledger, ReplayError> {
        let path = self.path_to(tip)?;
        let mut ledger = Ledger::new();
        for key in &self.genesis.privileged_keys {
            ledger.initialize(key, PREMIUM_ACCOUNT);
        }

        let rewards = self.genesis.rewards;
        let mut applied: HashSet<&str> = HashSet::new();

        for block in path.into_iter().filter(|b| !b.is_genesis()) {
            let mut count = 0u64;
            for id in &block.transaction_ids {
                if applied.contains(id.as_str()) {
                    continue;
                }
                let tx = transactions
                    .transaction(id)
                    .ok_or_else(|| ReplayError::MissingTransaction(id.clone()))?;
                applied.insert(id.as_str());
                if ledger.apply(tx) {
                    count += 1;
                }
            }

            if !rewards.is_zero() {
                ledger.credit(&block.sender, rewards.block_reward(count));
            }
        }

        Ok(ledger)
    }

    /// Rebuild balances from the canonical chain
    pub fn replay_ledger(&self, transactions: &impl TransactionLookup) -> Result<Ledger, ReplayError> {
        let tip = self.canonical_tip().signature;
        self.replay_chain(&tip, transactions)
    }
}
