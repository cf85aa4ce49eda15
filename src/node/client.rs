//! Node orchestrator
//!
//! Wires the chain store, transaction pool and peer list to the overlay.
//! All mutable state sits behind one mutex; gossip happens after the lock
//! is released.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{now_ms, ConfigError, SlotClock};
use crate::consensus::{draw, is_eligible, Block, BlockError, GenesisBlock};
use crate::crypto::{KeyPair, PublicKey, SchnorrSignature};
use crate::p2p::{ConnectionId, ContentId, Message, MessageHandler, Overlay, OverlayError, Peer, PeerList};
use crate::storage::{ChainStore, InsertOutcome, Ledger, ReplayError, TransactionPool};
use crate::validation::{SignedTransaction, TransactionError};

/// Node errors
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Transaction rejected: {0}")]
    Transaction(#[from] TransactionError),
    #[error("Ledger replay incomplete: {0}")]
    Replay(#[from] ReplayError),
    #[error("Block rejected: {0}")]
    Block(#[from] BlockError),
    #[error("Network error: {0}")]
    Overlay(#[from] OverlayError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Lifecycle of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Fetching the peer list and genesis, or dialing neighbours
    Bootstrapping,
    /// Relaying transactions and blocks
    Connected,
    /// Relaying and attempting production every slot
    Producing,
}

/// Summary returned by `getinfo`
#[derive(Debug, Clone, Serialize)]
pub struct NodeInfo {
    pub address: String,
    pub public_key: PublicKey,
    pub role: NodeRole,
    pub slot: u64,
    pub tip: SchnorrSignature,
    pub tip_id: u64,
    pub height: u64,
    pub blocks: usize,
    pub orphans: usize,
    pub transactions: usize,
    pub peers: usize,
    pub connections: usize,
    pub privileged: bool,
}

struct NodeState {
    chain: ChainStore,
    pool: TransactionPool,
    peers: PeerList,
    slot: u64,
    next_seq: u64,
    last_attempted_slot: u64,
    role: NodeRole,
}

/// One member of the network
pub struct Node {
    keypair: KeyPair,
    own_peer: Peer,
    genesis: GenesisBlock,
    clock: SlotClock,
    overlay: Arc<Overlay>,
    state: Mutex<NodeState>,
}

impl Node {
    /// Create a node from bootstrap data
    ///
    /// Fails if the genesis block is malformed. The slot counter starts at
    /// the genesis clock's current slot.
    pub fn new(
        keypair: KeyPair,
        own_address: impl Into<String>,
        genesis: GenesisBlock,
        peers: Vec<Peer>,
        overlay: Arc<Overlay>,
    ) -> Result<Self, NodeError> {
        genesis.verify()?;

        let own_peer = Peer::new(own_address, keypair.public_key.clone());
        let mut peer_list = PeerList::from_peers(peers);
        peer_list.merge(own_peer.clone());
        overlay.mark_seen(ContentId::Peer(own_peer.address.clone()));
        overlay.mark_seen(ContentId::Block(genesis.signature()));
        let clock = SlotClock::from_genesis(&genesis);

        let state = NodeState {
            chain: ChainStore::new(genesis.clone()),
            pool: TransactionPool::new(),
            peers: peer_list,
            slot: clock.slot_at(now_ms()),
            next_seq: 0,
            last_attempted_slot: 0,
            role: NodeRole::Bootstrapping,
        };

        Ok(Self {
            keypair,
            own_peer,
            genesis,
            clock,
            overlay,
            state: Mutex::new(state),
        })
    }

    /// This node's peer record
    pub fn own_peer(&self) -> &Peer {
        &self.own_peer
    }

    /// This node's account key
    pub fn public_key(&self) -> &PublicKey {
        &self.keypair.public_key
    }

    /// Network parameters
    pub fn genesis(&self) -> &GenesisBlock {
        &self.genesis
    }

    /// The overlay this node gossips through
    pub fn overlay(&self) -> &Arc<Overlay> {
        &self.overlay
    }

    /// Whether this node holds a privileged key
    pub fn is_privileged(&self) -> bool {
        self.genesis.is_privileged(&self.keypair.public_key)
    }

    /// Current lifecycle state
    pub fn role(&self) -> NodeRole {
        self.state.lock().role
    }

    /// Leave bootstrapping: privileged nodes start producing
    pub fn mark_connected(&self) {
        let role = if self.is_privileged() {
            NodeRole::Producing
        } else {
            NodeRole::Connected
        };
        self.state.lock().role = role;
        info!(?role, address = %self.own_peer.address, "node connected");
    }

    /// Announce this node to the overlay
    pub fn announce(&self) {
        self.overlay.broadcast(Message::NewPeer(self.own_peer.clone()));
    }

    /// Peers this node should dial after joining
    pub fn ring_neighbours(&self, fan_out: usize) -> Vec<Peer> {
        self.state
            .lock()
            .peers
            .ring_neighbours(&self.own_peer.address, fan_out)
    }

    /// Sign, record and gossip a transfer from this node's account
    ///
    /// Returns the transaction id `"<own address>-<seq>"`.
    pub fn submit_transaction(&self, to: PublicKey, amount: u64) -> Result<String, NodeError> {
        if to == self.keypair.public_key {
            return Err(TransactionError::SelfTransfer.into());
        }
        if amount < 1 {
            return Err(TransactionError::NonPositiveAmount.into());
        }

        let tx = {
            let mut state = self.state.lock();
            let id = format!("{}-{}", self.own_peer.address, state.next_seq);
            state.next_seq += 1;

            let tx = SignedTransaction::new(id, &self.keypair, to, amount);
            state.pool.insert(tx.clone())?;
            tx
        };

        info!(id = %tx.id, amount, to = %tx.to.short(), "submitted transaction");
        let id = tx.id.clone();
        self.overlay
            .flood(ContentId::Transaction(id.clone()), Message::Transaction(tx));
        Ok(id)
    }

    /// Record and relay a received transaction
    ///
    /// Returns true if the transaction was new and valid.
    pub fn handle_transaction(&self, tx: SignedTransaction) -> bool {
        let inserted = self.state.lock().pool.insert(tx.clone());
        match inserted {
            Ok(true) => {
                debug!(id = %tx.id, "new transaction");
                let id = tx.id.clone();
                self.overlay
                    .flood(ContentId::Transaction(id), Message::Transaction(tx));
                true
            }
            Ok(false) => {
                debug!(id = %tx.id, "duplicate transaction");
                false
            }
            Err(e) => {
                debug!(id = %tx.id, error = %e, "dropping invalid transaction");
                false
            }
        }
    }

    /// Store and relay a received block
    ///
    /// Blocks connected by this insert, including adopted orphans, are
    /// gossiped once each.
    pub fn handle_block(&self, block: Block) -> Result<InsertOutcome, BlockError> {
        let slot = block.id;
        let outcome = {
            let mut state = self.state.lock();
            let local_slot = state.slot.max(self.clock.slot_at(now_ms()));
            state.slot = local_slot;
            state.chain.insert(block, local_slot)
        };

        match &outcome {
            Ok(InsertOutcome::Accepted(blocks)) => {
                for accepted in blocks {
                    debug!(slot = accepted.id, sender = %accepted.sender.short(), "accepted block");
                    self.overlay.flood(
                        ContentId::Block(accepted.signature),
                        Message::Block(accepted.clone()),
                    );
                }
            }
            Ok(InsertOutcome::Orphaned) => debug!(slot, "block waiting for parent"),
            Ok(InsertOutcome::Duplicate) => debug!(slot, "duplicate block"),
            Err(e) => warn!(slot, error = %e, "dropping invalid block"),
        }
        outcome
    }

    /// Merge and relay a peer announcement
    ///
    /// Returns true if the address was new.
    pub fn handle_new_peer(&self, peer: Peer) -> bool {
        let merged = self.state.lock().peers.merge(peer.clone());
        if merged {
            info!(address = %peer.address, "peer joined");
            let address = peer.address.clone();
            self.overlay
                .flood(ContentId::Peer(address), Message::NewPeer(peer));
        }
        merged
    }

    /// Bootstrap reply for a joining node
    pub fn init_info(&self) -> Message {
        Message::InitInfo {
            peers: self.list_peers(),
            genesis: self.genesis.clone(),
        }
    }

    /// Move the local slot counter forward; it never goes back
    pub fn advance_slot(&self, slot: u64) {
        let mut state = self.state.lock();
        state.slot = state.slot.max(slot);
    }

    /// Slot tick: try to produce a block for `slot`
    ///
    /// Every node advances its counter. Only privileged nodes draw, at most
    /// once per slot. Returns the block if one was produced.
    pub fn on_slot(&self, slot: u64) -> Option<Block> {
        let block = {
            let mut state = self.state.lock();
            state.slot = state.slot.max(slot);

            if slot == 0 || !self.is_privileged() || slot <= state.last_attempted_slot {
                return None;
            }
            state.last_attempted_slot = slot;

            let proof = draw(self.genesis.seed, slot, &self.keypair);
            let eligible = is_eligible(
                self.genesis.seed,
                slot,
                &proof,
                &self.keypair.public_key,
                &self.genesis.privileged_keys,
                self.genesis.hardness,
            );
            if !eligible {
                return None;
            }

            let parent = state.chain.select_canonical_chain(slot).signature;
            let included = match state.chain.ancestor_transaction_ids(&parent) {
                Ok(ids) => ids,
                Err(e) => {
                    warn!(slot, error = %e, "cannot assemble block");
                    return None;
                }
            };
            let transaction_ids = state.pool.pending_excluding(&included);
            let block = Block::new_signed(slot, parent, &self.keypair, transaction_ids, proof);

            if let Err(e) = state.chain.insert(block.clone(), slot) {
                warn!(slot, error = %e, "own block rejected");
                return None;
            }
            block
        };

        info!(
            slot,
            transactions = block.transaction_ids.len(),
            block = %block.signature.short(),
            "produced block"
        );
        self.overlay
            .flood(ContentId::Block(block.signature), Message::Block(block.clone()));
        Some(block)
    }

    /// Balances rebuilt from the canonical chain
    pub fn current_ledger_snapshot(&self) -> Result<Ledger, NodeError> {
        let state = self.state.lock();
        Ok(state.chain.replay_ledger(&state.pool)?)
    }

    /// Balance of one account on the canonical chain
    pub fn balance(&self, account: &PublicKey) -> Result<u64, NodeError> {
        Ok(self.current_ledger_snapshot()?.balance(account))
    }

    /// Known peers in ring order
    pub fn list_peers(&self) -> Vec<Peer> {
        self.state.lock().peers.as_slice().to_vec()
    }

    /// Look up a stored block
    pub fn block(&self, signature: &SchnorrSignature) -> Option<Block> {
        self.state.lock().chain.get(signature).cloned()
    }

    /// Current canonical tip
    pub fn canonical_tip(&self) -> Block {
        self.state.lock().chain.canonical_tip().clone()
    }

    /// Node summary
    pub fn info(&self) -> NodeInfo {
        let state = self.state.lock();
        let tip = state.chain.canonical_tip();

        NodeInfo {
            address: self.own_peer.address.clone(),
            public_key: self.keypair.public_key.clone(),
            role: state.role,
            slot: state.slot,
            tip: tip.signature,
            tip_id: tip.id,
            height: state.chain.height_of(&tip.signature).unwrap_or(0),
            blocks: state.chain.len(),
            orphans: state.chain.orphan_count(),
            transactions: state.pool.len(),
            peers: state.peers.len(),
            connections: self.overlay.connection_count(),
            privileged: self.is_privileged(),
        }
    }
}

impl MessageHandler for Node {
    fn on_message(&self, connection: ConnectionId, message: Message) -> Option<Message> {
        match message {
            Message::NewPeer(peer) => {
                self.handle_new_peer(peer);
                None
            }
            Message::RequestInitInfo => {
                debug!(connection, "serving init info");
                Some(self.init_info())
            }
            Message::InitInfo { .. } => {
                debug!(connection, "ignoring unsolicited init info");
                None
            }
            Message::Transaction(tx) => {
                self.handle_transaction(tx);
                None
            }
            Message::Block(block) => {
                let _ = self.handle_block(block);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::GenesisParams;
    use crate::constants::PREMIUM_ACCOUNT;
    use crate::p2p::Outbound;
    use primitive_types::U512;

    fn founder_node(hardness: U512) -> (Node, KeyPair, Outbound) {
        let king = KeyPair::generate();
        let genesis = GenesisBlock::found(
            &king,
            GenesisParams {
                seed: 42,
                hardness,
                timestamp_ms: now_ms(),
                ..GenesisParams::default()
            },
        );
        let (overlay, outbound) = Overlay::new();
        let node = Node::new(king.clone(), "127.0.0.1:7000", genesis, Vec::new(), overlay).unwrap();
        node.mark_connected();
        (node, king, outbound)
    }

    fn drain(outbound: &mut Outbound) -> Vec<Message> {
        std::iter::from_fn(|| outbound.try_next()).collect()
    }

    #[test]
    fn test_founder_produces() {
        let (node, _, _) = founder_node(U512::zero());
        assert_eq!(node.role(), NodeRole::Producing);
    }

    #[test]
    fn test_submit_assigns_sequential_ids() {
        let (node, _, mut outbound) = founder_node(U512::MAX);
        let bob = KeyPair::generate();

        let first = node.submit_transaction(bob.public_key.clone(), 5).unwrap();
        let second = node.submit_transaction(bob.public_key.clone(), 5).unwrap();

        assert_eq!(first, "127.0.0.1:7000-0");
        assert_eq!(second, "127.0.0.1:7000-1");
        assert_eq!(drain(&mut outbound).len(), 2);
    }

    #[test]
    fn test_submit_rejects_self_and_zero() {
        let (node, king, _) = founder_node(U512::MAX);
        let bob = KeyPair::generate();

        assert!(matches!(
            node.submit_transaction(king.public_key.clone(), 5),
            Err(NodeError::Transaction(TransactionError::SelfTransfer))
        ));
        assert!(matches!(
            node.submit_transaction(bob.public_key.clone(), 0),
            Err(NodeError::Transaction(TransactionError::NonPositiveAmount))
        ));
    }

    #[test]
    fn test_produces_at_most_once_per_slot() {
        let (node, _, _) = founder_node(U512::zero());

        assert!(node.on_slot(1).is_some());
        assert!(node.on_slot(1).is_none());
        assert!(node.on_slot(2).is_some());
        assert_eq!(node.canonical_tip().id, 2);
    }

    #[test]
    fn test_block_includes_pending_once() {
        let (node, _, _) = founder_node(U512::zero());
        let bob = KeyPair::generate();
        let id = node.submit_transaction(bob.public_key.clone(), 100).unwrap();

        let first = node.on_slot(1).unwrap();
        let second = node.on_slot(2).unwrap();

        assert_eq!(first.transaction_ids, vec![id]);
        assert!(second.transaction_ids.is_empty());
        assert_eq!(node.balance(&bob.public_key).unwrap(), 100);
        assert_eq!(
            node.balance(node.public_key()).unwrap(),
            PREMIUM_ACCOUNT - 100
        );
    }

    #[test]
    fn test_non_king_never_produces() {
        let king = KeyPair::generate();
        let genesis = GenesisBlock::found(
            &king,
            GenesisParams {
                hardness: U512::zero(),
                timestamp_ms: now_ms(),
                ..GenesisParams::default()
            },
        );
        let (overlay, _outbound) = Overlay::new();
        let node = Node::new(KeyPair::generate(), "127.0.0.1:7001", genesis, Vec::new(), overlay).unwrap();
        node.mark_connected();

        assert_eq!(node.role(), NodeRole::Connected);
        assert!(node.on_slot(1).is_none());
        assert_eq!(node.info().slot, 1);
    }

    #[test]
    fn test_duplicate_transaction_relayed_once() {
        let (node, _, mut outbound) = founder_node(U512::MAX);
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let tx = SignedTransaction::new("peer-0", &alice, bob.public_key.clone(), 3);

        assert!(node.handle_transaction(tx.clone()));
        assert!(!node.handle_transaction(tx));
        assert_eq!(drain(&mut outbound).len(), 1);
    }

    #[test]
    fn test_new_peer_merged_once() {
        let (node, _, mut outbound) = founder_node(U512::MAX);
        let peer = Peer::new("127.0.0.1:7005", KeyPair::generate().public_key);

        assert!(node.handle_new_peer(peer.clone()));
        assert!(!node.handle_new_peer(peer));
        assert!(!node.handle_new_peer(node.own_peer().clone()));
        assert_eq!(node.list_peers().len(), 2);
        assert_eq!(drain(&mut outbound).len(), 1);
    }

    #[test]
    fn test_request_init_info_replies() {
        let (node, _, _) = founder_node(U512::MAX);

        match node.on_message(1, Message::RequestInitInfo) {
            Some(Message::InitInfo { peers, genesis }) => {
                assert_eq!(peers, vec![node.own_peer().clone()]);
                assert_eq!(&genesis, node.genesis());
            }
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn test_rejects_malformed_genesis() {
        let king = KeyPair::generate();
        let mut genesis = GenesisBlock::found(&king, GenesisParams::default());
        genesis.seed += 1;
        let (overlay, _outbound) = Overlay::new();

        assert!(matches!(
            Node::new(king, "127.0.0.1:7002", genesis, Vec::new(), overlay),
            Err(NodeError::Block(BlockError::MalformedGenesis(_)))
        ));
    }

    #[test]
    fn test_late_joiner_starts_at_clock_slot() {
        let king = KeyPair::generate();
        let genesis = GenesisBlock::found(
            &king,
            GenesisParams {
                hardness: U512::zero(),
                slot_length_ms: 1_000,
                timestamp_ms: now_ms() - 100_000,
                ..GenesisParams::default()
            },
        );
        let (overlay, _outbound) = Overlay::new();
        let node = Node::new(KeyPair::generate(), "127.0.0.1:7003", genesis.clone(), Vec::new(), overlay).unwrap();

        assert!(node.info().slot >= 100);

        let block = Block::new_signed(100, genesis.block.signature, &king, Vec::new(), draw(genesis.seed, 100, &king));
        assert!(matches!(node.handle_block(block), Ok(InsertOutcome::Accepted(_))));
        assert_eq!(node.canonical_tip().id, 100);
    }
}
