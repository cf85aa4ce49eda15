//! Peer management
//!
//! The peer list is kept sorted by address. A joining node dials the next
//! `FAN_OUT` peers after itself in that order, wrapping around, which gives
//! every node the same view of the ring topology.

use serde::{Deserialize, Serialize};

use crate::crypto::PublicKey;

/// A member of the overlay
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peer {
    /// Reachable `host:port`
    pub address: String,
    /// The peer's account key
    pub public_key: PublicKey,
}

impl Peer {
    /// Create a peer record
    pub fn new(address: impl Into<String>, public_key: PublicKey) -> Self {
        Self {
            address: address.into(),
            public_key,
        }
    }
}

/// Known peers sorted by address, one entry per address
#[derive(Debug, Clone, Default)]
pub struct PeerList {
    peers: Vec<Peer>,
}

impl PeerList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a list from received peers, keeping the first entry per address
    pub fn from_peers(peers: impl IntoIterator<Item = Peer>) -> Self {
        let mut list = Self::new();
        for peer in peers {
            list.merge(peer);
        }
        list
    }

    /// Add a peer unless its address is already known
    ///
    /// Returns true if the list changed.
    pub fn merge(&mut self, peer: Peer) -> bool {
        match self
            .peers
            .binary_search_by(|p| p.address.as_str().cmp(peer.address.as_str()))
        {
            Ok(_) => false,
            Err(index) => {
                self.peers.insert(index, peer);
                true
            }
        }
    }

    /// The up to `fan_out` peers following `own_address` in ring order
    ///
    /// Never includes `own_address` itself. If `own_address` is not in the
    /// list, the ring starts where it would be inserted.
    pub fn ring_neighbours(&self, own_address: &str, fan_out: usize) -> Vec<Peer> {
        let start = match self
            .peers
            .binary_search_by(|p| p.address.as_str().cmp(own_address))
        {
            Ok(index) => index + 1,
            Err(index) => index,
        };

        let count = self.peers.len();
        (0..count)
            .map(|offset| &self.peers[(start + offset) % count])
            .filter(|peer| peer.address != own_address)
            .take(fan_out)
            .cloned()
            .collect()
    }

    /// All peers in address order
    pub fn as_slice(&self) -> &[Peer] {
        &self.peers
    }

    /// Number of known peers
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether no peer is known
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    fn peer(address: &str) -> Peer {
        Peer::new(address, KeyPair::generate().public_key)
    }

    fn addresses(peers: &[Peer]) -> Vec<&str> {
        peers.iter().map(|p| p.address.as_str()).collect()
    }

    #[test]
    fn test_merge_keeps_sorted_and_unique() {
        let mut list = PeerList::new();
        assert!(list.merge(peer("10.0.0.3:1")));
        assert!(list.merge(peer("10.0.0.1:1")));
        assert!(list.merge(peer("10.0.0.2:1")));
        assert!(!list.merge(peer("10.0.0.2:1")));

        assert_eq!(
            addresses(list.as_slice()),
            vec!["10.0.0.1:1", "10.0.0.2:1", "10.0.0.3:1"]
        );
    }

    #[test]
    fn test_first_announcement_wins() {
        let mut list = PeerList::new();
        let original = peer("a:1");
        list.merge(original.clone());
        list.merge(peer("a:1"));

        assert_eq!(list.as_slice(), &[original]);
    }

    #[test]
    fn test_ring_wraps_around() {
        let list = PeerList::from_peers(["a:1", "b:1", "c:1", "d:1"].map(peer));

        assert_eq!(addresses(&list.ring_neighbours("c:1", 10)), vec!["d:1", "a:1", "b:1"]);
        assert_eq!(addresses(&list.ring_neighbours("c:1", 2)), vec!["d:1", "a:1"]);
    }

    #[test]
    fn test_ring_caps_fan_out() {
        let names: Vec<String> = (0..30).map(|i| format!("node{:02}:1", i)).collect();
        let list = PeerList::from_peers(names.iter().map(|n| peer(n)));

        let neighbours = list.ring_neighbours("node25:1", 10);
        assert_eq!(neighbours.len(), 10);
        assert_eq!(neighbours[0].address, "node26:1");
        assert_eq!(neighbours[9].address, "node05:1");
    }

    #[test]
    fn test_ring_alone_is_empty() {
        let list = PeerList::from_peers([peer("solo:1")]);
        assert!(list.ring_neighbours("solo:1", 10).is_empty());
    }
}
