//! Transaction pool
//!
//! Every valid transaction the node has seen, keyed by id. Nothing is ever
//! evicted: blocks reference transactions by id, so replay needs them all.

use std::collections::{HashMap, HashSet};

use super::TransactionLookup;
use crate::validation::{SignedTransaction, TransactionError};

/// Known transactions in arrival order
#[derive(Debug, Default)]
pub struct TransactionPool {
    known: HashMap<String, SignedTransaction>,
    order: Vec<String>,
}

impl TransactionPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transaction
    ///
    /// Returns `Ok(true)` the first time an id is seen and `Ok(false)` for
    /// repeats. The first transaction seen under an id wins.
    pub fn insert(&mut self, tx: SignedTransaction) -> Result<bool, TransactionError> {
        if self.known.contains_key(&tx.id) {
            return Ok(false);
        }
        tx.validate()?;

        self.order.push(tx.id.clone());
        self.known.insert(tx.id.clone(), tx);
        Ok(true)
    }

    /// Look up a transaction by id
    pub fn get(&self, id: &str) -> Option<&SignedTransaction> {
        self.known.get(id)
    }

    /// Whether an id is known
    pub fn contains(&self, id: &str) -> bool {
        self.known.contains_key(id)
    }

    /// Ids not yet covered by `included`, in arrival order
    pub fn pending_excluding(&self, included: &HashSet<String>) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| !included.contains(*id))
            .cloned()
            .collect()
    }

    /// Number of known transactions
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the pool is empty
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl TransactionLookup for TransactionPool {
    fn transaction(&self, id: &str) -> Option<&SignedTransaction> {
        self.get(id)
    }
}
