//! Account ledger
//!
//! A plain balance map. It is never persisted: every snapshot is rebuilt by
//! replaying the canonical chain.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::crypto::PublicKey;
use crate::validation::SignedTransaction;

/// Mapping from account to balance
///
/// Accounts are kept ordered so two ledgers with equal contents serialize
/// to identical bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    accounts: BTreeMap<PublicKey, u64>,
}

impl Ledger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a starting balance the first time an account is seen
    ///
    /// Later calls for the same account are no-ops.
    pub fn initialize(&mut self, account: &PublicKey, amount: u64) {
        self.accounts.entry(account.clone()).or_insert(amount);
    }

    /// Add to an account balance
    pub fn credit(&mut self, account: &PublicKey, amount: u64) {
        let balance = self.accounts.entry(account.clone()).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    /// Balance of an account; unseen accounts hold zero
    pub fn balance(&self, account: &PublicKey) -> u64 {
        self.accounts.get(account).copied().unwrap_or(0)
    }

    /// Apply one transaction
    ///
    /// Returns false and leaves the ledger untouched if the transaction is
    /// invalid or the sender cannot cover the amount.
    pub fn apply(&mut self, tx: &SignedTransaction) -> bool {
        if !tx.is_valid() {
            return false;
        }

        let from_balance = self.balance(&tx.from);
        let Some(remaining) = from_balance.checked_sub(tx.amount) else {
            return false;
        };
        if tx.from != tx.to && self.balance(&tx.to).checked_add(tx.amount).is_none() {
            return false;
        }

        self.accounts.insert(tx.from.clone(), remaining);
        self.credit(&tx.to, tx.amount);
        true
    }

    /// Iterate accounts in key order
    pub fn iter(&self) -> impl Iterator<Item = (&PublicKey, &u64)> {
        self.accounts.iter()
    }

    /// Number of known accounts
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Whether no account is known
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Sum of all balances
    pub fn total_supply(&self) -> u128 {
        self.accounts.values().map(|&b| b as u128).sum()
    }
}
