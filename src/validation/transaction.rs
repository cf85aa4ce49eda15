//! Signed transaction structure and validation
//!
//! Account-based transfers identified by a sender-chosen id. A transaction is
//! valid on its own when the amount is positive and the signature verifies
//! under the sender key; balance checks happen only at replay time.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{CanonicalWriter, Hash, KeyPair, PublicKey, SchnorrSignature};

/// Domain tag for transaction signatures
const TRANSACTION_DOMAIN: &[u8] = b"slot-ledger/transaction";

/// Transaction errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    #[error("Amount must be at least 1")]
    NonPositiveAmount,
    #[error("Signature does not verify under the sender key")]
    InvalidSignature,
    #[error("Sender and recipient are the same account")]
    SelfTransfer,
}

/// A signed transfer of `amount` from `from` to `to`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    /// Globally unique id, `"<sender address>-<seq>"` by convention
    pub id: String,
    /// Sender account
    pub from: PublicKey,
    /// Recipient account
    pub to: PublicKey,
    /// Amount in AU
    pub amount: u64,
    /// Sender's signature over the canonical encoding
    pub signature: SchnorrSignature,
}

impl SignedTransaction {
    /// Create and sign a transaction with the sender's keypair
    pub fn new(id: impl Into<String>, sender: &KeyPair, to: PublicKey, amount: u64) -> Self {
        let id = id.into();
        let from = sender.public_key.clone();
        let digest = signing_hash(&id, &from, &to, amount);
        Self {
            id,
            from,
            to,
            amount,
            signature: sender.sign(&digest),
        }
    }

    /// Digest signed by the sender: canonical `(from, to, id, amount)`
    pub fn signing_hash(&self) -> Hash {
        signing_hash(&self.id, &self.from, &self.to, self.amount)
    }

    /// Verify the sender signature
    pub fn verify_signature(&self) -> bool {
        self.from.verify(&self.signing_hash(), &self.signature)
    }

    /// Stateless validity: positive amount and a verifying signature
    pub fn validate(&self) -> Result<(), TransactionError> {
        if self.amount < 1 {
            return Err(TransactionError::NonPositiveAmount);
        }
        if !self.verify_signature() {
            return Err(TransactionError::InvalidSignature);
        }
        Ok(())
    }

    /// Check validity without the reason
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

fn signing_hash(id: &str, from: &PublicKey, to: &PublicKey, amount: u64) -> Hash {
    let mut writer = CanonicalWriter::new(TRANSACTION_DOMAIN);
    writer
        .put_bytes(&from.0)
        .put_bytes(&to.0)
        .put_str(id)
        .put_u64(amount);
    writer.digest()
}
