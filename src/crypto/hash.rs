//! Hashing primitives
//!
//! Signed payloads are reduced to a BLAKE3 digest before signing.
//! Draw values use SHA-256 so the lottery output is independent of the
//! signing digest.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// 32-byte hash output
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// Create a zero hash
    pub const fn zero() -> Self {
        Hash([0u8; 32])
    }

    /// Create hash from hex string
    pub fn from_hex(hex: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(hex)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Hash(arr))
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Default for Hash {
    fn default() -> Self {
        Self::zero()
    }
}

/// Hash arbitrary bytes using BLAKE3
pub fn hash_bytes(data: &[u8]) -> Hash {
    let hash = blake3::hash(data);
    Hash(*hash.as_bytes())
}

/// SHA-256 of arbitrary bytes
pub fn sha256_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Builder for canonical, length-prefixed signing payloads.
///
/// Every field is prefixed with its length so that no two distinct field
/// sequences encode to the same bytes.
#[derive(Debug, Default)]
pub struct CanonicalWriter {
    bytes: Vec<u8>,
}

impl CanonicalWriter {
    /// Start a payload with a domain tag
    pub fn new(domain: &[u8]) -> Self {
        let mut writer = Self { bytes: Vec::new() };
        writer.put_bytes(domain);
        writer
    }

    /// Append a length-prefixed byte string
    pub fn put_bytes(&mut self, data: &[u8]) -> &mut Self {
        self.bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
        self.bytes.extend_from_slice(data);
        self
    }

    /// Append a length-prefixed UTF-8 string
    pub fn put_str(&mut self, data: &str) -> &mut Self {
        self.put_bytes(data.as_bytes())
    }

    /// Append a fixed-width integer
    pub fn put_u64(&mut self, value: u64) -> &mut Self {
        self.bytes.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Finish and return the payload
    pub fn finish(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    /// Finish and digest the payload
    pub fn digest(&self) -> Hash {
        hash_bytes(&self.bytes)
    }
}
