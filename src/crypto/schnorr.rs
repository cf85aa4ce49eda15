//! Schnorr signature implementation
//!
//! Uses the secp256k1 curve with BIP-340 Schnorr signatures for transaction,
//! block and draw signing. Signing is deterministic: the same key and message
//! always give the same signature.

use k256::schnorr::signature::{Signer, Verifier};
use k256::schnorr::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::Hash;

/// Signature errors
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("Invalid signature encoding")]
    InvalidSignature,
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid private key")]
    InvalidPrivateKey,
}

/// 32-byte private key
#[derive(Clone)]
pub struct PrivateKey(SigningKey);

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey([REDACTED])")
    }
}

/// 32-byte public key (x-only for Schnorr)
///
/// The canonical string form is Base58 and doubles as the account
/// identifier on the ledger.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey(pub [u8; 32]);

/// 64-byte Schnorr signature
///
/// The canonical string form is lowercase hex. Ordering is byte order,
/// which matches the ordering of the hex strings.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchnorrSignature(pub [u8; 64]);

impl PrivateKey {
    /// Generate a new random private key
    pub fn generate() -> Self {
        PrivateKey(SigningKey::random(&mut OsRng))
    }

    /// Create from 32 bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, SignatureError> {
        SigningKey::from_bytes(bytes)
            .map(PrivateKey)
            .map_err(|_| SignatureError::InvalidPrivateKey)
    }

    /// Get the corresponding public key
    pub fn public_key(&self) -> PublicKey {
        let bytes = self.0.verifying_key().to_bytes();
        PublicKey(bytes.into())
    }

    /// Sign a message digest
    pub fn sign(&self, message: &Hash) -> SchnorrSignature {
        let signature: Signature = self.0.sign(&message.0);
        SchnorrSignature(signature.to_bytes())
    }

    /// Export to bytes
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes().into()
    }
}

impl PublicKey {
    /// Create from 32 bytes, rejecting points that are not on the curve
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, SignatureError> {
        VerifyingKey::from_bytes(bytes).map_err(|_| SignatureError::InvalidPublicKey)?;
        Ok(PublicKey(*bytes))
    }

    /// Verify a signature over a message digest
    pub fn verify(&self, message: &Hash, signature: &SchnorrSignature) -> bool {
        let verifying_key = match VerifyingKey::from_bytes(&self.0) {
            Ok(vk) => vk,
            Err(_) => return false,
        };

        let sig = match Signature::try_from(signature.0.as_slice()) {
            Ok(s) => s,
            Err(_) => return false,
        };

        verifying_key.verify(&message.0, &sig).is_ok()
    }

    /// Canonical string form (Base58)
    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }

    /// Short prefix of the canonical string, for logs
    pub fn short(&self) -> String {
        self.to_base58().chars().take(10).collect()
    }
}

impl SchnorrSignature {
    /// Create from 64 bytes
    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        SchnorrSignature(*bytes)
    }

    /// Canonical string form (hex)
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse the canonical hex form
    pub fn from_hex(s: &str) -> Result<Self, SignatureError> {
        let bytes = hex::decode(s).map_err(|_| SignatureError::InvalidSignature)?;
        let arr: [u8; 64] = bytes
            .try_into()
            .map_err(|_| SignatureError::InvalidSignature)?;
        Ok(SchnorrSignature(arr))
    }

    /// Short prefix of the canonical string, for logs
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_base58())
    }
}

impl FromStr for PublicKey {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|_| SignatureError::InvalidPublicKey)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| SignatureError::InvalidPublicKey)?;
        PublicKey::from_bytes(&arr)
    }
}

impl fmt::Display for SchnorrSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for SchnorrSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.short())
    }
}

impl FromStr for SchnorrSignature {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SchnorrSignature::from_hex(s)
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base58())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for SchnorrSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SchnorrSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A node identity: private key plus its public key
#[derive(Debug, Clone)]
pub struct KeyPair {
    private_key: PrivateKey,
    /// Public key (account identifier)
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        Self::from_private_key(PrivateKey::generate())
    }

    /// Wrap an existing private key
    pub fn from_private_key(private_key: PrivateKey) -> Self {
        let public_key = private_key.public_key();
        Self {
            private_key,
            public_key,
        }
    }

    /// Import from a hex-encoded 32-byte secret
    pub fn from_secret_hex(secret: &str) -> Result<Self, SignatureError> {
        let bytes = hex::decode(secret.trim()).map_err(|_| SignatureError::InvalidPrivateKey)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| SignatureError::InvalidPrivateKey)?;
        Ok(Self::from_private_key(PrivateKey::from_bytes(&arr)?))
    }

    /// Export the secret as hex
    pub fn secret_hex(&self) -> String {
        hex::encode(self.private_key.to_bytes())
    }

    /// Sign a message digest
    pub fn sign(&self, message: &Hash) -> SchnorrSignature {
        self.private_key.sign(message)
    }

    /// Borrow the private key
    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash_bytes;

    #[test]
    fn test_sign_verify() {
        let private = PrivateKey::generate();
        let public = private.public_key();

        let message = hash_bytes(b"test message");
        let signature = private.sign(&message);

        assert!(public.verify(&message, &signature));
    }

    #[test]
    fn test_signing_is_deterministic() {
        let private = PrivateKey::generate();
        let message = hash_bytes(b"slot 7");

        assert_eq!(private.sign(&message), private.sign(&message));
    }

    #[test]
    fn test_wrong_key_fails() {
        let private1 = PrivateKey::generate();
        let public2 = PrivateKey::generate().public_key();

        let message = hash_bytes(b"test message");
        let signature = private1.sign(&message);

        assert!(!public2.verify(&message, &signature));
    }

    #[test]
    fn test_wrong_message_fails() {
        let private = PrivateKey::generate();
        let public = private.public_key();

        let signature = private.sign(&hash_bytes(b"message 1"));

        assert!(!public.verify(&hash_bytes(b"message 2"), &signature));
    }

    #[test]
    fn test_public_key_string_form() {
        let public = PrivateKey::generate().public_key();
        let text = public.to_string();
        let parsed: PublicKey = text.parse().unwrap();

        assert_eq!(parsed, public);
        assert!("not-base58-0OIl".parse::<PublicKey>().is_err());
    }

    #[test]
    fn test_signature_ordering_matches_hex_ordering() {
        let a = SchnorrSignature([0x0a; 64]);
        let b = SchnorrSignature([0xa0; 64]);

        assert!(a < b);
        assert!(a.to_hex() < b.to_hex());
    }

    #[test]
    fn test_keypair_secret_import() {
        let kp1 = KeyPair::generate();
        let kp2 = KeyPair::from_secret_hex(&kp1.secret_hex()).unwrap();

        assert_eq!(kp1.public_key, kp2.public_key);
        assert!(KeyPair::from_secret_hex("abcd").is_err());
    }

    #[test]
    fn test_serde_uses_canonical_strings() {
        let kp = KeyPair::generate();
        let json = serde_json::to_string(&kp.public_key).unwrap();

        assert_eq!(json, format!("\"{}\"", kp.public_key));

        let sig = kp.sign(&hash_bytes(b"x"));
        let json = serde_json::to_string(&sig).unwrap();
        let back: SchnorrSignature = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sig);
    }
}
