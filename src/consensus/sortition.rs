//! Slot lottery
//!
//! A draw is the sender's signature over the slot message `seed + slot`.
//! Its value is SHA-256 over the slot message, the sender's canonical key
//! string and the proof string, read as an unsigned integer and scaled by
//! the premium grant. A draw qualifies when the value reaches the genesis
//! hardness.

use primitive_types::U512;
use rand::Rng;

use crate::constants::PREMIUM_ACCOUNT;
use crate::crypto::{hash_bytes, sha256_bytes, CanonicalWriter, KeyPair, PublicKey, SchnorrSignature};

/// Domain tag for draw signatures
const DRAW_DOMAIN: &[u8] = b"slot-ledger/draw";

/// Canonical bytes of the slot message for `(seed, slot)`
pub fn draw_message(seed: u64, slot: u64) -> Vec<u8> {
    CanonicalWriter::new(DRAW_DOMAIN)
        .put_u64(seed.wrapping_add(slot))
        .finish()
}

/// Compute the sortition proof for a slot
pub fn draw(seed: u64, slot: u64, keypair: &KeyPair) -> SchnorrSignature {
    keypair.sign(&hash_bytes(&draw_message(seed, slot)))
}

/// Check that `proof` is `public_key`'s signature over the slot message
pub fn verify_draw(seed: u64, slot: u64, proof: &SchnorrSignature, public_key: &PublicKey) -> bool {
    public_key.verify(&hash_bytes(&draw_message(seed, slot)), proof)
}

/// Numeric value of a draw
pub fn draw_value(seed: u64, slot: u64, proof: &SchnorrSignature, public_key: &PublicKey) -> U512 {
    let mut preimage = draw_message(seed, slot);
    preimage.extend_from_slice(public_key.to_base58().as_bytes());
    preimage.extend_from_slice(proof.to_hex().as_bytes());

    let digest = sha256_bytes(&preimage);
    U512::from_big_endian(&digest) * U512::from(PREMIUM_ACCOUNT)
}

/// Whether `public_key` may produce the block for `slot`
///
/// Membership is checked first, so a proof from a key outside the
/// electorate is rejected whatever its value.
pub fn is_eligible(
    seed: u64,
    slot: u64,
    proof: &SchnorrSignature,
    public_key: &PublicKey,
    electorate: &[PublicKey],
    hardness: U512,
) -> bool {
    electorate.contains(public_key)
        && verify_draw(seed, slot, proof, public_key)
        && draw_value(seed, slot, proof, public_key) >= hardness
}

/// Largest possible draw value plus one
fn value_range() -> U512 {
    (U512::one() << 256u32) * U512::from(PREMIUM_ACCOUNT)
}

/// Hardness at which roughly one draw in ten qualifies
pub fn default_hardness() -> U512 {
    value_range() / U512::from(10u64) * U512::from(9u64)
}

/// Estimate a hardness by Monte-Carlo sampling
///
/// Each round draws `samples_per_round` consecutive slots with a fresh
/// key and seed, sorts the values descending and keeps the value at the
/// `top_fraction` index. The result is the mean over all rounds.
pub fn calibrate_hardness(rounds: usize, samples_per_round: usize, top_fraction: f64) -> U512 {
    if rounds == 0 || samples_per_round == 0 {
        return default_hardness();
    }

    let fraction = top_fraction.clamp(0.0, 1.0);
    let index = ((samples_per_round as f64 * fraction) as usize).min(samples_per_round - 1);
    let mut rng = rand::thread_rng();
    let mut total = U512::zero();

    for _ in 0..rounds {
        let keypair = KeyPair::generate();
        let seed: u64 = rng.gen();

        let mut values: Vec<U512> = (0..samples_per_round as u64)
            .map(|slot| {
                let proof = draw(seed, slot, &keypair);
                draw_value(seed, slot, &proof, &keypair.public_key)
            })
            .collect();
        values.sort_unstable_by(|a, b| b.cmp(a));

        total = total.saturating_add(values[index]);
    }

    total / U512::from(rounds as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_is_deterministic() {
        let keypair = KeyPair::generate();
        assert_eq!(draw(42, 1, &keypair), draw(42, 1, &keypair));
    }

    #[test]
    fn test_draw_message_uses_seed_plus_slot() {
        assert_eq!(draw_message(40, 2), draw_message(41, 1));
        assert_ne!(draw_message(42, 1), draw_message(42, 2));
    }

    #[test]
    fn test_zero_hardness_accepts_member() {
        let king = KeyPair::generate();
        let proof = draw(42, 1, &king);
        let electorate = vec![king.public_key.clone()];

        assert!(is_eligible(42, 1, &proof, &king.public_key, &electorate, U512::zero()));
    }

    #[test]
    fn test_non_member_rejected_regardless_of_value() {
        let king = KeyPair::generate();
        let outsider = KeyPair::generate();
        let proof = draw(42, 1, &outsider);
        let electorate = vec![king.public_key.clone()];

        assert!(verify_draw(42, 1, &proof, &outsider.public_key));
        assert!(!is_eligible(42, 1, &proof, &outsider.public_key, &electorate, U512::zero()));
    }

    #[test]
    fn test_proof_for_other_slot_rejected() {
        let king = KeyPair::generate();
        let proof = draw(42, 1, &king);
        let electorate = vec![king.public_key.clone()];

        assert!(!is_eligible(42, 2, &proof, &king.public_key, &electorate, U512::zero()));
    }

    #[test]
    fn test_proof_from_other_key_rejected() {
        let king = KeyPair::generate();
        let other = KeyPair::generate();
        let proof = draw(42, 1, &other);
        let electorate = vec![king.public_key.clone(), other.public_key.clone()];

        assert!(!is_eligible(42, 1, &proof, &king.public_key, &electorate, U512::zero()));
    }

    #[test]
    fn test_value_below_range() {
        let king = KeyPair::generate();
        for slot in 0..20 {
            let proof = draw(7, slot, &king);
            assert!(draw_value(7, slot, &proof, &king.public_key) < value_range());
        }
    }

    #[test]
    fn test_default_hardness_admits_about_a_tenth() {
        let king = KeyPair::generate();
        let hardness = default_hardness();
        let samples = 2_000u64;

        let qualifying = (0..samples)
            .filter(|&slot| {
                let proof = draw(9, slot, &king);
                draw_value(9, slot, &proof, &king.public_key) >= hardness
            })
            .count();

        assert!(qualifying > 100 && qualifying < 300, "qualifying = {}", qualifying);
    }

    #[test]
    fn test_calibration_near_default() {
        let calibrated = calibrate_hardness(5, 200, 0.1);
        let range = value_range();

        assert!(calibrated > range / U512::from(100u64) * U512::from(80u64));
        assert!(calibrated < range);
    }

    #[test]
    fn test_calibration_without_samples_falls_back() {
        assert_eq!(calibrate_hardness(0, 100, 0.1), default_hardness());
    }
}
