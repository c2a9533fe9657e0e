//! Nullifiers
//!
//! Implements nullifier derivation for double-spend prevention.
//!
//! ```text
//! nk        = Poseidon("ShroudNK", spend_seed)
//! Nullifier = Poseidon(domain, nk, root_commitment, position)
//! ```
//!
//! Each spendable generation has its own domain, so the same output can
//! never be nullified twice under two different derivations.

use ark_bls12_381::Fr;
use ark_crypto_primitives::sponge::{CryptographicSponge, poseidon::PoseidonSponge};
use ark_ff::PrimeField;
use serde::{Deserialize, Serialize};

use crate::commitment::{Commitment, field_to_bytes, poseidon_config};

/// A nullifier (32 bytes) - unique tag for a spent output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Nullifier(pub [u8; 32]);

impl Nullifier {
    /// Create from field element
    pub fn from_field(f: Fr) -> Self {
        Self(field_to_bytes(f))
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Nullifier {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Derivation path of a nullifier, one per spendable generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NullifierDomain {
    /// Cleartext and confidential-v0 outputs
    V0,
    /// Confidential-v1a outputs
    V1a,
    /// Confidential-v1b outputs
    V1b,
}

impl NullifierDomain {
    fn tag(self) -> u64 {
        match self {
            NullifierDomain::V0 => 0x4e554c4c,  // "NULL"
            NullifierDomain::V1a => 0x4e554c41, // "NULA"
            NullifierDomain::V1b => 0x4e554c42, // "NULB"
        }
    }
}

/// Nullifier derivation key
///
/// Knowledge of this key is required to derive valid nullifiers.
#[derive(Debug, Clone)]
pub struct NullifierKey {
    nk: [u8; 32],
}

impl NullifierKey {
    /// Derive the nullifier key from a spend seed
    pub fn from_spend_seed(seed: &[u8; 32]) -> Self {
        let mut sponge = PoseidonSponge::new(poseidon_config());

        let domain = Fr::from_le_bytes_mod_order(b"ShroudNK");
        sponge.absorb(&domain);
        sponge.absorb(&Fr::from_le_bytes_mod_order(seed));

        let result: Fr = sponge.squeeze_field_elements(1)[0];
        Self {
            nk: field_to_bytes(result),
        }
    }

    /// Create from raw derived key bytes
    pub fn from_bytes(nk: [u8; 32]) -> Self {
        Self { nk }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.nk
    }

    /// Derive the nullifier of an output
    ///
    /// # Arguments
    /// * `domain` - Generation of the spent output
    /// * `root_cm` - The output's leaf value (commitment bound to position)
    /// * `position` - Sequential position of the output in its tree
    pub fn derive(&self, domain: NullifierDomain, root_cm: &Commitment, position: u64) -> Nullifier {
        let mut sponge = PoseidonSponge::new(poseidon_config());

        sponge.absorb(&Fr::from(domain.tag()));
        sponge.absorb(&Fr::from_le_bytes_mod_order(&self.nk));
        sponge.absorb(&root_cm.to_field());
        sponge.absorb(&Fr::from(position));

        let result: Fr = sponge.squeeze_field_elements(1)[0];
        Nullifier::from_field(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nullifier_deterministic() {
        let key = NullifierKey::from_spend_seed(&[1u8; 32]);
        let root_cm = Commitment([2u8; 32]);

        let n1 = key.derive(NullifierDomain::V0, &root_cm, 100);
        let n2 = key.derive(NullifierDomain::V0, &root_cm, 100);

        assert_eq!(n1, n2, "same inputs should produce same nullifier");
    }

    #[test]
    fn test_nullifier_requires_key() {
        let key1 = NullifierKey::from_spend_seed(&[1u8; 32]);
        let key2 = NullifierKey::from_spend_seed(&[2u8; 32]);
        let root_cm = Commitment([3u8; 32]);

        assert_ne!(
            key1.derive(NullifierDomain::V0, &root_cm, 0),
            key2.derive(NullifierDomain::V0, &root_cm, 0),
            "different keys should produce different nullifiers"
        );
    }

    #[test]
    fn test_domains_produce_distinct_nullifiers() {
        let key = NullifierKey::from_spend_seed(&[1u8; 32]);
        let root_cm = Commitment([2u8; 32]);

        let v0 = key.derive(NullifierDomain::V0, &root_cm, 7);
        let v1a = key.derive(NullifierDomain::V1a, &root_cm, 7);
        let v1b = key.derive(NullifierDomain::V1b, &root_cm, 7);

        assert_ne!(v0, v1a);
        assert_ne!(v1a, v1b);
        assert_ne!(v0, v1b);
    }

    #[test]
    fn test_position_affects_nullifier() {
        let key = NullifierKey::from_spend_seed(&[1u8; 32]);
        let root_cm = Commitment([2u8; 32]);

        assert_ne!(
            key.derive(NullifierDomain::V1a, &root_cm, 0),
            key.derive(NullifierDomain::V1a, &root_cm, 1),
        );
    }
}
