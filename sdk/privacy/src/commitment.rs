//! Output Commitments
//!
//! Poseidon-based commitments for every output generation.
//!
//! ```text
//! Cleartext:   C  = Poseidon("CLR0", H(asset || memo), owner_id)
//! Confidential C  = Poseidon(domain, asset_cm, owner_id, ephemeral_pk)
//! Leaf value:  RC = Poseidon("ROOT", position, C)
//! ```
//!
//! The confidential domain separates the three confidential generations so a
//! commitment produced for one can never be replayed as another.

use ark_bls12_381::Fr;
use ark_crypto_primitives::sponge::{
    CryptographicSponge,
    poseidon::{PoseidonConfig, PoseidonSponge, find_poseidon_ark_and_mds},
};
use ark_ff::{BigInteger, PrimeField};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// A 32-byte output commitment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Commitment(pub [u8; 32]);

impl Commitment {
    /// Create commitment from field element
    pub fn from_field(f: Fr) -> Self {
        Self(field_to_bytes(f))
    }

    /// Convert to field element
    pub fn to_field(&self) -> Fr {
        Fr::from_le_bytes_mod_order(&self.0)
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl AsRef<[u8]> for Commitment {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Domain tag of a confidential output generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordDomain {
    V0,
    V1a,
    V1b,
}

impl RecordDomain {
    fn tag(self) -> u64 {
        match self {
            RecordDomain::V0 => 0x4f555430,  // "OUT0"
            RecordDomain::V1a => 0x4f555441, // "OUTA"
            RecordDomain::V1b => 0x4f555442, // "OUTB"
        }
    }
}

const CLEARTEXT_TAG: u64 = 0x434c5230; // "CLR0"
const ROOT_TAG: u64 = 0x524f4f54; // "ROOT"

/// Commitment scheme using Poseidon hash
pub struct CommitmentScheme {
    config: &'static PoseidonConfig<Fr>,
}

impl CommitmentScheme {
    pub fn new() -> Self {
        Self {
            config: poseidon_config(),
        }
    }

    /// Commit to a cleartext output: the asset and memo are public, so they
    /// are digested rather than hidden.
    pub fn commit_cleartext(&self, asset_bytes: &[u8], memo: &[u8], owner_id: &[u8; 32]) -> Commitment {
        let mut digest = blake3::Hasher::new_derive_key("shroud cleartext output v1");
        digest.update(&(asset_bytes.len() as u64).to_le_bytes());
        digest.update(asset_bytes);
        digest.update(memo);

        let mut sponge = PoseidonSponge::new(self.config);
        sponge.absorb(&Fr::from(CLEARTEXT_TAG));
        sponge.absorb(&Fr::from_le_bytes_mod_order(digest.finalize().as_bytes()));
        sponge.absorb(&Fr::from_le_bytes_mod_order(owner_id));

        let result: Fr = sponge.squeeze_field_elements(1)[0];
        Commitment::from_field(result)
    }

    /// Commit to a confidential output of the given generation
    ///
    /// # Arguments
    /// * `asset_cm` - Pedersen commitment to the hidden asset
    /// * `owner_id` - Recipient address id
    /// * `ephemeral_pk` - Public value the recipient uses to decrypt
    pub fn commit_confidential(
        &self,
        domain: RecordDomain,
        asset_cm: &[u8; 32],
        owner_id: &[u8; 32],
        ephemeral_pk: &[u8; 32],
    ) -> Commitment {
        let mut sponge = PoseidonSponge::new(self.config);

        sponge.absorb(&Fr::from(domain.tag()));
        sponge.absorb(&Fr::from_le_bytes_mod_order(asset_cm));
        sponge.absorb(&Fr::from_le_bytes_mod_order(owner_id));
        sponge.absorb(&Fr::from_le_bytes_mod_order(ephemeral_pk));

        let result: Fr = sponge.squeeze_field_elements(1)[0];
        Commitment::from_field(result)
    }

    /// Bind a commitment to its sequential position; the result is the
    /// value stored as a tree leaf.
    pub fn root_commitment(&self, position: u64, commitment: &Commitment) -> Commitment {
        let mut sponge = PoseidonSponge::new(self.config);

        sponge.absorb(&Fr::from(ROOT_TAG));
        sponge.absorb(&Fr::from(position));
        sponge.absorb(&commitment.to_field());

        let result: Fr = sponge.squeeze_field_elements(1)[0];
        Commitment::from_field(result)
    }
}

impl Default for CommitmentScheme {
    fn default() -> Self {
        Self::new()
    }
}

/// Little-endian canonical bytes of a field element
pub(crate) fn field_to_bytes(f: Fr) -> [u8; 32] {
    let bytes = f.into_bigint().to_bytes_le();
    let mut arr = [0u8; 32];
    arr[..bytes.len()].copy_from_slice(&bytes);
    arr
}

static POSEIDON: OnceLock<PoseidonConfig<Fr>> = OnceLock::new();

/// Poseidon configuration shared by every hash in this crate
///
/// Field: BLS12-381 Fr (255 bits)
/// Rate: 2, Capacity: 1
/// Security: 128 bits
pub(crate) fn poseidon_config() -> &'static PoseidonConfig<Fr> {
    POSEIDON.get_or_init(|| {
        let prime_bits: u64 = 255;
        let rate: usize = 2;
        let capacity: usize = 1;
        let full_rounds: u64 = 8;
        let partial_rounds: u64 = 57;
        let alpha: u64 = 5;
        let skip_matrices: u64 = 0;

        let (ark, mds) = find_poseidon_ark_and_mds::<Fr>(
            prime_bits,
            rate,
            full_rounds,
            partial_rounds,
            skip_matrices,
        );

        PoseidonConfig::new(
            full_rounds as usize,
            partial_rounds as usize,
            alpha,
            mds,
            ark,
            rate,
            capacity,
        )
    })
}
