//! Merkle Node Hashing
//!
//! The commitment trees are generic over the function that combines two
//! children into their parent. Two hashers exist:
//!
//! ```text
//! PoseidonHasher  legacy tree   (cleartext + confidential-v0 leaves)
//! Blake3Hasher    v1 tree       (confidential-v1a + confidential-v1b leaves)
//! ```
//!
//! Empty subtrees are never materialised: `empty_roots(depth)[k]` is the
//! root of an all-empty subtree of height `k` (index 0 is the empty leaf).

use ark_bls12_381::Fr;
use ark_crypto_primitives::sponge::{CryptographicSponge, poseidon::PoseidonSponge};
use ark_ff::PrimeField;

use crate::commitment::{field_to_bytes, poseidon_config};

/// Binary node combiner used by the commitment trees
pub trait NodeHasher: Send + Sync {
    /// Hash two children to get parent
    fn combine(&self, left: &[u8; 32], right: &[u8; 32]) -> [u8; 32];

    /// Value of an unoccupied leaf
    fn empty_leaf(&self) -> [u8; 32];

    /// Empty subtree roots for heights `0..=depth`
    fn empty_roots(&self, depth: usize) -> Vec<[u8; 32]> {
        let mut roots = Vec::with_capacity(depth + 1);
        let mut current = self.empty_leaf();
        roots.push(current);
        for _ in 0..depth {
            current = self.combine(&current, &current);
            roots.push(current);
        }
        roots
    }
}

/// Poseidon-based Merkle hash function
#[derive(Debug, Default, Clone, Copy)]
pub struct PoseidonHasher;

impl NodeHasher for PoseidonHasher {
    fn combine(&self, left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
        let mut sponge = PoseidonSponge::new(poseidon_config());

        sponge.absorb(&Fr::from_le_bytes_mod_order(left));
        sponge.absorb(&Fr::from_le_bytes_mod_order(right));

        let result: Fr = sponge.squeeze_field_elements(1)[0];
        field_to_bytes(result)
    }

    fn empty_leaf(&self) -> [u8; 32] {
        let mut sponge = PoseidonSponge::new(poseidon_config());
        sponge.absorb(&Fr::from(0u64));
        let result: Fr = sponge.squeeze_field_elements(1)[0];
        field_to_bytes(result)
    }
}

/// blake3-based Merkle hash function
#[derive(Debug, Default, Clone, Copy)]
pub struct Blake3Hasher;

impl NodeHasher for Blake3Hasher {
    fn combine(&self, left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new_derive_key("shroud merkle node v1");
        hasher.update(left);
        hasher.update(right);
        *hasher.finalize().as_bytes()
    }

    fn empty_leaf(&self) -> [u8; 32] {
        [0u8; 32]
    }
}

/// Recompute a root from a leaf, its position inside the epoch and the
/// sibling path (leaf level first).
///
/// Bit `k` of `position` tells whether the running node is a right child at
/// level `k`.
pub fn compute_root(
    hasher: &dyn NodeHasher,
    leaf: &[u8; 32],
    position: u64,
    siblings: &[[u8; 32]],
) -> [u8; 32] {
    let mut current = *leaf;
    let mut index = position;

    for sibling in siblings {
        current = if index & 1 == 1 {
            hasher.combine(sibling, &current)
        } else {
            hasher.combine(&current, sibling)
        };
        index >>= 1;
    }

    current
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_roots_chain() {
        let hasher = PoseidonHasher;
        let roots = hasher.empty_roots(4);
        assert_eq!(roots.len(), 5);
        assert_eq!(roots[0], hasher.empty_leaf());
        for k in 1..roots.len() {
            assert_eq!(roots[k], hasher.combine(&roots[k - 1], &roots[k - 1]));
        }
    }

    #[test]
    fn test_hashers_disagree() {
        let l = [1u8; 32];
        let r = [2u8; 32];
        assert_ne!(PoseidonHasher.combine(&l, &r), Blake3Hasher.combine(&l, &r));
    }

    #[test]
    fn test_combine_is_ordered() {
        let l = [1u8; 32];
        let r = [2u8; 32];
        assert_ne!(Blake3Hasher.combine(&l, &r), Blake3Hasher.combine(&r, &l));
        assert_ne!(PoseidonHasher.combine(&l, &r), PoseidonHasher.combine(&r, &l));
    }

    #[test]
    fn test_compute_root_two_leaves() {
        let hasher = Blake3Hasher;
        let empty = hasher.empty_roots(2);
        let a = [10u8; 32];
        let b = [11u8; 32];

        let ab = hasher.combine(&a, &b);
        let root = hasher.combine(&ab, &empty[1]);

        assert_eq!(compute_root(&hasher, &a, 0, &[b, empty[1]]), root);
        assert_eq!(compute_root(&hasher, &b, 1, &[a, empty[1]]), root);
        assert_ne!(compute_root(&hasher, &b, 0, &[a, empty[1]]), root);
    }
}
