//! Asset Commitments and Balance Signatures
//!
//! Homomorphic Pedersen commitments on the Jubjub curve.
//!
//! ```text
//! asset_cm = amount·G(currency) + G(category, serial) + r·H
//!
//! Σ in_cm − Σ out_cm − fee_cm = (Σ r_in − Σ r_out)·H = bcr·H
//! ```
//!
//! When every currency and ticket balances, the difference of the commitment
//! sums is a multiple of `H` alone. The builder proves it knows that multiple
//! (`bcr`) with a Schnorr signature over the transaction's signing hash:
//!
//! ```text
//! R = k·H                      correction_factor
//! e = H(R, P, msg)
//! s = k + e·bcr                correction_signature
//! verify: s·H == R + e·P
//! ```
//!
//! Any residual value leaves a component outside `⟨H⟩`, so no valid
//! signature exists for an unbalanced transaction.

use ark_ec::{AffineRepr, CurveGroup};
use ark_ed_on_bls12_381::{EdwardsAffine, EdwardsProjective, Fr as Scalar};
use ark_ff::{BigInteger, PrimeField};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_std::Zero;
use serde::{Deserialize, Serialize};

use crate::asset::Asset;
use crate::error::{PrivacyError, Result};

const MAX_HASH_TO_CURVE_ATTEMPTS: u32 = 256;

/// Compressed Jubjub point committing to an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetCommitment(pub [u8; 32]);

impl AssetCommitment {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn to_point(self) -> Result<EdwardsAffine> {
        decode_point(&self.0)
    }
}

/// Aggregate signature proving the commitments net to zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceProof {
    pub correction_factor: [u8; 32],
    pub correction_signature: [u8; 32],
}

/// Commit to an asset under the given blinding factor
pub fn commit_asset(asset: &Asset, blinding: &[u8; 32]) -> Result<AssetCommitment> {
    let point = asset_point(asset, blinding)?;
    Ok(AssetCommitment(encode_point(&point.into_affine())?))
}

/// Net blinding factor `Σ inputs − Σ outputs`, as scalar bytes
pub fn net_blinding(inputs: &[[u8; 32]], outputs: &[[u8; 32]]) -> [u8; 32] {
    let mut acc = Scalar::zero();
    for r in inputs {
        acc += Scalar::from_le_bytes_mod_order(r);
    }
    for r in outputs {
        acc -= Scalar::from_le_bytes_mod_order(r);
    }
    scalar_to_bytes(acc)
}

/// Sign the balance of a set of commitments with the net blinding `bcr`
pub fn sign_balance(
    inputs: &[AssetCommitment],
    outputs: &[AssetCommitment],
    fee: &AssetCommitment,
    bcr: &[u8; 32],
    msg: &[u8; 32],
) -> Result<BalanceProof> {
    let h = blinding_generator()?;
    let p = encode_point(&balance_point(inputs, outputs, fee)?)?;
    let secret = Scalar::from_le_bytes_mod_order(bcr);

    let mut nonce = blake3::Hasher::new_derive_key("shroud balance nonce v1");
    nonce.update(bcr);
    nonce.update(&p);
    nonce.update(msg);
    let k = wide_scalar(nonce);

    let r = encode_point(&(h * k).into_affine())?;
    let e = challenge(&r, &p, msg);
    let s = k + e * secret;

    Ok(BalanceProof {
        correction_factor: r,
        correction_signature: scalar_to_bytes(s),
    })
}

/// Check a balance signature against the commitments it covers
pub fn verify_balance(
    inputs: &[AssetCommitment],
    outputs: &[AssetCommitment],
    fee: &AssetCommitment,
    proof: &BalanceProof,
    msg: &[u8; 32],
) -> Result<bool> {
    let h = blinding_generator()?;
    let p_point = balance_point(inputs, outputs, fee)?;
    let p = encode_point(&p_point)?;
    let r = decode_point(&proof.correction_factor)?;
    let s = Scalar::from_le_bytes_mod_order(&proof.correction_signature);
    if scalar_to_bytes(s) != proof.correction_signature {
        return Ok(false);
    }

    let e = challenge(&proof.correction_factor, &p, msg);
    let lhs = h * s;
    let rhs = r.into_group() + p_point * e;
    Ok(lhs == rhs)
}

// ============================================================================
// Curve helpers
// ============================================================================

fn asset_point(asset: &Asset, blinding: &[u8; 32]) -> Result<EdwardsProjective> {
    let mut acc = EdwardsProjective::zero();

    if let Some(token) = &asset.token {
        let g = hash_to_curve("shroud token generator v1", &[&token.currency])?;
        acc += g * Scalar::from(token.amount);
    }
    if let Some(ticket) = &asset.ticket {
        let g = hash_to_curve(
            "shroud ticket generator v1",
            &[&ticket.category, &ticket.serial],
        )?;
        acc += g.into_group();
    }

    let h = blinding_generator()?;
    acc += h * Scalar::from_le_bytes_mod_order(blinding);
    Ok(acc)
}

fn balance_point(
    inputs: &[AssetCommitment],
    outputs: &[AssetCommitment],
    fee: &AssetCommitment,
) -> Result<EdwardsAffine> {
    let mut acc = EdwardsProjective::zero();
    for cm in inputs {
        acc += cm.to_point()?.into_group();
    }
    for cm in outputs {
        acc -= cm.to_point()?.into_group();
    }
    acc -= fee.to_point()?.into_group();
    Ok(acc.into_affine())
}

fn blinding_generator() -> Result<EdwardsAffine> {
    hash_to_curve("shroud blinding generator v1", &[])
}

/// Try-and-increment hash to the prime-order subgroup
fn hash_to_curve(domain: &str, parts: &[&[u8]]) -> Result<EdwardsAffine> {
    for counter in 0..MAX_HASH_TO_CURVE_ATTEMPTS {
        let mut hasher = blake3::Hasher::new_derive_key(domain);
        for part in parts {
            hasher.update(part);
        }
        hasher.update(&counter.to_le_bytes());

        if let Some(point) = EdwardsAffine::from_random_bytes(hasher.finalize().as_bytes()) {
            let point = point.clear_cofactor();
            if !AffineRepr::is_zero(&point) {
                return Ok(point);
            }
        }
    }
    Err(PrivacyError::GeneratorDerivation(domain.to_string()))
}

fn challenge(r: &[u8; 32], p: &[u8; 32], msg: &[u8; 32]) -> Scalar {
    let mut hasher = blake3::Hasher::new_derive_key("shroud balance challenge v1");
    hasher.update(r);
    hasher.update(p);
    hasher.update(msg);
    wide_scalar(hasher)
}

/// Reduce 64 bytes of hash output into a uniformly distributed scalar
fn wide_scalar(hasher: blake3::Hasher) -> Scalar {
    let mut wide = [0u8; 64];
    hasher.finalize_xof().fill(&mut wide);
    Scalar::from_le_bytes_mod_order(&wide)
}

fn scalar_to_bytes(s: Scalar) -> [u8; 32] {
    let bytes = s.into_bigint().to_bytes_le();
    let mut arr = [0u8; 32];
    arr[..bytes.len()].copy_from_slice(&bytes);
    arr
}

fn encode_point(point: &EdwardsAffine) -> Result<[u8; 32]> {
    let mut buf = Vec::with_capacity(32);
    point
        .serialize_compressed(&mut buf)
        .map_err(|e| PrivacyError::SerializationError(e.to_string()))?;
    buf.try_into()
        .map_err(|_| PrivacyError::SerializationError("point is not 32 bytes".into()))
}

fn decode_point(bytes: &[u8; 32]) -> Result<EdwardsAffine> {
    EdwardsAffine::deserialize_compressed(&bytes[..]).map_err(|_| PrivacyError::InvalidPoint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{Ticket, currency_id};

    fn sero(amount: u64) -> Asset {
        Asset::token(currency_id("SERO"), amount)
    }

    #[test]
    fn test_commitment_hides_blinding() {
        let a = commit_asset(&sero(10), &[1u8; 32]).unwrap();
        let b = commit_asset(&sero(10), &[2u8; 32]).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, commit_asset(&sero(10), &[1u8; 32]).unwrap());
    }

    #[test]
    fn test_balanced_commitments_verify() {
        let r_in = [[11u8; 32]];
        let r_out = [[12u8; 32], [13u8; 32]];
        let zero = [0u8; 32];

        let inputs = vec![commit_asset(&sero(100), &r_in[0]).unwrap()];
        let outputs = vec![
            commit_asset(&sero(60), &r_out[0]).unwrap(),
            commit_asset(&sero(30), &r_out[1]).unwrap(),
        ];
        let fee = commit_asset(&sero(10), &zero).unwrap();

        let bcr = net_blinding(&r_in, &r_out);
        let msg = [42u8; 32];
        let proof = sign_balance(&inputs, &outputs, &fee, &bcr, &msg).unwrap();

        assert!(verify_balance(&inputs, &outputs, &fee, &proof, &msg).unwrap());
        assert!(!verify_balance(&inputs, &outputs, &fee, &proof, &[43u8; 32]).unwrap());
    }

    #[test]
    fn test_unbalanced_commitments_fail() {
        let r_in = [[11u8; 32]];
        let r_out = [[12u8; 32]];
        let zero = [0u8; 32];

        let inputs = vec![commit_asset(&sero(100), &r_in[0]).unwrap()];
        let outputs = vec![commit_asset(&sero(95), &r_out[0]).unwrap()];
        let fee = commit_asset(&sero(10), &zero).unwrap();

        let bcr = net_blinding(&r_in, &r_out);
        let msg = [1u8; 32];
        let proof = sign_balance(&inputs, &outputs, &fee, &bcr, &msg).unwrap();

        assert!(!verify_balance(&inputs, &outputs, &fee, &proof, &msg).unwrap());
    }

    #[test]
    fn test_ticket_must_be_conserved() {
        let ticket = Ticket::new(currency_id("CARD"), [5u8; 32]);
        let zero = [0u8; 32];
        let r = [[21u8; 32]];

        let inputs = vec![commit_asset(&sero(10).with_ticket(ticket), &r[0]).unwrap()];
        let dropped = vec![commit_asset(&sero(0), &r[0]).unwrap()];
        let fee = commit_asset(&sero(10), &zero).unwrap();

        let bcr = net_blinding(&r, &r);
        let proof = sign_balance(&inputs, &dropped, &fee, &bcr, &[0u8; 32]).unwrap();
        assert!(!verify_balance(&inputs, &dropped, &fee, &proof, &[0u8; 32]).unwrap());
    }

    #[test]
    fn test_invalid_point_rejected() {
        let bogus = AssetCommitment([0xffu8; 32]);
        let fee = commit_asset(&sero(1), &[0u8; 32]).unwrap();
        let proof = BalanceProof {
            correction_factor: [0u8; 32],
            correction_signature: [0u8; 32],
        };
        assert!(verify_balance(&[bogus], &[], &fee, &proof, &[0u8; 32]).is_err());
    }
}
