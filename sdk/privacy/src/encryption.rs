//! Asset Encryption
//!
//! Encrypts an output's asset opening for the recipient using
//! ECDH + ChaCha20-Poly1305.
//!
//! ```text
//! Flow:
//! 1. Sender generates ephemeral keypair (epk, esk)
//! 2. Shared secret = ECDH(esk, recipient.privacy)
//! 3. Encryption key = KDF(shared_secret, epk)
//! 4. Ciphertext = ChaCha20-Poly1305(key, nonce, asset || blinding || memo)
//! 5. Output = (epk, nonce, ciphertext)
//! ```
//!
//! `epk` doubles as the recipient-encryption public value bound into the
//! output commitment.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, KeyInit},
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::asset::Asset;
use crate::error::{PrivacyError, Result};
use crate::pedersen::{AssetCommitment, commit_asset};

/// Longest memo carried by an output
pub const MAX_MEMO_LEN: usize = 512;

/// Longest ciphertext a stored output may carry
pub const MAX_CIPHERTEXT_LEN: usize = 4096;

/// An encrypted asset opening (published with the output)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedAsset {
    /// Ephemeral public key for ECDH
    pub ephemeral_pk: [u8; 32],
    /// Nonce for ChaCha20-Poly1305
    pub nonce: [u8; 12],
    /// Encrypted opening with authentication tag
    pub ciphertext: Vec<u8>,
}

impl EncryptedAsset {
    /// Size of the fixed overhead (epk + nonce + tag)
    pub const OVERHEAD: usize = 32 + 12 + 16;
}

/// Everything the recipient needs to spend the output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetOpening {
    pub asset: Asset,
    pub blinding: [u8; 32],
    pub memo: Vec<u8>,
}

/// Encrypt an asset opening for a recipient
///
/// # Arguments
/// * `opening` - Asset, blinding and memo (memo truncated to 512 bytes)
/// * `recipient_pk` - Recipient's X25519 public key
pub fn encrypt_asset(opening: &AssetOpening, recipient_pk: &[u8; 32]) -> Result<EncryptedAsset> {
    let mut rng = rand::thread_rng();
    let ephemeral_secret = EphemeralSecret::random_from_rng(&mut rng);
    let ephemeral_pk = PublicKey::from(&ephemeral_secret);

    let recipient_key = PublicKey::from(*recipient_pk);
    let shared_secret = ephemeral_secret.diffie_hellman(&recipient_key);
    let encryption_key = derive_asset_key(shared_secret.as_bytes(), ephemeral_pk.as_bytes());

    let plaintext = serialize_opening(opening)?;

    let mut nonce_bytes = [0u8; 12];
    rng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let cipher = ChaCha20Poly1305::new_from_slice(&encryption_key)
        .map_err(|e| PrivacyError::EncryptionFailed(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_slice())
        .map_err(|e| PrivacyError::EncryptionFailed(e.to_string()))?;

    Ok(EncryptedAsset {
        ephemeral_pk: *ephemeral_pk.as_bytes(),
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Decrypt an asset opening with the recipient's X25519 secret
///
/// Returns None if the key is wrong or the payload is malformed
pub fn decrypt_asset(encrypted: &EncryptedAsset, recipient_sk: &[u8; 32]) -> Option<AssetOpening> {
    let secret = StaticSecret::from(*recipient_sk);
    let ephemeral_pk = PublicKey::from(encrypted.ephemeral_pk);
    let shared_secret = secret.diffie_hellman(&ephemeral_pk);

    let key = derive_asset_key(shared_secret.as_bytes(), &encrypted.ephemeral_pk);
    let cipher = ChaCha20Poly1305::new_from_slice(&key).ok()?;
    let nonce = Nonce::from_slice(&encrypted.nonce);

    let plaintext = cipher.decrypt(nonce, encrypted.ciphertext.as_slice()).ok()?;
    deserialize_opening(&plaintext)
}

/// Decrypt and check the opening against the published asset commitment
/// (wallet scanning mode)
pub fn try_decrypt_asset(
    encrypted: &EncryptedAsset,
    recipient_sk: &[u8; 32],
    expected: &AssetCommitment,
) -> Option<AssetOpening> {
    let opening = decrypt_asset(encrypted, recipient_sk)?;
    let computed = commit_asset(&opening.asset, &opening.blinding).ok()?;
    (computed == *expected).then_some(opening)
}

/// Derive encryption key from shared secret
fn derive_asset_key(shared_secret: &[u8], ephemeral_pk: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key("shroud-asset-v1");
    hasher.update(shared_secret);
    hasher.update(ephemeral_pk);
    *hasher.finalize().as_bytes()
}

fn serialize_opening(opening: &AssetOpening) -> Result<Vec<u8>> {
    if opening.memo.len() > MAX_MEMO_LEN {
        return Err(PrivacyError::MemoTooLong {
            len: opening.memo.len(),
            max: MAX_MEMO_LEN,
        });
    }
    let memo = opening.memo.as_slice();
    let mut bytes = Vec::with_capacity(1 + 40 + 64 + 32 + 2 + memo.len());

    let io_err = |e: std::io::Error| PrivacyError::SerializationError(e.to_string());
    opening.asset.write_to(&mut bytes).map_err(io_err)?;
    bytes.extend_from_slice(&opening.blinding);
    bytes.write_u16::<BigEndian>(memo.len() as u16).map_err(io_err)?;
    bytes.extend_from_slice(memo);

    Ok(bytes)
}

fn deserialize_opening(bytes: &[u8]) -> Option<AssetOpening> {
    let mut cursor = Cursor::new(bytes);
    let asset = Asset::read_from(&mut cursor).ok()?;

    let mut blinding = [0u8; 32];
    cursor.read_exact(&mut blinding).ok()?;

    let memo_len = cursor.read_u16::<BigEndian>().ok()? as usize;
    if memo_len > MAX_MEMO_LEN {
        return None;
    }
    let mut memo = vec![0u8; memo_len];
    cursor.read_exact(&mut memo).ok()?;

    Some(AssetOpening {
        asset,
        blinding,
        memo,
    })
}
