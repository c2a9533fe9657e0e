//! Addresses and Spend Authority
//!
//! An address pairs the owner's Ed25519 signing key (spend authorization)
//! with an X25519 key (asset encryption).
//!
//! ```text
//! Address = { kind: Legacy | Native, signer: [u8; 32], privacy: [u8; 32] }
//! id      = SHA256( kind || signer || privacy )
//! ```

use byteorder::{ReadBytesExt, WriteBytesExt};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{self, Read, Write};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use crate::nullifier::NullifierKey;

/// Address encoding generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressKind {
    /// Pre-upgrade wallets; can only receive cleartext or confidential-v0 outputs
    Legacy,
    /// Privacy-chain-native wallets
    Native,
}

impl AddressKind {
    fn to_byte(self) -> u8 {
        match self {
            AddressKind::Legacy => 0,
            AddressKind::Native => 1,
        }
    }

    fn from_byte(b: u8) -> io::Result<Self> {
        match b {
            0 => Ok(AddressKind::Legacy),
            1 => Ok(AddressKind::Native),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown address kind {}", other),
            )),
        }
    }
}

/// Public recipient address
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub kind: AddressKind,
    /// Ed25519 public key
    pub signer: [u8; 32],
    /// X25519 public key
    pub privacy: [u8; 32],
}

impl Address {
    pub const ENCODED_LEN: usize = 65;

    /// Deterministic identifier bound into commitments
    pub fn id(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update([self.kind.to_byte()]);
        hasher.update(self.signer);
        hasher.update(self.privacy);
        hasher.finalize().into()
    }

    pub fn is_native(&self) -> bool {
        self.kind == AddressKind::Native
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u8(self.kind.to_byte())?;
        w.write_all(&self.signer)?;
        w.write_all(&self.privacy)
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let kind = AddressKind::from_byte(r.read_u8()?)?;
        let mut signer = [0u8; 32];
        let mut privacy = [0u8; 32];
        r.read_exact(&mut signer)?;
        r.read_exact(&mut privacy)?;
        Ok(Self {
            kind,
            signer,
            privacy,
        })
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.id();
        write!(f, "Address({:?}, ", self.kind)?;
        for b in &id[..6] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, "..)")
    }
}

/// Verify an Ed25519 signature made by `signer` over `msg`
pub fn verify_signature(signer: &[u8; 32], msg: &[u8], signature: &[u8; 64]) -> bool {
    let Ok(key) = VerifyingKey::from_bytes(signer) else {
        return false;
    };
    let sig = Signature::from_bytes(signature);
    key.verify(msg, &sig).is_ok()
}

/// A wallet's secret key material.
/// NEVER expose this struct's internals.
pub struct Keypair {
    signing_key: SigningKey,
    privacy_key: StaticSecret,
    nullifier_key: NullifierKey,
}

impl Keypair {
    /// Generates a fresh random keypair.
    pub fn random() -> Self {
        let mut seed = [0u8; 64];
        rand::thread_rng().fill_bytes(&mut seed);
        Self::from_seed(&seed)
    }

    /// Reconstructs a keypair from raw seed bytes.
    /// seed is 64 bytes: 32 for signer + 32 for privacy.
    pub fn from_seed(seed: &[u8; 64]) -> Self {
        let mut sign_seed = [0u8; 32];
        let mut priv_seed = [0u8; 32];
        sign_seed.copy_from_slice(&seed[..32]);
        priv_seed.copy_from_slice(&seed[32..]);

        Self {
            signing_key: SigningKey::from_bytes(&sign_seed),
            privacy_key: StaticSecret::from(priv_seed),
            nullifier_key: NullifierKey::from_spend_seed(&sign_seed),
        }
    }

    /// Public address of the given kind (safe to share).
    pub fn address(&self, kind: AddressKind) -> Address {
        Address {
            kind,
            signer: self.signing_key.verifying_key().to_bytes(),
            privacy: X25519PublicKey::from(&self.privacy_key).to_bytes(),
        }
    }

    /// True when `address` was derived from this keypair
    pub fn owns(&self, address: &Address) -> bool {
        *address == self.address(address.kind)
    }

    pub fn sign(&self, msg: &[u8]) -> [u8; 64] {
        self.signing_key.sign(msg).to_bytes()
    }

    pub fn privacy_secret(&self) -> [u8; 32] {
        self.privacy_key.to_bytes()
    }

    pub fn nullifier_key(&self) -> &NullifierKey {
        &self.nullifier_key
    }
}
