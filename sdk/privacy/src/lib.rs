//! Shroud Privacy SDK
//!
//! Output-based privacy primitives shared by the ledger and wallets.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Output Record                            │
//! │  ┌──────────────┐  ┌──────────────┐  ┌───────────────────────┐ │
//! │  │  Asset       │  │ Commitment   │  │   Encrypted Opening   │ │
//! │  │  commitment  │  │  (leaf)      │  │   (for recipient)     │ │
//! │  └──────────────┘  └──────────────┘  └───────────────────────┘ │
//! │         │                 │                     │               │
//! │         ▼                 ▼                     ▼               │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │  Pedersen balance (Σ in − Σ out − fee = bcr·H)          │   │
//! │  │  Merkle membership (Poseidon legacy / blake3 v1)        │   │
//! │  │  Nullifier derivation (one domain per generation)       │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod address;
pub mod asset;
pub mod commitment;
pub mod encryption;
pub mod error;
pub mod merkle;
pub mod nullifier;
pub mod pedersen;

pub use address::{Address, AddressKind, Keypair, verify_signature};
pub use asset::{Asset, Ticket, Token, currency_id, currency_name};
pub use commitment::{Commitment, CommitmentScheme, RecordDomain};
pub use encryption::{
    AssetOpening, EncryptedAsset, MAX_CIPHERTEXT_LEN, MAX_MEMO_LEN, decrypt_asset, encrypt_asset,
    try_decrypt_asset,
};
pub use error::{PrivacyError, Result};
pub use merkle::{Blake3Hasher, NodeHasher, PoseidonHasher, compute_root};
pub use nullifier::{Nullifier, NullifierDomain, NullifierKey};
pub use pedersen::{
    AssetCommitment, BalanceProof, commit_asset, net_blinding, sign_balance, verify_balance,
};
