//! Output Records
//!
//! One ledger entry per emitted output, across every protocol generation:
//!
//! ```text
//! ┌───────────────────┬──────────────┬────────────────────────────────┐
//! │ Generation        │ Tree         │ Payload                        │
//! ├───────────────────┼──────────────┼────────────────────────────────┤
//! │ Cleartext         │ legacy       │ owner, asset, memo (public)    │
//! │ ConfidentialV0    │ legacy       │ owner, asset_cm, encrypted     │
//! │ ConfidentialV1a   │ v1           │ owner, asset_cm, encrypted     │
//! │ ConfidentialV1b   │ v1           │ owner, asset_cm, encrypted     │
//! └───────────────────┴──────────────┴────────────────────────────────┘
//! ```
//!
//! Records are immutable once emitted. The stored form (`OutputState`) adds
//! the per-tree sequential index, the output commitment, the root
//! commitment (the tree leaf) and the schema the state was written with.

use std::sync::OnceLock;

use shroud_privacy::{
    Address, Asset, AssetCommitment, Commitment, CommitmentScheme, EncryptedAsset,
    MAX_CIPHERTEXT_LEN, MAX_MEMO_LEN, NullifierDomain, RecordDomain, commit_asset,
};

use crate::error::{LedgerError, Result};

const AEAD_TAG_LEN: usize = 16;

/// Which commitment tree a record lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TreeFamily {
    /// Poseidon tree: cleartext and confidential-v0 records
    Legacy,
    /// blake3 tree: confidential-v1a and confidential-v1b records
    V1,
}

impl TreeFamily {
    pub const ALL: [TreeFamily; 2] = [TreeFamily::Legacy, TreeFamily::V1];
}

/// Protocol generation of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Generation {
    Cleartext,
    V0,
    V1a,
    V1b,
}

/// Persisted schema of an `OutputState`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SchemaVersion {
    /// Pre-upgrade layout: cleartext and confidential-v0 only
    V0 = 0,
    /// Adds the confidential-v1 section
    V1 = 1,
}

impl SchemaVersion {
    pub const LATEST: SchemaVersion = SchemaVersion::V1;

    pub fn from_byte(b: u8) -> Result<Self> {
        match b {
            0 => Ok(SchemaVersion::V0),
            1 => Ok(SchemaVersion::V1),
            found => Err(LedgerError::SchemaVersionUnknown {
                found,
                supported: Self::LATEST as u8,
            }),
        }
    }
}

/// Public output. The asset commitment (zero blinding) is derived lazily
/// the first time a balance proof needs it.
#[derive(Debug, Clone)]
pub struct CleartextOutput {
    pub owner: Address,
    pub asset: Asset,
    pub memo: Vec<u8>,
    asset_cm: OnceLock<AssetCommitment>,
}

impl CleartextOutput {
    pub fn new(owner: Address, asset: Asset, memo: Vec<u8>) -> Self {
        Self {
            owner,
            asset,
            memo,
            asset_cm: OnceLock::new(),
        }
    }

    pub fn asset_commitment(&self) -> Result<AssetCommitment> {
        if let Some(cm) = self.asset_cm.get() {
            return Ok(*cm);
        }
        let cm = commit_asset(&self.asset, &[0u8; 32])?;
        Ok(*self.asset_cm.get_or_init(|| cm))
    }
}

impl PartialEq for CleartextOutput {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner && self.asset == other.asset && self.memo == other.memo
    }
}

impl Eq for CleartextOutput {}

/// Hidden output: only the owner can open `encrypted`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfidentialOutput {
    pub owner: Address,
    pub asset_cm: AssetCommitment,
    pub encrypted: EncryptedAsset,
}

/// A ledger entry. Exactly one generation per record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputRecord {
    Cleartext(CleartextOutput),
    ConfidentialV0(ConfidentialOutput),
    ConfidentialV1a(ConfidentialOutput),
    ConfidentialV1b(ConfidentialOutput),
}

impl OutputRecord {
    pub fn cleartext(owner: Address, asset: Asset, memo: Vec<u8>) -> Self {
        OutputRecord::Cleartext(CleartextOutput::new(owner, asset, memo))
    }

    pub fn generation(&self) -> Generation {
        match self {
            OutputRecord::Cleartext(_) => Generation::Cleartext,
            OutputRecord::ConfidentialV0(_) => Generation::V0,
            OutputRecord::ConfidentialV1a(_) => Generation::V1a,
            OutputRecord::ConfidentialV1b(_) => Generation::V1b,
        }
    }

    pub fn family(&self) -> TreeFamily {
        match self {
            OutputRecord::Cleartext(_) | OutputRecord::ConfidentialV0(_) => TreeFamily::Legacy,
            OutputRecord::ConfidentialV1a(_) | OutputRecord::ConfidentialV1b(_) => TreeFamily::V1,
        }
    }

    /// Oldest schema able to store this record
    pub fn min_schema(&self) -> SchemaVersion {
        match self.family() {
            TreeFamily::Legacy => SchemaVersion::V0,
            TreeFamily::V1 => SchemaVersion::V1,
        }
    }

    pub fn owner_address(&self) -> &Address {
        match self {
            OutputRecord::Cleartext(o) => &o.owner,
            OutputRecord::ConfidentialV0(o)
            | OutputRecord::ConfidentialV1a(o)
            | OutputRecord::ConfidentialV1b(o) => &o.owner,
        }
    }

    pub fn confidential(&self) -> Option<&ConfidentialOutput> {
        match self {
            OutputRecord::Cleartext(_) => None,
            OutputRecord::ConfidentialV0(o)
            | OutputRecord::ConfidentialV1a(o)
            | OutputRecord::ConfidentialV1b(o) => Some(o),
        }
    }

    pub fn nullifier_domain(&self) -> NullifierDomain {
        match self.generation() {
            Generation::Cleartext | Generation::V0 => NullifierDomain::V0,
            Generation::V1a => NullifierDomain::V1a,
            Generation::V1b => NullifierDomain::V1b,
        }
    }

    /// Pedersen commitment to the carried asset
    pub fn asset_commitment(&self) -> Result<AssetCommitment> {
        match self {
            OutputRecord::Cleartext(o) => o.asset_commitment(),
            OutputRecord::ConfidentialV0(o)
            | OutputRecord::ConfidentialV1a(o)
            | OutputRecord::ConfidentialV1b(o) => Ok(o.asset_cm),
        }
    }

    /// Output commitment binding asset and recipient
    pub fn commitment(&self) -> Commitment {
        let scheme = CommitmentScheme::new();
        match self {
            OutputRecord::Cleartext(o) => {
                scheme.commit_cleartext(&o.asset.to_bytes(), &o.memo, &o.owner.id())
            }
            OutputRecord::ConfidentialV0(o) => confidential_cm(&scheme, RecordDomain::V0, o),
            OutputRecord::ConfidentialV1a(o) => confidential_cm(&scheme, RecordDomain::V1a, o),
            OutputRecord::ConfidentialV1b(o) => confidential_cm(&scheme, RecordDomain::V1b, o),
        }
    }

    /// Tree leaf value for this record at `position`
    pub fn root_commitment(&self, position: u64) -> Commitment {
        CommitmentScheme::new().root_commitment(position, &self.commitment())
    }

    /// Reject records that can never be valid outputs
    pub fn validate(&self) -> Result<()> {
        match self {
            OutputRecord::Cleartext(o) => {
                if o.asset.is_empty() {
                    return Err(LedgerError::InvalidRecord("output carries no asset".into()));
                }
                if o.memo.len() > MAX_MEMO_LEN {
                    return Err(LedgerError::InvalidRecord(format!(
                        "memo of {} bytes exceeds {}",
                        o.memo.len(),
                        MAX_MEMO_LEN
                    )));
                }
            }
            OutputRecord::ConfidentialV0(o)
            | OutputRecord::ConfidentialV1a(o)
            | OutputRecord::ConfidentialV1b(o) => {
                let ct_len = o.encrypted.ciphertext.len();
                if ct_len < AEAD_TAG_LEN {
                    return Err(LedgerError::InvalidRecord(
                        "encrypted asset shorter than its tag".into(),
                    ));
                }
                if ct_len > MAX_CIPHERTEXT_LEN {
                    return Err(LedgerError::InvalidRecord(format!(
                        "ciphertext of {} bytes exceeds {}",
                        ct_len, MAX_CIPHERTEXT_LEN
                    )));
                }
            }
        }
        Ok(())
    }
}

fn confidential_cm(
    scheme: &CommitmentScheme,
    domain: RecordDomain,
    o: &ConfidentialOutput,
) -> Commitment {
    scheme.commit_confidential(
        domain,
        o.asset_cm.as_bytes(),
        &o.owner.id(),
        &o.encrypted.ephemeral_pk,
    )
}

/// Stored form of a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputState {
    /// Sequential position in the record's tree family
    pub index: u64,
    pub record: OutputRecord,
    pub out_cm: Commitment,
    pub root_cm: Commitment,
    pub schema: SchemaVersion,
}

impl OutputState {
    pub fn new(index: u64, record: OutputRecord, schema: SchemaVersion) -> Result<Self> {
        if record.min_schema() > schema {
            return Err(LedgerError::InvalidRecord(format!(
                "{:?} record cannot be stored with schema {:?}",
                record.generation(),
                schema
            )));
        }
        let out_cm = record.commitment();
        let root_cm = CommitmentScheme::new().root_commitment(index, &out_cm);
        Ok(Self {
            index,
            record,
            out_cm,
            root_cm,
            schema,
        })
    }
}
