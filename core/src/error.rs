//! Ledger error kinds.
//!
//! Every failure is returned to the immediate caller. `Fatal` marks an
//! invariant violation after which the host should stop writing and shut
//! down.

use std::fmt;

use shroud_privacy::{PrivacyError, currency_name};
use thiserror::Error;

/// Balance entry that failed to net to zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKey {
    Currency([u8; 32]),
    Ticket { category: [u8; 32], serial: [u8; 32] },
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKey::Currency(id) => write!(f, "currency {}", currency_name(id)),
            AssetKey::Ticket { category, serial } => write!(
                f,
                "ticket {}/{}",
                currency_name(category),
                hex::encode(&serial[..8])
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("already spent: {}", hex::encode(.0))]
    AlreadySpent([u8; 32]),

    #[error("imbalance on {asset}: residual {residual}")]
    Imbalance { asset: AssetKey, residual: i128 },

    #[error("stale witness: {0}")]
    WitnessStale(String),

    #[error("proof backend failed: {0}")]
    ProofFailure(String),

    #[error("schema version {found} is newer than supported version {supported}")]
    SchemaVersionUnknown { found: u8, supported: u8 },

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("unknown revision {0}")]
    UnknownRevision(u64),

    #[error("decode error: {0}")]
    Decode(String),

    /// Durable state is inconsistent; continuing would corrupt it
    #[error("FATAL ledger invariant violated: {0}")]
    Fatal(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),

    #[error(transparent)]
    Privacy(#[from] PrivacyError),
}

impl LedgerError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, LedgerError::Fatal(_))
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(e: std::io::Error) -> Self {
        LedgerError::Decode(e.to_string())
    }
}

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;
