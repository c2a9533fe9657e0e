//! Ledger State
//!
//! Spent set, record store and the two commitment trees, with a dirty
//! overlay in front of durable storage.
//!
//! ```text
//!           add_output / add_nullifier / apply_transaction
//!                             │
//!                             ▼
//!   ┌──────────────────────────────────────────────────┐
//!   │ Overlay (this block)                             │
//!   │   tree nodes · spent · records · root index      │◄── snapshot / revert
//!   │   per-family counters · block roots/nullifiers   │
//!   └──────────────────────────────────────────────────┘
//!                             │ commit (once per block, one batch)
//!                             ▼
//!   ┌──────────────────────────────────────────────────┐
//!   │ KvStore (RocksDB / memory)                       │
//!   └──────────────────────────────────────────────────┘
//! ```
//!
//! Reads always consult the overlay first, then the store.

pub mod overlay;
pub mod state;

use std::sync::Arc;
use wincode::{SchemaRead, SchemaWrite};

use shroud_config::ShroudConfig;
use shroud_privacy::{Blake3Hasher, NodeHasher, PoseidonHasher};

use crate::record::TreeFamily;

pub use overlay::Overlay;
pub use state::{LedgerState, TreeStatus};

/// Key namespace of the legacy tree inside the `tree` column
pub const LEGACY_NAMESPACE: &[u8] = b"L0/";
/// Key namespace of the v1 tree inside the `tree` column
pub const V1_NAMESPACE: &[u8] = b"V1/";

/// Roots and nullifiers added by one block
#[derive(Debug, Clone, Default, PartialEq, Eq, SchemaRead, SchemaWrite)]
pub struct BlockRecord {
    pub height: u64,
    pub roots: Vec<[u8; 32]>,
    pub nullifiers: Vec<[u8; 32]>,
}

/// Node hash function of a tree family
pub fn hasher_for(family: TreeFamily) -> Arc<dyn NodeHasher> {
    match family {
        TreeFamily::Legacy => Arc::new(PoseidonHasher),
        TreeFamily::V1 => Arc::new(Blake3Hasher),
    }
}

pub(crate) fn namespace_for(family: TreeFamily) -> &'static [u8] {
    match family {
        TreeFamily::Legacy => LEGACY_NAMESPACE,
        TreeFamily::V1 => V1_NAMESPACE,
    }
}

/// Protocol parameters a ledger is opened with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerParams {
    pub tree_depth: u32,
    /// First height that stores schema-v1 records and accepts v1 outputs
    pub upgrade_height: u64,
}

impl LedgerParams {
    pub fn from_config(config: &ShroudConfig) -> Self {
        Self {
            tree_depth: config.ledger.tree_depth,
            upgrade_height: config.ledger.upgrade_height,
        }
    }
}

impl Default for LedgerParams {
    fn default() -> Self {
        Self::from_config(&ShroudConfig::default())
    }
}
