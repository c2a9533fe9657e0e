//! Collaborator contracts.
//!
//! The ledger core consumes these; block production, wallet indexing and
//! chain synchronisation implement them elsewhere.

use shroud_privacy::{Address, Asset, Ticket};

use crate::error::Result;
use crate::ledger::BlockRecord;
use crate::record::{OutputState, TreeFamily};
use crate::tree::Witness;

/// Header fields the core needs from the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub height: u64,
    pub hash: [u8; 32],
    pub parent: [u8; 32],
}

/// Read-only view of the canonical chain
pub trait ChainView: Send + Sync {
    fn current_height(&self) -> u64;

    fn header_at(&self, height: u64) -> Option<BlockHeader>;

    /// Roots and nullifiers of a block, when the chain still has them
    fn block_at(&self, height: u64) -> Option<BlockRecord>;

    fn is_contract(&self, address: &Address) -> bool;
}

/// An unspent output offered by the wallet layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendCandidate {
    /// Record key in the ledger
    pub root: [u8; 32],
    pub asset: Asset,
}

/// Wallet-side UTXO lookup. The core never selects outputs itself.
pub trait SpendCandidateSource {
    /// Candidates covering `amount` of `currency`, plus the uncovered rest
    fn find_by_currency(
        &self,
        owner: &Address,
        currency: &[u8; 32],
        amount: u64,
    ) -> (Vec<SpendCandidate>, u64);

    /// Candidates holding the wanted tickets, plus the tickets not found
    fn find_by_ticket(&self, owner: &Address, wanted: &[Ticket]) -> (Vec<SpendCandidate>, Vec<Ticket>);

    fn get_by_root(&self, root: &[u8; 32]) -> Option<SpendCandidate>;

    fn default_refund_address(&self, owner: &Address) -> Option<Address>;
}

/// Ledger lookups needed to spend an output
pub trait WitnessResolver {
    /// Stored output under its record key
    fn output(&self, root: &[u8; 32]) -> Result<Option<OutputState>>;

    /// Membership witness (position, siblings, anchor) of the output
    fn resolve(&self, root: &[u8; 32]) -> Result<Witness>;

    /// True when a nullifier or legacy root has been consumed
    fn has_spent(&self, key: &[u8; 32]) -> Result<bool>;

    fn has_anchor(&self, family: TreeFamily, anchor: &[u8; 32]) -> Result<bool>;
}
