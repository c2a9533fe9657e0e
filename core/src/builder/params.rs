//! Builder inputs and generation routing.

use shroud_privacy::{Address, AddressKind, Asset, AssetOpening, Token};

use crate::cmds::Cmds;
use crate::record::{Generation, OutputState};
use crate::tree::Witness;

/// Most cleartext inputs one transaction may spend
pub const MAX_CLEARTEXT_INPUTS: usize = 2500;

/// A payment requested by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reception {
    pub to: Address,
    pub asset: Asset,
    pub memo: Vec<u8>,
}

/// What the caller wants to send
#[derive(Debug, Clone)]
pub struct PreTxParams {
    pub from: Address,
    /// Receives the change; falls back to the source's default refund
    /// address, then to `from`
    pub refund_to: Option<Address>,
    pub receptions: Vec<Reception>,
    pub fee: Token,
    /// Spend exactly these roots instead of asking the candidate source
    pub roots: Vec<[u8; 32]>,
    pub cmds: Cmds,
    /// Hide assets of outputs and of v1a inputs
    pub confidential: bool,
}

/// A resolved input: record, membership witness and its opening
#[derive(Debug, Clone)]
pub struct GenIn {
    pub root: [u8; 32],
    pub state: OutputState,
    pub witness: Witness,
    pub opening: AssetOpening,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenOut {
    pub to: Address,
    pub asset: Asset,
    pub memo: Vec<u8>,
}

/// Fully resolved build request, change included
#[derive(Debug, Clone)]
pub struct GenTxParam {
    pub from: Address,
    pub fee: Token,
    pub inputs: Vec<GenIn>,
    pub outputs: Vec<GenOut>,
    pub cmds: Cmds,
    pub confidential: bool,
}

/// How a spent output is revealed in the transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpendKind {
    Legacy,
    Public,
    Confidential,
}

/// Generation of a new output.
///
/// ```text
/// recipient       confidential   upgraded    generation
/// contract        -              -           Cleartext
/// legacy          no             -           Cleartext
/// legacy          yes            -           V0
/// native          no             no          Cleartext
/// native          yes            no          V0
/// native          yes            yes         V1a
/// native          no             yes         V1b
/// ```
pub fn output_generation(
    to: &Address,
    is_contract: bool,
    confidential: bool,
    upgraded: bool,
) -> Generation {
    if is_contract {
        return Generation::Cleartext;
    }
    match (to.kind, confidential, upgraded) {
        (AddressKind::Legacy, false, _) | (AddressKind::Native, false, false) => {
            Generation::Cleartext
        }
        (AddressKind::Legacy, true, _) | (AddressKind::Native, true, false) => Generation::V0,
        (AddressKind::Native, true, true) => Generation::V1a,
        (AddressKind::Native, false, true) => Generation::V1b,
    }
}

pub fn spend_kind(generation: Generation, confidential: bool) -> SpendKind {
    match generation {
        Generation::Cleartext | Generation::V0 => SpendKind::Legacy,
        Generation::V1a if confidential => SpendKind::Confidential,
        Generation::V1a | Generation::V1b => SpendKind::Public,
    }
}
