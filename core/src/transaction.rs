//! Transactions
//!
//! ```text
//! Transaction
//! ├── from, fee
//! ├── spends[]     Legacy        cleartext / confidential-v0 input, root revealed
//! │                Public        v1 input, root revealed
//! │                Confidential  v1a input, root hidden behind the proof
//! ├── outputs[]    record + proof (confidential records only)
//! ├── cmds         at most one auxiliary command
//! ├── balance      input/output asset commitments + balance signature
//! └── signatures   sender, plus one per Legacy/Public spend
//! ```
//!
//! The signing hash covers everything except signatures, proofs and the
//! balance signature itself.

use log::debug;
use std::collections::BTreeSet;

use shroud_privacy::{
    Address, Asset, AssetCommitment, BalanceProof, Nullifier, Token, commit_asset,
    verify_balance, verify_signature,
};

use crate::balance::AssetAccumulator;
use crate::cmds::Cmds;
use crate::error::{LedgerError, Result};
use crate::interfaces::WitnessResolver;
use crate::prover::{Proof, ProofBackend, ProofStatement};
use crate::record::{Generation, OutputRecord, OutputState, TreeFamily};

/// One consumed output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpendDescriptor {
    /// Cleartext or confidential-v0 input. Only v0 inputs carry a proof.
    Legacy {
        root: [u8; 32],
        nullifier: Nullifier,
        anchor: [u8; 32],
        asset_cm: AssetCommitment,
        proof: Option<Proof>,
        signature: [u8; 64],
    },
    /// v1 input whose record is named by its root
    Public {
        root: [u8; 32],
        nullifier: Nullifier,
        anchor: [u8; 32],
        asset_cm: AssetCommitment,
        proof: Proof,
        signature: [u8; 64],
    },
    /// v1a input proven against an anchor without revealing the root
    Confidential {
        nullifier: Nullifier,
        anchor: [u8; 32],
        asset_cm: AssetCommitment,
        proof: Proof,
    },
}

impl SpendDescriptor {
    pub fn nullifier(&self) -> &Nullifier {
        match self {
            SpendDescriptor::Legacy { nullifier, .. }
            | SpendDescriptor::Public { nullifier, .. }
            | SpendDescriptor::Confidential { nullifier, .. } => nullifier,
        }
    }

    pub fn root(&self) -> Option<&[u8; 32]> {
        match self {
            SpendDescriptor::Legacy { root, .. } | SpendDescriptor::Public { root, .. } => Some(root),
            SpendDescriptor::Confidential { .. } => None,
        }
    }

    pub fn anchor(&self) -> &[u8; 32] {
        match self {
            SpendDescriptor::Legacy { anchor, .. }
            | SpendDescriptor::Public { anchor, .. }
            | SpendDescriptor::Confidential { anchor, .. } => anchor,
        }
    }

    pub fn asset_cm(&self) -> &AssetCommitment {
        match self {
            SpendDescriptor::Legacy { asset_cm, .. }
            | SpendDescriptor::Public { asset_cm, .. }
            | SpendDescriptor::Confidential { asset_cm, .. } => asset_cm,
        }
    }

    /// Tree the spent output lives in
    pub fn family(&self) -> TreeFamily {
        match self {
            SpendDescriptor::Legacy { .. } => TreeFamily::Legacy,
            SpendDescriptor::Public { .. } | SpendDescriptor::Confidential { .. } => TreeFamily::V1,
        }
    }

    fn tag(&self) -> u8 {
        match self {
            SpendDescriptor::Legacy { .. } => 0,
            SpendDescriptor::Public { .. } => 1,
            SpendDescriptor::Confidential { .. } => 2,
        }
    }
}

/// One new output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDescriptor {
    pub record: OutputRecord,
    /// Present for every confidential record
    pub proof: Option<Proof>,
}

/// Commitments covered by the balance signature, in transaction order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceDescriptor {
    pub input_cms: Vec<AssetCommitment>,
    pub output_cms: Vec<AssetCommitment>,
    pub proof: BalanceProof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub from: Address,
    pub fee: Token,
    pub spends: Vec<SpendDescriptor>,
    pub outputs: Vec<OutputDescriptor>,
    pub cmds: Cmds,
    /// Absent only when every input and output is cleartext
    pub balance: Option<BalanceDescriptor>,
    pub from_signature: [u8; 64],
}

impl Transaction {
    /// Message signed by the sender, by spend owners and by the balance proof
    pub fn signing_hash(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new_derive_key("shroud tx signing v1");
        hasher.update(&self.from.id());
        hasher.update(&self.fee.currency);
        hasher.update(&self.fee.amount.to_be_bytes());

        hasher.update(&(self.spends.len() as u64).to_be_bytes());
        for spend in &self.spends {
            hasher.update(&[spend.tag()]);
            hasher.update(spend.root().unwrap_or(&[0u8; 32]));
            hasher.update(spend.nullifier().as_bytes());
            hasher.update(spend.anchor());
            hasher.update(spend.asset_cm().as_bytes());
        }

        hasher.update(&(self.outputs.len() as u64).to_be_bytes());
        for output in &self.outputs {
            hasher.update(&[generation_tag(output.record.generation())]);
            hasher.update(output.record.commitment().as_bytes());
        }

        self.cmds.hash_into(&mut hasher);
        *hasher.finalize().as_bytes()
    }

    /// Hash identifying the fully signed transaction
    pub fn hash(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new_derive_key("shroud tx id v1");
        hasher.update(&self.signing_hash());
        hasher.update(&self.from_signature);
        *hasher.finalize().as_bytes()
    }

    /// True when any spent or created asset is hidden
    pub fn is_confidential(&self) -> bool {
        self.spends
            .iter()
            .any(|s| !matches!(s, SpendDescriptor::Legacy { proof: None, .. }))
            || self
                .outputs
                .iter()
                .any(|o| o.record.generation() != Generation::Cleartext)
    }
}

fn generation_tag(generation: Generation) -> u8 {
    match generation {
        Generation::Cleartext => 0,
        Generation::V0 => 1,
        Generation::V1a => 2,
        Generation::V1b => 3,
    }
}

/// Commitment to a public asset (zero blinding)
pub fn public_commitment(asset: &Asset) -> Result<AssetCommitment> {
    Ok(commit_asset(asset, &[0u8; 32])?)
}

pub fn fee_asset(fee: &Token) -> Asset {
    Asset {
        token: Some(*fee),
        ticket: None,
    }
}

// ============================================================================
// Verification
// ============================================================================

/// Stateless and state-dependent checks of a transaction against the
/// current ledger. Does not mutate anything.
pub fn verify_transaction(
    tx: &Transaction,
    ledger: &dyn WitnessResolver,
    backend: &dyn ProofBackend,
) -> Result<()> {
    if tx.spends.is_empty() && tx.outputs.is_empty() {
        return Err(LedgerError::InvalidRecord(
            "transaction has no spends and no outputs".into(),
        ));
    }
    tx.cmds.validate()?;

    let hash = tx.signing_hash();
    if !verify_signature(&tx.from.signer, &hash, &tx.from_signature) {
        return Err(LedgerError::InvalidRecord("bad sender signature".into()));
    }

    let mut seen = BTreeSet::new();
    for spend in &tx.spends {
        let keys = std::iter::once(spend.nullifier().as_bytes()).chain(spend.root());
        for key in keys {
            if !seen.insert(*key) {
                return Err(LedgerError::AlreadySpent(*key));
            }
        }
    }

    let mut cleartext_inputs = Vec::new();
    for spend in &tx.spends {
        if ledger.has_spent(spend.nullifier().as_bytes())? {
            return Err(LedgerError::AlreadySpent(*spend.nullifier().as_bytes()));
        }
        if let Some(root) = spend.root() {
            if ledger.has_spent(root)? {
                return Err(LedgerError::AlreadySpent(*root));
            }
        }
        if !ledger.has_anchor(spend.family(), spend.anchor())? {
            return Err(LedgerError::WitnessStale(format!(
                "unknown anchor {}",
                hex::encode(spend.anchor())
            )));
        }

        match spend {
            SpendDescriptor::Legacy {
                root,
                proof,
                signature,
                ..
            } => {
                let state = spent_record(ledger, root, TreeFamily::Legacy)?;
                check_owner_signature(&state, &hash, signature)?;
                check_input_cm(&state, spend.asset_cm())?;
                match (&state.record, proof) {
                    (OutputRecord::Cleartext(o), None) => cleartext_inputs.push(o.asset),
                    (OutputRecord::ConfidentialV0(_), Some(proof)) => {
                        verify_input(backend, Generation::V0, spend, proof)?
                    }
                    _ => {
                        return Err(LedgerError::InvalidRecord(
                            "legacy spend proof does not match its record".into(),
                        ));
                    }
                }
            }
            SpendDescriptor::Public {
                root,
                proof,
                signature,
                ..
            } => {
                let state = spent_record(ledger, root, TreeFamily::V1)?;
                check_owner_signature(&state, &hash, signature)?;
                check_input_cm(&state, spend.asset_cm())?;
                verify_input(backend, state.record.generation(), spend, proof)?;
            }
            SpendDescriptor::Confidential { proof, .. } => {
                verify_input(backend, Generation::V1a, spend, proof)?;
            }
        }
    }

    let mut output_cms = Vec::with_capacity(tx.outputs.len() + 1);
    for output in &tx.outputs {
        output.record.validate()?;
        let asset_cm = output.record.asset_commitment()?;
        match (&output.record, &output.proof) {
            (OutputRecord::Cleartext(_), _) => {}
            (record, Some(proof)) => {
                let statement = ProofStatement::Output {
                    generation: record.generation(),
                    asset_cm,
                    out_cm: record.commitment(),
                };
                check_proof(backend, &statement, proof, "output")?;
            }
            (_, None) => {
                return Err(LedgerError::ProofFailure(
                    "confidential output without proof".into(),
                ));
            }
        }
        output_cms.push(asset_cm);
    }

    let mut input_cms: Vec<AssetCommitment> = tx.spends.iter().map(|s| *s.asset_cm()).collect();
    if let Some(asset) = tx.cmds.in_asset() {
        input_cms.push(public_commitment(asset)?);
    }
    if let Some(asset) = tx.cmds.out_asset() {
        output_cms.push(public_commitment(asset)?);
    }

    match &tx.balance {
        Some(balance) => {
            if balance.input_cms != input_cms || balance.output_cms != output_cms {
                return Err(LedgerError::InvalidRecord(
                    "balance descriptor does not match the transaction".into(),
                ));
            }
            let fee_cm = public_commitment(&fee_asset(&tx.fee))?;
            if !verify_balance(&input_cms, &output_cms, &fee_cm, &balance.proof, &hash)? {
                return Err(LedgerError::ProofFailure("balance signature rejected".into()));
            }
        }
        None => {
            if tx.is_confidential() {
                return Err(LedgerError::ProofFailure(
                    "confidential transaction without balance proof".into(),
                ));
            }
            let mut acc = AssetAccumulator::new(false, &tx.fee);
            for asset in &cleartext_inputs {
                acc.add_input(asset);
            }
            if let Some(asset) = tx.cmds.in_asset() {
                acc.add_input(asset);
            }
            for output in &tx.outputs {
                if let OutputRecord::Cleartext(o) = &output.record {
                    acc.add_output(&o.asset);
                }
            }
            if let Some(asset) = tx.cmds.out_asset() {
                acc.add_output(asset);
            }
            acc.check()?;
        }
    }

    debug!(
        "Verified transaction {} ({} spends, {} outputs)",
        hex::encode(&tx.hash()[..8]),
        tx.spends.len(),
        tx.outputs.len()
    );
    Ok(())
}

fn spent_record(ledger: &dyn WitnessResolver, root: &[u8; 32], family: TreeFamily) -> Result<OutputState> {
    let state = ledger.output(root)?.ok_or_else(|| {
        LedgerError::InvalidRecord(format!("spent root {} not found", hex::encode(root)))
    })?;
    if state.record.family() != family {
        return Err(LedgerError::InvalidRecord(format!(
            "spent root {} is a {:?} record",
            hex::encode(root),
            state.record.generation()
        )));
    }
    Ok(state)
}

fn check_owner_signature(state: &OutputState, hash: &[u8; 32], signature: &[u8; 64]) -> Result<()> {
    if verify_signature(&state.record.owner_address().signer, hash, signature) {
        Ok(())
    } else {
        Err(LedgerError::InvalidRecord("bad spend signature".into()))
    }
}

fn check_input_cm(state: &OutputState, claimed: &AssetCommitment) -> Result<()> {
    if state.record.asset_commitment()? == *claimed {
        Ok(())
    } else {
        Err(LedgerError::InvalidRecord(
            "spend asset commitment differs from its record".into(),
        ))
    }
}

fn verify_input(
    backend: &dyn ProofBackend,
    generation: Generation,
    spend: &SpendDescriptor,
    proof: &Proof,
) -> Result<()> {
    let statement = ProofStatement::Input {
        generation,
        asset_cm: *spend.asset_cm(),
        nullifier: *spend.nullifier(),
        anchor: *spend.anchor(),
    };
    check_proof(backend, &statement, proof, "input")
}

fn check_proof(
    backend: &dyn ProofBackend,
    statement: &ProofStatement,
    proof: &Proof,
    what: &str,
) -> Result<()> {
    let ok = backend
        .verify(statement, proof)
        .map_err(|e| LedgerError::ProofFailure(e.to_string()))?;
    if ok {
        Ok(())
    } else {
        Err(LedgerError::ProofFailure(format!("{} proof rejected", what)))
    }
}
