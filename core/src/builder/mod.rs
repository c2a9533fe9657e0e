//! Transaction Builder
//!
//! Turns a payment request into a signed, proven transaction.
//!
//! ```text
//! build_params:  select candidates ─► open inputs ─► receptions ─► cmds ─► change
//!
//! build:
//!   0. validate    cmds exclusive, not empty, input cap
//!   1. prepare     route every input/output to its generation
//!   2. fee         fee commitment, accumulator seeded
//!   3. inputs      nullifier, spent check, witness check, asset in
//!   4. outputs     commitment + encryption, asset out
//!   5. cmds        command asset in/out
//!   6. prove       every confidential input/output on the worker pool
//!   7. sign        sender, per-spend, balance signature
//!   8. finalize    accumulator check
//! ```
//!
//! Steps run strictly in order on the calling thread; only step 6 fans out.
//! Any failure aborts the build before a transaction exists.

pub mod params;

use log::{debug, warn};
use rand::RngCore;
use std::collections::BTreeSet;
use std::sync::Arc;

use shroud_privacy::{
    Asset, AssetCommitment, AssetOpening, Keypair, Nullifier, commit_asset, compute_root,
    encrypt_asset, net_blinding, sign_balance, try_decrypt_asset,
};

use crate::balance::AssetAccumulator;
use crate::error::{LedgerError, Result};
use crate::interfaces::{ChainView, SpendCandidate, SpendCandidateSource, WitnessResolver};
use crate::ledger::hasher_for;
use crate::pool::ProofWorkerPool;
use crate::prover::{InputWitness, OutputWitness, Proof, ProofBackend};
use crate::record::{ConfidentialOutput, Generation, OutputRecord};
use crate::transaction::{
    BalanceDescriptor, OutputDescriptor, SpendDescriptor, Transaction, fee_asset,
    public_commitment,
};

pub use params::{
    GenIn, GenOut, GenTxParam, MAX_CLEARTEXT_INPUTS, PreTxParams, Reception, SpendKind,
    output_generation, spend_kind,
};

struct BoundInput {
    kind: SpendKind,
    root: [u8; 32],
    nullifier: Nullifier,
    anchor: [u8; 32],
    asset_cm: AssetCommitment,
    blinding: [u8; 32],
    witness: Option<InputWitness>,
}

struct BoundOutput {
    record: OutputRecord,
    asset_cm: AssetCommitment,
    blinding: [u8; 32],
    witness: Option<OutputWitness>,
}

pub struct TransactionBuilder<'a> {
    ledger: &'a dyn WitnessResolver,
    chain: &'a dyn ChainView,
    source: &'a dyn SpendCandidateSource,
    backend: Arc<dyn ProofBackend>,
    pool: &'a ProofWorkerPool,
    upgrade_height: u64,
}

impl<'a> TransactionBuilder<'a> {
    pub fn new(
        ledger: &'a dyn WitnessResolver,
        chain: &'a dyn ChainView,
        source: &'a dyn SpendCandidateSource,
        backend: Arc<dyn ProofBackend>,
        pool: &'a ProofWorkerPool,
        upgrade_height: u64,
    ) -> Self {
        Self {
            ledger,
            chain,
            source,
            backend,
            pool,
            upgrade_height,
        }
    }

    fn is_upgraded(&self) -> bool {
        self.chain.current_height() >= self.upgrade_height
    }

    /// Request to transaction in one go
    pub fn build_tx(&self, keys: &Keypair, req: &PreTxParams) -> Result<Transaction> {
        let param = self.build_params(keys, req)?;
        self.build(keys, &param)
    }

    // ========================================================================
    // Parameter building
    // ========================================================================

    /// Candidates to spend: the explicit roots when given, otherwise what
    /// the source offers for the outstanding need.
    pub fn select_candidates(&self, req: &PreTxParams) -> Result<Vec<SpendCandidate>> {
        if !req.roots.is_empty() {
            let mut seen = BTreeSet::new();
            if let Some(dup) = req.roots.iter().find(|root| !seen.insert(**root)) {
                return Err(LedgerError::AlreadySpent(*dup));
            }
            return req
                .roots
                .iter()
                .map(|root| {
                    self.source.get_by_root(root).ok_or_else(|| {
                        LedgerError::InvalidRecord(format!("unknown root {}", hex::encode(root)))
                    })
                })
                .collect();
        }

        let mut need = AssetAccumulator::new(true, &req.fee);
        for reception in &req.receptions {
            need.add_output(&reception.asset);
        }
        if let Some(asset) = req.cmds.out_asset() {
            need.add_output(asset);
        }
        if let Some(asset) = req.cmds.in_asset() {
            need.add_input(asset);
        }

        let (tokens, tickets) = need.list_nonzero_outputs();
        let mut seen = BTreeSet::new();
        let mut selected = Vec::new();

        for token in tokens {
            let (found, shortfall) =
                self.source
                    .find_by_currency(&req.from, &token.currency, token.amount);
            if shortfall > 0 {
                return Err(LedgerError::InsufficientFunds(format!(
                    "{} short of {}",
                    shortfall,
                    shroud_privacy::currency_name(&token.currency)
                )));
            }
            for candidate in found {
                if seen.insert(candidate.root) {
                    selected.push(candidate);
                }
            }
        }

        if !tickets.is_empty() {
            let (found, unmet) = self.source.find_by_ticket(&req.from, &tickets);
            if !unmet.is_empty() {
                return Err(LedgerError::InsufficientFunds(format!(
                    "{} tickets not found",
                    unmet.len()
                )));
            }
            for candidate in found {
                if seen.insert(candidate.root) {
                    selected.push(candidate);
                }
            }
        }

        debug!("Selected {} spend candidates", selected.len());
        Ok(selected)
    }

    /// Resolve candidates and add change so that the request balances
    pub fn build_params(&self, keys: &Keypair, req: &PreTxParams) -> Result<GenTxParam> {
        req.cmds.validate()?;
        let candidates = self.select_candidates(req)?;

        let mut acc = AssetAccumulator::new(false, &req.fee);
        let mut inputs = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let state = self.ledger.output(&candidate.root)?.ok_or_else(|| {
                LedgerError::InvalidRecord(format!(
                    "candidate {} not in ledger",
                    hex::encode(candidate.root)
                ))
            })?;
            if !keys.owns(state.record.owner_address()) {
                return Err(LedgerError::InvalidRecord(format!(
                    "candidate {} is not owned by the sender",
                    hex::encode(candidate.root)
                )));
            }
            let opening = open_record(keys, &state.record)?;
            let witness = self.ledger.resolve(&candidate.root)?;
            acc.add_input(&opening.asset);
            inputs.push(GenIn {
                root: candidate.root,
                state,
                witness,
                opening,
            });
        }

        let mut outputs: Vec<GenOut> = req
            .receptions
            .iter()
            .map(|r| {
                acc.add_output(&r.asset);
                GenOut {
                    to: r.to,
                    asset: r.asset,
                    memo: r.memo.clone(),
                }
            })
            .collect();

        if let Some(asset) = req.cmds.in_asset() {
            acc.add_input(asset);
        }
        if let Some(asset) = req.cmds.out_asset() {
            acc.add_output(asset);
        }

        let refund = req
            .refund_to
            .or_else(|| self.source.default_refund_address(&req.from))
            .unwrap_or(req.from);
        let (tokens, tickets) = acc.list_nonzero_outputs();
        for i in 0..tokens.len().max(tickets.len()) {
            let change = Asset {
                token: tokens.get(i).copied(),
                ticket: tickets.get(i).copied(),
            };
            acc.add_output(&change);
            outputs.push(GenOut {
                to: refund,
                asset: change,
                memo: Vec::new(),
            });
        }

        acc.check()?;
        Ok(GenTxParam {
            from: req.from,
            fee: req.fee,
            inputs,
            outputs,
            cmds: req.cmds.clone(),
            confidential: req.confidential,
        })
    }

    // ========================================================================
    // Build
    // ========================================================================

    pub fn build(&self, keys: &Keypair, param: &GenTxParam) -> Result<Transaction> {
        self.build_inner(keys, param)
            .inspect_err(|e| warn!("Transaction build failed: {}", e))
    }

    fn build_inner(&self, keys: &Keypair, param: &GenTxParam) -> Result<Transaction> {
        // 0. validate
        param.cmds.validate()?;
        if param.inputs.is_empty() && param.outputs.is_empty() {
            return Err(LedgerError::InvalidRecord(
                "transaction has no inputs and no outputs".into(),
            ));
        }
        let cleartext_inputs = param
            .inputs
            .iter()
            .filter(|i| i.state.record.generation() == Generation::Cleartext)
            .count();
        if cleartext_inputs > MAX_CLEARTEXT_INPUTS {
            return Err(LedgerError::InvalidRecord(format!(
                "{} cleartext inputs exceed {}",
                cleartext_inputs, MAX_CLEARTEXT_INPUTS
            )));
        }
        let mut seen = BTreeSet::new();
        if let Some(dup) = param.inputs.iter().find(|i| !seen.insert(i.root)) {
            return Err(LedgerError::AlreadySpent(dup.root));
        }
        if !keys.owns(&param.from) {
            return Err(LedgerError::InvalidRecord(
                "sender address does not belong to the signing keys".into(),
            ));
        }

        // 1. prepare
        let upgraded = self.is_upgraded();
        let spend_kinds: Vec<SpendKind> = param
            .inputs
            .iter()
            .map(|i| spend_kind(i.state.record.generation(), param.confidential))
            .collect();
        let output_generations: Vec<Generation> = param
            .outputs
            .iter()
            .map(|o| {
                output_generation(&o.to, self.chain.is_contract(&o.to), param.confidential, upgraded)
            })
            .collect();

        // 2. fee
        let fee_cm = public_commitment(&fee_asset(&param.fee))?;
        let mut acc = AssetAccumulator::new(false, &param.fee);

        // 3. inputs
        let mut inputs = Vec::with_capacity(param.inputs.len());
        for (input, kind) in param.inputs.iter().zip(spend_kinds) {
            inputs.push(self.bind_input(keys, input, kind, &mut acc)?);
        }

        // 4. outputs
        let mut outputs = Vec::with_capacity(param.outputs.len());
        for (output, generation) in param.outputs.iter().zip(output_generations) {
            outputs.push(bind_output(output, generation, &mut acc)?);
        }

        // 5. cmds
        let mut input_cms: Vec<AssetCommitment> = inputs.iter().map(|i| i.asset_cm).collect();
        let mut input_blindings: Vec<[u8; 32]> = inputs.iter().map(|i| i.blinding).collect();
        let mut output_cms: Vec<AssetCommitment> = outputs.iter().map(|o| o.asset_cm).collect();
        let output_blindings: Vec<[u8; 32]> = outputs.iter().map(|o| o.blinding).collect();
        if let Some(asset) = param.cmds.in_asset() {
            acc.add_input(asset);
            input_cms.push(public_commitment(asset)?);
            input_blindings.push([0u8; 32]);
        }
        if let Some(asset) = param.cmds.out_asset() {
            acc.add_output(asset);
            output_cms.push(public_commitment(asset)?);
        }

        // 6. prove
        let (mut input_proofs, mut output_proofs) = self.prove(&inputs, &outputs)?;

        // 7. sign
        let spends = inputs
            .into_iter()
            .map(|input| {
                let proof = match input.witness {
                    Some(_) => Some(take_proof(&mut input_proofs)?),
                    None => None,
                };
                Ok(match (input.kind, proof) {
                    (SpendKind::Legacy, proof) => SpendDescriptor::Legacy {
                        root: input.root,
                        nullifier: input.nullifier,
                        anchor: input.anchor,
                        asset_cm: input.asset_cm,
                        proof,
                        signature: [0u8; 64],
                    },
                    (SpendKind::Public, Some(proof)) => SpendDescriptor::Public {
                        root: input.root,
                        nullifier: input.nullifier,
                        anchor: input.anchor,
                        asset_cm: input.asset_cm,
                        proof,
                        signature: [0u8; 64],
                    },
                    (SpendKind::Confidential, Some(proof)) => SpendDescriptor::Confidential {
                        nullifier: input.nullifier,
                        anchor: input.anchor,
                        asset_cm: input.asset_cm,
                        proof,
                    },
                    (kind, None) => {
                        return Err(LedgerError::ProofFailure(format!(
                            "{:?} spend without proof",
                            kind
                        )));
                    }
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let outputs = outputs
            .into_iter()
            .map(|output| {
                let proof = match output.witness {
                    Some(_) => Some(take_proof(&mut output_proofs)?),
                    None => None,
                };
                Ok(OutputDescriptor {
                    record: output.record,
                    proof,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut tx = Transaction {
            from: param.from,
            fee: param.fee,
            spends,
            outputs,
            cmds: param.cmds.clone(),
            balance: None,
            from_signature: [0u8; 64],
        };

        let hash = tx.signing_hash();
        tx.from_signature = keys.sign(&hash);
        for spend in tx.spends.iter_mut() {
            match spend {
                SpendDescriptor::Legacy { signature, .. } | SpendDescriptor::Public { signature, .. } => {
                    *signature = keys.sign(&hash);
                }
                SpendDescriptor::Confidential { .. } => {}
            }
        }
        if tx.is_confidential() {
            let bcr = net_blinding(&input_blindings, &output_blindings);
            let proof = sign_balance(&input_cms, &output_cms, &fee_cm, &bcr, &hash)?;
            tx.balance = Some(BalanceDescriptor {
                input_cms,
                output_cms,
                proof,
            });
        }

        // 8. finalize
        acc.check()?;

        debug!(
            "Built transaction {} ({} spends, {} outputs)",
            hex::encode(&tx.hash()[..8]),
            tx.spends.len(),
            tx.outputs.len()
        );
        Ok(tx)
    }

    fn bind_input(
        &self,
        keys: &Keypair,
        input: &GenIn,
        kind: SpendKind,
        acc: &mut AssetAccumulator,
    ) -> Result<BoundInput> {
        let state = &input.state;
        let record = &state.record;
        if !keys.owns(record.owner_address()) {
            return Err(LedgerError::InvalidRecord(format!(
                "input {} is not owned by the sender",
                hex::encode(input.root)
            )));
        }

        let nullifier = keys
            .nullifier_key()
            .derive(record.nullifier_domain(), &state.root_cm, state.index);
        if self.ledger.has_spent(nullifier.as_bytes())? {
            return Err(LedgerError::AlreadySpent(*nullifier.as_bytes()));
        }
        if kind != SpendKind::Confidential && self.ledger.has_spent(&input.root)? {
            return Err(LedgerError::AlreadySpent(input.root));
        }

        let family = record.family();
        let witness = &input.witness;
        let recomputed = compute_root(
            hasher_for(family).as_ref(),
            state.root_cm.as_bytes(),
            witness.position,
            &witness.siblings,
        );
        if recomputed != witness.anchor || !self.ledger.has_anchor(family, &witness.anchor)? {
            return Err(LedgerError::WitnessStale(format!(
                "witness of {} does not reach a known anchor",
                hex::encode(input.root)
            )));
        }

        let asset_cm = record.asset_commitment()?;
        let opening = &input.opening;
        if commit_asset(&opening.asset, &opening.blinding)? != asset_cm {
            return Err(LedgerError::InvalidRecord(format!(
                "opening of {} does not match its commitment",
                hex::encode(input.root)
            )));
        }
        acc.add_input(&opening.asset);

        let needs_proof = record.generation() != Generation::Cleartext;
        Ok(BoundInput {
            kind,
            root: input.root,
            nullifier,
            anchor: witness.anchor,
            asset_cm,
            blinding: opening.blinding,
            witness: needs_proof.then(|| InputWitness {
                generation: record.generation(),
                asset: opening.asset,
                blinding: opening.blinding,
                asset_cm,
                root_cm: state.root_cm,
                position: witness.position,
                siblings: witness.siblings.clone(),
                nullifier,
                anchor: witness.anchor,
            }),
        })
    }

    /// Run every proof on one pool lease; results come back per side, in order
    fn prove(
        &self,
        inputs: &[BoundInput],
        outputs: &[BoundOutput],
    ) -> Result<(std::vec::IntoIter<Proof>, std::vec::IntoIter<Proof>)> {
        let input_jobs: Vec<InputWitness> = inputs.iter().filter_map(|i| i.witness.clone()).collect();
        let output_jobs: Vec<OutputWitness> =
            outputs.iter().filter_map(|o| o.witness.clone()).collect();
        if input_jobs.is_empty() && output_jobs.is_empty() {
            return Ok((Vec::new().into_iter(), Vec::new().into_iter()));
        }

        let split = input_jobs.len();
        let mut lease = self.pool.checkout::<Proof>();
        for witness in input_jobs {
            let backend = self.backend.clone();
            lease.submit(move || {
                backend
                    .prove_input(&witness)
                    .map_err(|e| LedgerError::ProofFailure(e.to_string()))
            });
        }
        for witness in output_jobs {
            let backend = self.backend.clone();
            lease.submit(move || {
                backend
                    .prove_output(&witness)
                    .map_err(|e| LedgerError::ProofFailure(e.to_string()))
            });
        }

        let mut proofs = lease.join()?;
        let output_proofs = proofs.split_off(split);
        debug!(
            "Generated {} input and {} output proofs",
            proofs.len(),
            output_proofs.len()
        );
        Ok((proofs.into_iter(), output_proofs.into_iter()))
    }
}

fn bind_output(output: &GenOut, generation: Generation, acc: &mut AssetAccumulator) -> Result<BoundOutput> {
    let bound = match generation {
        Generation::Cleartext => {
            let record = OutputRecord::cleartext(output.to, output.asset, output.memo.clone());
            let asset_cm = record.asset_commitment()?;
            BoundOutput {
                record,
                asset_cm,
                blinding: [0u8; 32],
                witness: None,
            }
        }
        Generation::V0 | Generation::V1a | Generation::V1b => {
            let mut blinding = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut blinding);
            let asset_cm = commit_asset(&output.asset, &blinding)?;
            let encrypted = encrypt_asset(
                &AssetOpening {
                    asset: output.asset,
                    blinding,
                    memo: output.memo.clone(),
                },
                &output.to.privacy,
            )?;
            let body = ConfidentialOutput {
                owner: output.to,
                asset_cm,
                encrypted,
            };
            let record = match generation {
                Generation::V0 => OutputRecord::ConfidentialV0(body),
                Generation::V1a => OutputRecord::ConfidentialV1a(body),
                _ => OutputRecord::ConfidentialV1b(body),
            };
            let witness = OutputWitness {
                generation,
                asset: output.asset,
                blinding,
                asset_cm,
                out_cm: record.commitment(),
            };
            BoundOutput {
                record,
                asset_cm,
                blinding,
                witness: Some(witness),
            }
        }
    };
    bound.record.validate()?;
    acc.add_output(&output.asset);
    Ok(bound)
}

fn take_proof(proofs: &mut std::vec::IntoIter<Proof>) -> Result<Proof> {
    proofs
        .next()
        .ok_or_else(|| LedgerError::ProofFailure("proof batch returned too few proofs".into()))
}

/// Asset, blinding and memo of an owned record
fn open_record(keys: &Keypair, record: &OutputRecord) -> Result<AssetOpening> {
    match record {
        OutputRecord::Cleartext(o) => Ok(AssetOpening {
            asset: o.asset,
            blinding: [0u8; 32],
            memo: o.memo.clone(),
        }),
        OutputRecord::ConfidentialV0(o)
        | OutputRecord::ConfidentialV1a(o)
        | OutputRecord::ConfidentialV1b(o) => {
            try_decrypt_asset(&o.encrypted, &keys.privacy_secret(), &o.asset_cm).ok_or_else(|| {
                LedgerError::InvalidRecord("cannot open confidential input with these keys".into())
            })
        }
    }
}
