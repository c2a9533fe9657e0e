#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use shroud_core::interfaces::BlockHeader;
use shroud_core::prover::{InputWitness, OutputWitness, ProofStatement};
use shroud_core::{
    BlockRecord, ChainView, LedgerParams, LedgerState, MemoryStore, MockProofBackend, Proof,
    ProofBackend, SpendCandidate, SpendCandidateSource,
};
use shroud_privacy::{Address, Asset, Ticket, currency_id};

pub fn sero(amount: u64) -> Asset {
    Asset::token(currency_id("SERO"), amount)
}

pub fn memory_ledger(depth: u32, upgrade_height: u64) -> LedgerState<Arc<MemoryStore>> {
    LedgerState::open(
        Arc::new(MemoryStore::new()),
        &LedgerParams {
            tree_depth: depth,
            upgrade_height,
        },
    )
    .unwrap()
}

/// Chain stub at a fixed height
pub struct TestChain {
    pub height: u64,
    pub contracts: Vec<Address>,
}

impl TestChain {
    pub fn at(height: u64) -> Self {
        Self {
            height,
            contracts: Vec::new(),
        }
    }
}

impl ChainView for TestChain {
    fn current_height(&self) -> u64 {
        self.height
    }

    fn header_at(&self, height: u64) -> Option<BlockHeader> {
        (height <= self.height).then(|| BlockHeader {
            height,
            hash: [height as u8; 32],
            parent: [height.saturating_sub(1) as u8; 32],
        })
    }

    fn block_at(&self, _height: u64) -> Option<BlockRecord> {
        None
    }

    fn is_contract(&self, address: &Address) -> bool {
        self.contracts.contains(address)
    }
}

/// Wallet stub: a fixed list of unspent outputs, picked greedily
#[derive(Default)]
pub struct TestSource {
    pub candidates: Vec<SpendCandidate>,
    pub refund: Option<Address>,
}

impl SpendCandidateSource for TestSource {
    fn find_by_currency(
        &self,
        _owner: &Address,
        currency: &[u8; 32],
        amount: u64,
    ) -> (Vec<SpendCandidate>, u64) {
        let mut picked = Vec::new();
        let mut total = 0u64;
        for c in &self.candidates {
            if total >= amount {
                break;
            }
            if let Some(token) = c.asset.token.filter(|t| t.currency == *currency) {
                total += token.amount;
                picked.push(c.clone());
            }
        }
        (picked, amount.saturating_sub(total))
    }

    fn find_by_ticket(&self, _owner: &Address, wanted: &[Ticket]) -> (Vec<SpendCandidate>, Vec<Ticket>) {
        let mut picked = Vec::new();
        let mut unmet = Vec::new();
        for ticket in wanted {
            match self.candidates.iter().find(|c| c.asset.ticket == Some(*ticket)) {
                Some(c) => picked.push(c.clone()),
                None => unmet.push(*ticket),
            }
        }
        (picked, unmet)
    }

    fn get_by_root(&self, root: &[u8; 32]) -> Option<SpendCandidate> {
        self.candidates.iter().find(|c| c.root == *root).cloned()
    }

    fn default_refund_address(&self, _owner: &Address) -> Option<Address> {
        self.refund
    }
}

/// Mock backend that counts prove calls
#[derive(Default)]
pub struct CountingBackend {
    inner: MockProofBackend,
    pub calls: AtomicUsize,
}

impl CountingBackend {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ProofBackend for CountingBackend {
    fn prove_output(&self, witness: &OutputWitness) -> anyhow::Result<Proof> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.prove_output(witness)
    }

    fn prove_input(&self, witness: &InputWitness) -> anyhow::Result<Proof> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.prove_input(witness)
    }

    fn verify(&self, statement: &ProofStatement, proof: &Proof) -> anyhow::Result<bool> {
        self.inner.verify(statement, proof)
    }
}
