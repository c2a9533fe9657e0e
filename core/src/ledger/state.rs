use byteorder::{BigEndian, ByteOrder};
use log::{debug, info, warn};
use parking_lot::RwLock;

use shroud_privacy::Commitment;

use crate::codec::{decode_output_state, encode_output_state};
use crate::error::{LedgerError, Result};
use crate::interfaces::{ChainView, WitnessResolver};
use crate::ledger::overlay::{Overlay, TreeReadView, TreeWriteView, family_tag};
use crate::ledger::{BlockRecord, LedgerParams, hasher_for, namespace_for};
use crate::record::{OutputRecord, OutputState, SchemaVersion, TreeFamily};
use crate::storage::{Column, KvStore, StoreBatch};
use crate::transaction::{SpendDescriptor, Transaction};
use crate::tree::{CommitmentTree, Witness};

const META_HEIGHT: &[u8] = b"HEIGHT";
const META_SEQ: &[u8] = b"SEQ";

fn seq_key(family: TreeFamily) -> Vec<u8> {
    let mut key = META_SEQ.to_vec();
    key.push(family_tag(family));
    key
}

fn decode_u64(bytes: &[u8], what: &str) -> Result<u64> {
    if bytes.len() != 8 {
        return Err(LedgerError::Decode(format!(
            "{} is {} bytes, expected 8",
            what,
            bytes.len()
        )));
    }
    Ok(BigEndian::read_u64(bytes))
}

/// Size, epoch and current root of one tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeStatus {
    pub family: TreeFamily,
    pub size: u64,
    pub epoch: u64,
    pub root: [u8; 32],
}

struct Inner {
    overlay: Overlay,
    snapshots: Vec<(u64, Overlay)>,
    next_revision: u64,
    /// Height of the block being built
    height: u64,
    /// Highest height with a durable block record
    last_committed: Option<u64>,
    committed: bool,
}

impl Inner {
    /// Mutations are only accepted between `next_block` and `commit`
    fn ensure_open(&self) -> Result<()> {
        if self.committed {
            return Err(LedgerError::Fatal(format!(
                "block {} is already committed",
                self.height
            )));
        }
        Ok(())
    }
}

/// Versioned ledger over a key-value store.
///
/// A single read/write lock guards the overlay: lookups share it, every
/// mutation (including snapshot, revert and commit) takes it exclusively.
pub struct LedgerState<S: KvStore> {
    store: S,
    legacy: CommitmentTree,
    v1: CommitmentTree,
    upgrade_height: u64,
    inner: RwLock<Inner>,
}

impl<S: KvStore> LedgerState<S> {
    /// Open the ledger on top of `store`. The working height is one past the
    /// last committed block, or 0 for an empty store.
    pub fn open(store: S, params: &LedgerParams) -> Result<Self> {
        let legacy = CommitmentTree::new(
            params.tree_depth,
            namespace_for(TreeFamily::Legacy),
            hasher_for(TreeFamily::Legacy),
        )?;
        let v1 = CommitmentTree::new(
            params.tree_depth,
            namespace_for(TreeFamily::V1),
            hasher_for(TreeFamily::V1),
        )?;

        let last_committed = match store.get(Column::Meta, META_HEIGHT)? {
            Some(bytes) => Some(decode_u64(&bytes, "committed height")?),
            None => None,
        };
        let height = last_committed.map_or(0, |h| h + 1);

        let ledger = Self {
            store,
            legacy,
            v1,
            upgrade_height: params.upgrade_height,
            inner: RwLock::new(Inner {
                overlay: Overlay::default(),
                snapshots: Vec::new(),
                next_revision: 0,
                height,
                last_committed,
                committed: false,
            }),
        };

        for status in ledger.tree_status()? {
            info!(
                "Opened {:?} tree: {} leaves, epoch {}, root {}",
                status.family,
                status.size,
                status.epoch,
                hex::encode(&status.root[..8])
            );
        }
        info!("Ledger working height {}", height);
        Ok(ledger)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn tree(&self, family: TreeFamily) -> &CommitmentTree {
        match family {
            TreeFamily::Legacy => &self.legacy,
            TreeFamily::V1 => &self.v1,
        }
    }

    pub fn height(&self) -> u64 {
        self.inner.read().height
    }

    pub fn is_upgraded(&self) -> bool {
        self.height() >= self.upgrade_height
    }

    /// Schema new records are stored with at the current height
    pub fn schema(&self) -> SchemaVersion {
        if self.is_upgraded() {
            SchemaVersion::V1
        } else {
            SchemaVersion::V0
        }
    }

    // ------------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------------

    /// True when a nullifier or root has been consumed
    pub fn has_spent(&self, key: &[u8; 32]) -> Result<bool> {
        let inner = self.inner.read();
        self.has_spent_in(&inner.overlay, key)
    }

    /// Stored record under its root
    pub fn get_record(&self, root: &[u8; 32]) -> Result<Option<OutputState>> {
        let inner = self.inner.read();
        self.record_in(&inner.overlay, root)
    }

    /// Record root of a leaf value
    pub fn root_of(&self, root_cm: &Commitment) -> Result<Option<[u8; 32]>> {
        let inner = self.inner.read();
        if let Some(root) = inner.overlay.root_index.get(root_cm.as_bytes()) {
            return Ok(Some(*root));
        }
        match self.store.get(Column::RootIndex, root_cm.as_bytes())? {
            Some(bytes) => Ok(Some(to_hash(&bytes, "root index entry")?)),
            None => Ok(None),
        }
    }

    pub fn has_anchor(&self, family: TreeFamily, anchor: &[u8; 32]) -> Result<bool> {
        let inner = self.inner.read();
        self.has_anchor_in(&inner.overlay, family, anchor)
    }

    /// Membership witness of the output stored under `root`
    pub fn witness(&self, root: &[u8; 32]) -> Result<Witness> {
        let inner = self.inner.read();
        let state = self.record_in(&inner.overlay, root)?.ok_or_else(|| {
            LedgerError::WitnessStale(format!("no record under root {}", hex::encode(root)))
        })?;
        let view = TreeReadView {
            overlay: &inner.overlay.tree,
            store: &self.store,
        };
        self.tree(state.record.family())
            .get_witness(&view, state.root_cm.as_bytes())
    }

    pub fn tree_status(&self) -> Result<Vec<TreeStatus>> {
        let inner = self.inner.read();
        let view = TreeReadView {
            overlay: &inner.overlay.tree,
            store: &self.store,
        };
        TreeFamily::ALL
            .iter()
            .map(|family| {
                let tree = self.tree(*family);
                let (_, epoch) = tree.cursor(&view)?;
                Ok(TreeStatus {
                    family: *family,
                    size: tree.size(&view)?,
                    epoch,
                    root: tree.root(&view)?,
                })
            })
            .collect()
    }

    /// Canonical bytes of the uncommitted state
    pub fn encode_overlay(&self) -> Result<Vec<u8>> {
        self.inner.read().overlay.encode()
    }

    /// Roots added to the current block so far
    pub fn pending_roots(&self) -> Vec<[u8; 32]> {
        self.inner.read().overlay.block_roots.clone()
    }

    // ------------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------------

    /// Append a new output and return its root
    pub fn add_output(&self, record: OutputRecord) -> Result<[u8; 32]> {
        let mut inner = self.inner.write();
        inner.ensure_open()?;
        self.add_output_in(&mut inner, record)
    }

    /// Mark a nullifier (or root) spent
    pub fn add_nullifier(&self, key: &[u8; 32]) -> Result<()> {
        let mut inner = self.inner.write();
        inner.ensure_open()?;
        self.add_nullifier_in(&mut inner.overlay, key)
    }

    /// Apply every spend and output of a transaction, or none of them.
    /// Returns the roots of the new outputs.
    pub fn apply_transaction(&self, tx: &Transaction) -> Result<Vec<[u8; 32]>> {
        let mut inner = self.inner.write();
        inner.ensure_open()?;
        let backup = inner.overlay.clone();

        match self.apply_in(&mut inner, tx) {
            Ok(roots) => Ok(roots),
            Err(e) => {
                debug!(
                    "Transaction {} rejected: {}",
                    hex::encode(&tx.hash()[..8]),
                    e
                );
                inner.overlay = backup;
                Err(e)
            }
        }
    }

    /// Save the overlay; returns the revision id to revert to
    pub fn snapshot(&self) -> u64 {
        let mut inner = self.inner.write();
        let id = inner.next_revision;
        inner.next_revision += 1;
        let copy = inner.overlay.clone();
        inner.snapshots.push((id, copy));
        id
    }

    /// Restore the overlay as of `revision`, discarding that revision and
    /// every later one
    pub fn revert(&self, revision: u64) -> Result<()> {
        let mut inner = self.inner.write();
        let pos = inner
            .snapshots
            .iter()
            .position(|(id, _)| *id == revision)
            .ok_or(LedgerError::UnknownRevision(revision))?;

        let mut dropped = inner.snapshots.split_off(pos);
        let (_, overlay) = dropped.swap_remove(0);
        inner.overlay = overlay;
        info!(
            "Reverted ledger to revision {} ({} later revisions dropped)",
            revision,
            dropped.len()
        );
        Ok(())
    }

    /// Flush the block to durable storage in one batch. At most once per block.
    pub fn commit(&self) -> Result<BlockRecord> {
        let mut inner = self.inner.write();
        if inner.committed {
            return Err(LedgerError::Fatal(format!(
                "block {} committed twice",
                inner.height
            )));
        }

        let overlay = &inner.overlay;
        let record = BlockRecord {
            height: inner.height,
            roots: overlay.block_roots.clone(),
            nullifiers: overlay.block_nullifiers.clone(),
        };

        let mut batch = StoreBatch::default();
        for (key, value) in &overlay.tree {
            batch.put(Column::Tree, key.clone(), value.clone());
        }
        for key in &overlay.spent {
            batch.put(Column::Nullifiers, key.to_vec(), Vec::new());
        }
        for (root, state) in &overlay.records {
            batch.put(Column::Records, root.to_vec(), encode_output_state(state)?);
        }
        for (root_cm, root) in &overlay.root_index {
            batch.put(Column::RootIndex, root_cm.to_vec(), root.to_vec());
        }
        for (family, next) in &overlay.seq {
            batch.put(Column::Meta, seq_key(*family), next.to_be_bytes().to_vec());
        }

        let block_bytes = wincode::serialize(&record)
            .map_err(|e| LedgerError::Decode(format!("block record: {}", e)))?;
        batch.put(Column::Blocks, inner.height.to_be_bytes().to_vec(), block_bytes);
        batch.put(Column::Meta, META_HEIGHT.to_vec(), inner.height.to_be_bytes().to_vec());

        let writes = batch.len();
        self.store.write_batch(batch)?;

        info!(
            "Committed block {}: {} roots, {} nullifiers, {} writes",
            record.height,
            record.roots.len(),
            record.nullifiers.len(),
            writes
        );

        inner.overlay = Overlay::default();
        inner.snapshots.clear();
        inner.last_committed = Some(inner.height);
        inner.committed = true;
        Ok(record)
    }

    /// Start building `height` after the previous block was committed.
    /// Heights only move forward past the last durable block.
    pub fn next_block(&self, height: u64) -> Result<()> {
        let mut inner = self.inner.write();
        if !inner.committed && !inner.overlay.is_empty() {
            return Err(LedgerError::Fatal(format!(
                "block {} has uncommitted changes",
                inner.height
            )));
        }
        if let Some(last) = inner.last_committed {
            if height <= last {
                return Err(LedgerError::Fatal(format!(
                    "next block {} does not follow committed block {}",
                    height, last
                )));
            }
        }
        inner.height = height;
        inner.committed = false;
        Ok(())
    }

    /// Per-block record, from storage or else from the chain
    pub fn block_record(
        &self,
        height: u64,
        chain: Option<&dyn ChainView>,
    ) -> Result<Option<BlockRecord>> {
        if let Some(bytes) = self.store.get(Column::Blocks, &height.to_be_bytes())? {
            let record: BlockRecord = wincode::deserialize(&bytes)
                .map_err(|e| LedgerError::Decode(format!("block record {}: {}", height, e)))?;
            return Ok(Some(record));
        }
        match chain {
            Some(chain) => {
                let record = chain.block_at(height);
                if record.is_none() {
                    warn!("Block record {} missing from store and chain", height);
                }
                Ok(record)
            }
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------------
    // Internals (lock held by caller)
    // ------------------------------------------------------------------------

    fn has_spent_in(&self, overlay: &Overlay, key: &[u8; 32]) -> Result<bool> {
        if overlay.spent.contains(key) {
            return Ok(true);
        }
        Ok(self.store.get(Column::Nullifiers, key)?.is_some())
    }

    fn record_in(&self, overlay: &Overlay, root: &[u8; 32]) -> Result<Option<OutputState>> {
        if let Some(state) = overlay.records.get(root) {
            return Ok(Some(state.clone()));
        }
        match self.store.get(Column::Records, root)? {
            Some(bytes) => Ok(Some(decode_output_state(&bytes)?)),
            None => Ok(None),
        }
    }

    fn has_anchor_in(&self, overlay: &Overlay, family: TreeFamily, anchor: &[u8; 32]) -> Result<bool> {
        let view = TreeReadView {
            overlay: &overlay.tree,
            store: &self.store,
        };
        self.tree(family).has_anchor(&view, anchor)
    }

    fn next_seq(&self, overlay: &Overlay, family: TreeFamily) -> Result<u64> {
        if let Some(next) = overlay.seq.get(&family) {
            return Ok(*next);
        }
        match self.store.get(Column::Meta, &seq_key(family))? {
            Some(bytes) => decode_u64(&bytes, "output counter"),
            None => Ok(0),
        }
    }

    fn add_nullifier_in(&self, overlay: &mut Overlay, key: &[u8; 32]) -> Result<()> {
        if self.has_spent_in(overlay, key)? {
            return Err(LedgerError::AlreadySpent(*key));
        }
        overlay.spent.insert(*key);
        overlay.block_nullifiers.push(*key);
        Ok(())
    }

    fn add_output_in(&self, inner: &mut Inner, record: OutputRecord) -> Result<[u8; 32]> {
        record.validate()?;
        let upgraded = inner.height >= self.upgrade_height;
        let family = record.family();
        if family == TreeFamily::V1 && !upgraded {
            return Err(LedgerError::InvalidRecord(format!(
                "{:?} output before upgrade height {}",
                record.generation(),
                self.upgrade_height
            )));
        }
        let schema = if upgraded {
            SchemaVersion::V1
        } else {
            SchemaVersion::V0
        };

        let index = self.next_seq(&inner.overlay, family)?;
        let state = OutputState::new(index, record, schema)?;

        let overlay = &mut inner.overlay;
        let mut view = TreeWriteView {
            overlay: &mut overlay.tree,
            store: &self.store,
        };
        let appended = self
            .tree(family)
            .append_leaf(&mut view, state.root_cm.as_bytes())?;

        if appended.position != index {
            return Err(LedgerError::Fatal(format!(
                "{:?} tree placed output {} at position {}",
                family, index, appended.position
            )));
        }

        let root = appended.root;
        overlay.root_index.insert(*state.root_cm.as_bytes(), root);
        overlay.records.insert(root, state);
        overlay.seq.insert(family, index + 1);
        overlay.block_roots.push(root);
        Ok(root)
    }

    fn apply_in(&self, inner: &mut Inner, tx: &Transaction) -> Result<Vec<[u8; 32]>> {
        let upgraded = inner.height >= self.upgrade_height;

        for spend in &tx.spends {
            match spend {
                SpendDescriptor::Legacy {
                    root, nullifier, ..
                } => {
                    self.expect_record(&inner.overlay, root, TreeFamily::Legacy)?;
                    if upgraded {
                        self.add_nullifier_in(&mut inner.overlay, nullifier.as_bytes())?;
                    }
                    self.add_nullifier_in(&mut inner.overlay, root)?;
                }
                SpendDescriptor::Public {
                    root,
                    nullifier,
                    anchor,
                    ..
                } => {
                    self.expect_v1(upgraded)?;
                    self.expect_record(&inner.overlay, root, TreeFamily::V1)?;
                    self.expect_anchor(&inner.overlay, anchor)?;
                    self.add_nullifier_in(&mut inner.overlay, nullifier.as_bytes())?;
                    self.add_nullifier_in(&mut inner.overlay, root)?;
                }
                SpendDescriptor::Confidential {
                    nullifier, anchor, ..
                } => {
                    self.expect_v1(upgraded)?;
                    self.expect_anchor(&inner.overlay, anchor)?;
                    self.add_nullifier_in(&mut inner.overlay, nullifier.as_bytes())?;
                }
            }
        }

        tx.outputs
            .iter()
            .map(|output| self.add_output_in(inner, output.record.clone()))
            .collect()
    }

    fn expect_v1(&self, upgraded: bool) -> Result<()> {
        if upgraded {
            Ok(())
        } else {
            Err(LedgerError::InvalidRecord(format!(
                "v1 spend before upgrade height {}",
                self.upgrade_height
            )))
        }
    }

    fn expect_record(&self, overlay: &Overlay, root: &[u8; 32], family: TreeFamily) -> Result<()> {
        match self.record_in(overlay, root)? {
            Some(state) if state.record.family() == family => Ok(()),
            Some(state) => Err(LedgerError::InvalidRecord(format!(
                "root {} holds a {:?} record",
                hex::encode(root),
                state.record.generation()
            ))),
            None => Err(LedgerError::InvalidRecord(format!(
                "spent root {} not found",
                hex::encode(root)
            ))),
        }
    }

    fn expect_anchor(&self, overlay: &Overlay, anchor: &[u8; 32]) -> Result<()> {
        if self.has_anchor_in(overlay, TreeFamily::V1, anchor)? {
            Ok(())
        } else {
            Err(LedgerError::WitnessStale(format!(
                "unknown v1 anchor {}",
                hex::encode(anchor)
            )))
        }
    }
}

fn to_hash(bytes: &[u8], what: &str) -> Result<[u8; 32]> {
    bytes
        .try_into()
        .map_err(|_| LedgerError::Decode(format!("{} is {} bytes, expected 32", what, bytes.len())))
}

impl<S: KvStore> WitnessResolver for LedgerState<S> {
    fn output(&self, root: &[u8; 32]) -> Result<Option<OutputState>> {
        self.get_record(root)
    }

    fn resolve(&self, root: &[u8; 32]) -> Result<Witness> {
        self.witness(root)
    }

    fn has_spent(&self, key: &[u8; 32]) -> Result<bool> {
        LedgerState::has_spent(self, key)
    }

    fn has_anchor(&self, family: TreeFamily, anchor: &[u8; 32]) -> Result<bool> {
        LedgerState::has_anchor(self, family, anchor)
    }
}
