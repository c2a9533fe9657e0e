//! Commitment Tree
//!
//! Append-only, fixed-depth Merkle accumulator over output root commitments.
//!
//! ```text
//!                         1                    <- epoch root (anchor)
//!                  /             \
//!                2                 3
//!             /     \           /     \
//!           ...     ...       ...     ...
//!          2^D   2^D+1   ...        2^(D+1)-1  <- leaves of one epoch
//! ```
//!
//! Nodes are addressed heap-style: `parent(i) = i / 2`, `brother(i) = i ^ 1`.
//! When the last leaf index of an epoch has been used the cursor wraps to
//! `2^D` and the epoch counter advances; each epoch has its own independent
//! root lineage.
//!
//! Storage layout (inside the tree's namespace):
//!
//! ```text
//! CUR                          -> next leaf index (u64 BE) || epoch (u64 BE)
//! LEAF || blake3(leaf value)   -> leaf index (u64 BE) || epoch (u64 BE)
//! NODE || epoch BE || index BE -> node value
//! ANCH || root                 -> epoch (u64 BE)
//! ```
//!
//! Absent right-hand subtrees are never written; their value is read from
//! the precomputed empty-subtree table.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::info;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;

use shroud_privacy::{NodeHasher, compute_root};

use crate::error::{LedgerError, Result};

const KEY_CURSOR: &[u8] = b"CUR";
const KEY_LEAF: &[u8] = b"LEAF";
const KEY_NODE: &[u8] = b"NODE";
const KEY_ANCHOR: &[u8] = b"ANCH";

/// Largest depth for which leaf indices still fit a u64
pub const MAX_DEPTH: u32 = 62;

// ============================================================================
// Node storage
// ============================================================================

/// Read access to persisted tree nodes
pub trait NodeReader {
    fn node(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
}

/// Write access to tree nodes
pub trait NodeWriter: NodeReader {
    fn put_node(&mut self, key: Vec<u8>, value: Vec<u8>);
}

impl NodeReader for BTreeMap<Vec<u8>, Vec<u8>> {
    fn node(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.get(key).cloned())
    }
}

impl NodeWriter for BTreeMap<Vec<u8>, Vec<u8>> {
    fn put_node(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.insert(key, value);
    }
}

// ============================================================================
// Results
// ============================================================================

/// Outcome of a leaf append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Appended {
    /// Epoch root after the append
    pub root: [u8; 32],
    /// Heap index of the leaf, in `[2^D, 2^(D+1))`
    pub leaf_index: u64,
    pub epoch: u64,
    /// Global sequential position: `epoch * 2^D + (leaf_index - 2^D)`
    pub position: u64,
}

/// Membership proof of one leaf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Witness {
    /// Offset of the leaf inside its epoch
    pub position: u64,
    pub epoch: u64,
    /// Sibling path, leaf level first
    pub siblings: Vec<[u8; 32]>,
    /// Epoch root the path hashes up to
    pub anchor: [u8; 32],
}

// ============================================================================
// Tree
// ============================================================================

/// Number of `combine` steps from `index` up to the root
pub fn to_depth(index: u64) -> u32 {
    63 - index.leading_zeros()
}

pub fn brother(index: u64) -> u64 {
    index ^ 1
}

pub fn parent(index: u64) -> u64 {
    index / 2
}

/// One commitment tree. Holds no mutable state; all nodes live in the
/// `NodeReader`/`NodeWriter` handed to each call.
#[derive(Clone)]
pub struct CommitmentTree {
    depth: u32,
    namespace: &'static [u8],
    hasher: Arc<dyn NodeHasher>,
    empty: Arc<Vec<[u8; 32]>>,
}

impl std::fmt::Debug for CommitmentTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitmentTree")
            .field("depth", &self.depth)
            .field("namespace", &String::from_utf8_lossy(self.namespace))
            .finish()
    }
}

impl CommitmentTree {
    pub fn new(depth: u32, namespace: &'static [u8], hasher: Arc<dyn NodeHasher>) -> Result<Self> {
        if depth == 0 || depth > MAX_DEPTH {
            return Err(LedgerError::Fatal(format!(
                "unsupported tree depth {} (expected 1..={})",
                depth, MAX_DEPTH
            )));
        }
        let empty = Arc::new(hasher.empty_roots(depth as usize));
        Ok(Self {
            depth,
            namespace,
            hasher,
            empty,
        })
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn hasher(&self) -> &dyn NodeHasher {
        self.hasher.as_ref()
    }

    /// Root of a fully empty epoch
    pub fn empty_root(&self) -> [u8; 32] {
        self.empty[self.depth as usize]
    }

    fn first_leaf(&self) -> u64 {
        1u64 << self.depth
    }

    fn leaf_cap(&self) -> u64 {
        1u64 << (self.depth + 1)
    }

    /// Leaves per epoch
    pub fn capacity(&self) -> u64 {
        self.first_leaf()
    }

    /// Level of a node above the leaves (leaves are level 0)
    fn level(&self, index: u64) -> usize {
        (self.depth - to_depth(index)) as usize
    }

    /// Next leaf index and current epoch
    pub fn cursor<S: NodeReader + ?Sized>(&self, store: &S) -> Result<(u64, u64)> {
        match store.node(&self.key(KEY_CURSOR, &[]))? {
            Some(bytes) => decode_pair(&bytes),
            None => Ok((self.first_leaf(), 0)),
        }
    }

    /// Number of leaves appended so far, across all epochs
    pub fn size<S: NodeReader + ?Sized>(&self, store: &S) -> Result<u64> {
        let (next, epoch) = self.cursor(store)?;
        Ok(epoch * self.capacity() + (next - self.first_leaf()))
    }

    /// Root of the current epoch
    pub fn root<S: NodeReader + ?Sized>(&self, store: &S) -> Result<[u8; 32]> {
        let (next, epoch) = self.cursor(store)?;
        if next == self.first_leaf() && epoch == 0 {
            return Ok(self.empty_root());
        }
        self.read_node(store, epoch, 1)
    }

    /// True when `root` was the epoch root after some append
    pub fn has_anchor<S: NodeReader + ?Sized>(&self, store: &S, root: &[u8; 32]) -> Result<bool> {
        Ok(store.node(&self.key(KEY_ANCHOR, root))?.is_some())
    }

    /// Append one leaf and return the new epoch root
    pub fn append_leaf<S: NodeWriter + ?Sized>(
        &self,
        store: &mut S,
        value: &[u8; 32],
    ) -> Result<Appended> {
        let locator = self.leaf_key(value);
        if store.node(&locator)?.is_some() {
            return Err(LedgerError::InvalidRecord(format!(
                "leaf {} already present",
                hex::encode(value)
            )));
        }

        let (mut leaf_index, mut epoch) = self.cursor(&*store)?;
        if leaf_index >= self.leaf_cap() {
            leaf_index = self.first_leaf();
            epoch += 1;
            info!(
                "Commitment tree {} rolled over to epoch {}",
                String::from_utf8_lossy(self.namespace),
                epoch
            );
        }

        store.put_node(self.node_key(epoch, leaf_index), value.to_vec());

        let mut current = *value;
        let mut index = leaf_index;
        while index > 1 {
            let sibling_index = brother(index);
            let sibling = if sibling_index > index {
                self.empty[self.level(index)]
            } else {
                self.read_node(&*store, epoch, sibling_index)?
            };

            current = if index % 2 == 0 {
                self.hasher.combine(&current, &sibling)
            } else {
                self.hasher.combine(&sibling, &current)
            };
            index = parent(index);
            store.put_node(self.node_key(epoch, index), current.to_vec());
        }

        store.put_node(self.key(KEY_CURSOR, &[]), encode_pair(leaf_index + 1, epoch));
        store.put_node(locator, encode_pair(leaf_index, epoch));
        store.put_node(self.key(KEY_ANCHOR, &current), epoch.to_be_bytes().to_vec());

        let offset = leaf_index - self.first_leaf();
        let position = epoch
            .checked_mul(self.capacity())
            .and_then(|p| p.checked_add(offset))
            .ok_or_else(|| LedgerError::Fatal(format!("tree position overflow at epoch {}", epoch)))?;

        Ok(Appended {
            root: current,
            leaf_index,
            epoch,
            position,
        })
    }

    /// Membership witness of `value` against the current root of its epoch
    pub fn get_witness<S: NodeReader + ?Sized>(&self, store: &S, value: &[u8; 32]) -> Result<Witness> {
        let (leaf_index, epoch) = match store.node(&self.leaf_key(value))? {
            Some(bytes) => decode_pair(&bytes)?,
            None => {
                return Err(LedgerError::WitnessStale(format!(
                    "leaf {} not in tree",
                    hex::encode(value)
                )));
            }
        };

        let (next, current_epoch) = self.cursor(store)?;
        let mut frontier = if epoch == current_epoch {
            next - 1
        } else {
            self.leaf_cap() - 1
        };

        let mut siblings = Vec::with_capacity(self.depth as usize);
        let mut index = leaf_index;
        while index > 1 {
            let sibling_index = brother(index);
            let sibling = if sibling_index > frontier {
                self.empty[self.level(index)]
            } else {
                self.read_node(store, epoch, sibling_index)?
            };
            siblings.push(sibling);
            index = parent(index);
            frontier = parent(frontier);
        }

        Ok(Witness {
            position: leaf_index - self.first_leaf(),
            epoch,
            siblings,
            anchor: self.read_node(store, epoch, 1)?,
        })
    }

    /// Recompute the root a witness commits to
    pub fn recompute_root(&self, value: &[u8; 32], witness: &Witness) -> [u8; 32] {
        compute_root(self.hasher.as_ref(), value, witness.position, &witness.siblings)
    }

    pub fn verify_witness(&self, value: &[u8; 32], witness: &Witness) -> bool {
        witness.siblings.len() == self.depth as usize
            && self.recompute_root(value, witness) == witness.anchor
    }

    fn read_node<S: NodeReader + ?Sized>(&self, store: &S, epoch: u64, index: u64) -> Result<[u8; 32]> {
        let bytes = store.node(&self.node_key(epoch, index))?.ok_or_else(|| {
            LedgerError::Fatal(format!(
                "missing tree node {} at epoch {} in {}",
                index,
                epoch,
                String::from_utf8_lossy(self.namespace)
            ))
        })?;
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| LedgerError::Fatal(format!("tree node {} has {} bytes", index, bytes.len())))
    }

    fn key(&self, kind: &[u8], suffix: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.namespace.len() + kind.len() + suffix.len());
        key.extend_from_slice(self.namespace);
        key.extend_from_slice(kind);
        key.extend_from_slice(suffix);
        key
    }

    fn leaf_key(&self, value: &[u8; 32]) -> Vec<u8> {
        self.key(KEY_LEAF, blake3::hash(value).as_bytes())
    }

    fn node_key(&self, epoch: u64, index: u64) -> Vec<u8> {
        let mut suffix = [0u8; 16];
        suffix[..8].copy_from_slice(&epoch.to_be_bytes());
        suffix[8..].copy_from_slice(&index.to_be_bytes());
        self.key(KEY_NODE, &suffix)
    }
}

fn encode_pair(a: u64, b: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(16);
    // Writing into a Vec cannot fail
    let _ = out.write_u64::<BigEndian>(a);
    let _ = out.write_u64::<BigEndian>(b);
    out
}

fn decode_pair(bytes: &[u8]) -> Result<(u64, u64)> {
    if bytes.len() != 16 {
        return Err(LedgerError::Fatal(format!(
            "tree locator has {} bytes",
            bytes.len()
        )));
    }
    let mut cursor = Cursor::new(bytes);
    Ok((
        cursor.read_u64::<BigEndian>()?,
        cursor.read_u64::<BigEndian>()?,
    ))
}
