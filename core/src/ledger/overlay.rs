//! Dirty overlay of one block and the tree views built on it.

use byteorder::{BigEndian, WriteBytesExt};
use std::collections::{BTreeMap, BTreeSet};

use crate::codec::encode_output_state;
use crate::error::Result;
use crate::record::{OutputState, TreeFamily};
use crate::storage::{Column, KvStore};
use crate::tree::{NodeReader, NodeWriter};

/// Uncommitted changes of the current block.
///
/// Every collection is ordered so that `encode` is a pure function of the
/// logical contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overlay {
    /// Tree column writes, keys already namespaced
    pub(crate) tree: BTreeMap<Vec<u8>, Vec<u8>>,
    /// Spent nullifiers and roots
    pub(crate) spent: BTreeSet<[u8; 32]>,
    pub(crate) records: BTreeMap<[u8; 32], OutputState>,
    /// root_cm -> root
    pub(crate) root_index: BTreeMap<[u8; 32], [u8; 32]>,
    /// Next sequential output index per family, once touched
    pub(crate) seq: BTreeMap<TreeFamily, u64>,
    pub(crate) block_roots: Vec<[u8; 32]>,
    pub(crate) block_nullifiers: Vec<[u8; 32]>,
}

impl Overlay {
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
            && self.spent.is_empty()
            && self.records.is_empty()
            && self.seq.is_empty()
    }

    pub fn spent_len(&self) -> usize {
        self.spent.len()
    }

    /// Canonical byte image of the overlay
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();

        out.write_u64::<BigEndian>(self.tree.len() as u64)?;
        for (k, v) in &self.tree {
            write_bytes(&mut out, k)?;
            write_bytes(&mut out, v)?;
        }

        out.write_u64::<BigEndian>(self.spent.len() as u64)?;
        for key in &self.spent {
            out.extend_from_slice(key);
        }

        out.write_u64::<BigEndian>(self.records.len() as u64)?;
        for (root, state) in &self.records {
            out.extend_from_slice(root);
            write_bytes(&mut out, &encode_output_state(state)?)?;
        }

        out.write_u64::<BigEndian>(self.root_index.len() as u64)?;
        for (root_cm, root) in &self.root_index {
            out.extend_from_slice(root_cm);
            out.extend_from_slice(root);
        }

        out.write_u64::<BigEndian>(self.seq.len() as u64)?;
        for (family, next) in &self.seq {
            out.write_u8(family_tag(*family))?;
            out.write_u64::<BigEndian>(*next)?;
        }

        out.write_u64::<BigEndian>(self.block_roots.len() as u64)?;
        for root in &self.block_roots {
            out.extend_from_slice(root);
        }
        out.write_u64::<BigEndian>(self.block_nullifiers.len() as u64)?;
        for n in &self.block_nullifiers {
            out.extend_from_slice(n);
        }

        Ok(out)
    }
}

pub(crate) fn family_tag(family: TreeFamily) -> u8 {
    match family {
        TreeFamily::Legacy => 0,
        TreeFamily::V1 => 1,
    }
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    out.write_u32::<BigEndian>(bytes.len() as u32)?;
    out.extend_from_slice(bytes);
    Ok(())
}

// ============================================================================
// Tree views
// ============================================================================

/// Read-only view: overlay first, then the `tree` column
pub(crate) struct TreeReadView<'a, S: KvStore + ?Sized> {
    pub overlay: &'a BTreeMap<Vec<u8>, Vec<u8>>,
    pub store: &'a S,
}

impl<S: KvStore + ?Sized> NodeReader for TreeReadView<'_, S> {
    fn node(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(v) = self.overlay.get(key) {
            return Ok(Some(v.clone()));
        }
        Ok(self.store.get(Column::Tree, key)?)
    }
}

/// Writable view: writes land in the overlay only
pub(crate) struct TreeWriteView<'a, S: KvStore + ?Sized> {
    pub overlay: &'a mut BTreeMap<Vec<u8>, Vec<u8>>,
    pub store: &'a S,
}

impl<S: KvStore + ?Sized> NodeReader for TreeWriteView<'_, S> {
    fn node(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(v) = self.overlay.get(key) {
            return Ok(Some(v.clone()));
        }
        Ok(self.store.get(Column::Tree, key)?)
    }
}

impl<S: KvStore + ?Sized> NodeWriter for TreeWriteView<'_, S> {
    fn put_node(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.overlay.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_encode_is_order_independent() {
        let mut a = Overlay::default();
        a.spent.insert([2u8; 32]);
        a.spent.insert([1u8; 32]);
        a.tree.insert(b"k2".to_vec(), b"v2".to_vec());
        a.tree.insert(b"k1".to_vec(), b"v1".to_vec());

        let mut b = Overlay::default();
        b.tree.insert(b"k1".to_vec(), b"v1".to_vec());
        b.tree.insert(b"k2".to_vec(), b"v2".to_vec());
        b.spent.insert([1u8; 32]);
        b.spent.insert([2u8; 32]);

        assert_eq!(a.encode().unwrap(), b.encode().unwrap());
        assert_ne!(a.encode().unwrap(), Overlay::default().encode().unwrap());
    }

    #[test]
    fn test_view_prefers_overlay() {
        let store = MemoryStore::new();
        store.put(Column::Tree, b"a", b"durable").unwrap();
        store.put(Column::Tree, b"b", b"durable").unwrap();

        let mut overlay = BTreeMap::new();
        {
            let mut view = TreeWriteView {
                overlay: &mut overlay,
                store: &store,
            };
            view.put_node(b"a".to_vec(), b"dirty".to_vec());
        }

        let view = TreeReadView {
            overlay: &overlay,
            store: &store,
        };
        assert_eq!(view.node(b"a").unwrap(), Some(b"dirty".to_vec()));
        assert_eq!(view.node(b"b").unwrap(), Some(b"durable".to_vec()));
        assert_eq!(view.node(b"c").unwrap(), None);
        // nothing reached the store
        assert_eq!(store.get(Column::Tree, b"a").unwrap(), Some(b"durable".to_vec()));
    }
}
