use anyhow::Result;
use parking_lot::RwLock;
use std::collections::BTreeMap;

use super::{Column, KvStore, StoreBatch};

/// In-process store used by tests and tooling.
#[derive(Default)]
pub struct MemoryStore {
    columns: RwLock<BTreeMap<(Column, Vec<u8>), Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys stored in a column
    pub fn len(&self, column: Column) -> usize {
        self.columns
            .read()
            .keys()
            .filter(|(c, _)| *c == column)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.read().is_empty()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.columns.read().get(&(column, key.to_vec())).cloned())
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<()> {
        self.columns
            .write()
            .insert((column, key.to_vec()), value.to_vec());
        Ok(())
    }

    fn write_batch(&self, batch: StoreBatch) -> Result<()> {
        let mut columns = self.columns.write();
        for (column, key, value) in batch.puts {
            columns.insert((column, key), value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_are_separate() {
        let store = MemoryStore::new();
        store.put(Column::Tree, b"k", b"tree").unwrap();
        store.put(Column::Meta, b"k", b"meta").unwrap();

        assert_eq!(store.get(Column::Tree, b"k").unwrap(), Some(b"tree".to_vec()));
        assert_eq!(store.get(Column::Meta, b"k").unwrap(), Some(b"meta".to_vec()));
        assert_eq!(store.get(Column::Records, b"k").unwrap(), None);
    }

    #[test]
    fn test_batch_applies_all_writes() {
        let store = MemoryStore::new();
        let mut batch = StoreBatch::default();
        batch.put(Column::Nullifiers, vec![1u8; 32], Vec::new());
        batch.put(Column::Nullifiers, vec![2u8; 32], Vec::new());
        store.write_batch(batch).unwrap();

        assert_eq!(store.len(Column::Nullifiers), 2);
    }
}
