//! Durable key-value storage behind the ledger.
//!
//! The ledger only needs point reads, point writes and an atomic batch
//! write. Keys are grouped into named columns:
//!
//! ```text
//! tree        commitment tree nodes, leaf locators, cursors, anchors
//! nullifiers  spent nullifiers and roots (empty values)
//! records     root -> encoded OutputState
//! root_index  root commitment -> root
//! blocks      height (BE) -> BlockRecord
//! meta        per-family output counters, last committed height
//! ```

pub mod db;
pub mod memory;

use anyhow::Result;

pub use db::RocksDbStore;
pub use memory::MemoryStore;

/// Logical column of the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Column {
    Tree,
    Nullifiers,
    Records,
    RootIndex,
    Blocks,
    Meta,
}

impl Column {
    pub const ALL: [Column; 6] = [
        Column::Tree,
        Column::Nullifiers,
        Column::Records,
        Column::RootIndex,
        Column::Blocks,
        Column::Meta,
    ];

    /// Column family name in RocksDB
    pub fn name(self) -> &'static str {
        match self {
            Column::Tree => "tree",
            Column::Nullifiers => "nullifiers",
            Column::Records => "records",
            Column::RootIndex => "root_index",
            Column::Blocks => "blocks",
            Column::Meta => "meta",
        }
    }
}

/// Batch of writes applied atomically
#[derive(Debug, Default, Clone)]
pub struct StoreBatch {
    pub puts: Vec<(Column, Vec<u8>, Vec<u8>)>,
}

impl StoreBatch {
    pub fn put(&mut self, column: Column, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.puts.push((column, key.into(), value.into()));
    }

    pub fn len(&self) -> usize {
        self.puts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.puts.is_empty()
    }
}

/// decoupling the ledger from the db
pub trait KvStore: Send + Sync {
    /// Point read. Missing keys are `None`.
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<()>;

    /// Apply every write of the batch or none of them
    fn write_batch(&self, batch: StoreBatch) -> Result<()>;
}

impl<S: KvStore + ?Sized> KvStore for std::sync::Arc<S> {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>> {
        (**self).get(column, key)
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<()> {
        (**self).put(column, key, value)
    }

    fn write_batch(&self, batch: StoreBatch) -> Result<()> {
        (**self).write_batch(batch)
    }
}
