use anyhow::{Context, Result};
use rocksdb::{ColumnFamilyDescriptor, DB, Options, WriteBatch};
use std::path::Path;
use std::sync::Arc;

use super::{Column, KvStore, StoreBatch};

/// A thread-safe wrapper around RocksDB.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
}

impl RocksDbStore {
    /// Opens the database at the specified path, creating it if missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = Column::ALL
            .iter()
            .map(|c| ColumnFamilyDescriptor::new(c.name(), Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, families)
            .map_err(|e| anyhow::anyhow!("Failed to open RocksDB: {}", e))?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl KvStore for RocksDbStore {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self
            .db
            .cf_handle(column.name())
            .with_context(|| format!("{} CF missing", column.name()))?;

        Ok(self.db.get_cf(cf, key)?)
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<()> {
        let cf = self
            .db
            .cf_handle(column.name())
            .with_context(|| format!("{} CF missing", column.name()))?;

        self.db.put_cf(cf, key, value)?;
        Ok(())
    }

    /// Atomically apply a batch of operations
    fn write_batch(&self, operations: StoreBatch) -> Result<()> {
        let mut batch = WriteBatch::default();

        for (column, key, value) in &operations.puts {
            let cf = self
                .db
                .cf_handle(column.name())
                .with_context(|| format!("{} CF missing", column.name()))?;
            batch.put_cf(cf, key, value);
        }

        self.db.write(batch)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Create a temporary DB for each test
    fn temp_db() -> (TempDir, RocksDbStore) {
        let dir = TempDir::new().unwrap();
        let db = RocksDbStore::open(dir.path()).unwrap();
        (dir, db)
    }

    #[test]
    fn put_and_get_roundtrip() {
        let (_dir, db) = temp_db();
        db.put(Column::Records, &[7u8; 32], b"record").unwrap();

        assert_eq!(
            db.get(Column::Records, &[7u8; 32]).unwrap(),
            Some(b"record".to_vec())
        );
        assert_eq!(db.get(Column::Records, &[8u8; 32]).unwrap(), None);
    }

    #[test]
    fn batch_writes_every_column() {
        let (_dir, db) = temp_db();
        let mut batch = StoreBatch::default();
        for (i, column) in Column::ALL.iter().enumerate() {
            batch.put(*column, vec![i as u8], vec![i as u8; 4]);
        }
        db.write_batch(batch).unwrap();

        for (i, column) in Column::ALL.iter().enumerate() {
            assert_eq!(db.get(*column, &[i as u8]).unwrap(), Some(vec![i as u8; 4]));
        }
    }

    #[test]
    fn reopen_keeps_data() {
        let dir = TempDir::new().unwrap();
        {
            let db = RocksDbStore::open(dir.path()).unwrap();
            db.put(Column::Meta, b"HEIGHT", &5u64.to_be_bytes()).unwrap();
        }
        let db = RocksDbStore::open(dir.path()).unwrap();
        assert_eq!(
            db.get(Column::Meta, b"HEIGHT").unwrap(),
            Some(5u64.to_be_bytes().to_vec())
        );
    }
}
