use anyhow::{Context, Result};
use rocksdb::{ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use std::path::Path;
use std::sync::Arc;

use dece_config::DatabaseConfig;

use crate::storage::{Column, DbBatch, KvStore};

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

    /// Opens the database named by the `[database]` section
    pub fn open_config(config: &DatabaseConfig) -> Result<Self> {
        log::info!("Opening ledger database at {}", config.path);
        Self::open(&config.path)
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

    fn scan_prefix(&self, column: Column, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let cf = self
            .db
            .cf_handle(column.name())
            .with_context(|| format!("{} CF missing", column.name()))?;

        let mut entries = Vec::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));

        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key.to_vec(), value.to_vec()));
        }

        Ok(entries)
    }

    fn write(&self, batch: DbBatch) -> Result<()> {
        let mut write = WriteBatch::default();

        for (column, key, value) in &batch.puts {
            let cf = self
                .db
                .cf_handle(column.name())
                .with_context(|| format!("{} CF missing", column.name()))?;
            write.put_cf(cf, key, value);
        }

        self.db.write(write)?;
        Ok(())
    }
}
