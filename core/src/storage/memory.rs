use anyhow::Result;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

use crate::storage::{Column, DbBatch, KvStore};

type Table = BTreeMap<Vec<u8>, Vec<u8>>;

/// In-memory store with the same column layout as RocksDB.
/// Used by tests and by tooling that never persists.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<Column, Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in a column
    pub fn count(&self, column: Column) -> usize {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        tables.get(&column).map(|t| t.len()).unwrap_or(0)
    }
}

impl KvStore for MemoryStore {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(tables.get(&column).and_then(|t| t.get(key).cloned()))
    }

    fn scan_prefix(&self, column: Column, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(table) = tables.get(&column) else {
            return Ok(Vec::new());
        };
        Ok(table
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn write(&self, batch: DbBatch) -> Result<()> {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        for (column, key, value) in batch.puts {
            tables.entry(column).or_default().insert(key, value);
        }
        Ok(())
    }
}
