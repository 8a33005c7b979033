use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Column families of the durable ledger store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Column {
    /// root_cm -> OutputRecord
    Outputs,
    /// nullifier or spent root -> ()
    Spent,
    /// family || anchor -> leaf index
    Anchors,
    /// family || index -> leaf
    Leaves,
    /// package id -> Package
    Packages,
    /// root_cm -> RootState
    RootStates,
    /// num || block hash -> BlockRecord
    Blocks,
    Meta,
}

impl Column {
    pub const ALL: [Column; 8] = [
        Column::Outputs,
        Column::Spent,
        Column::Anchors,
        Column::Leaves,
        Column::Packages,
        Column::RootStates,
        Column::Blocks,
        Column::Meta,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Column::Outputs => "outputs",
            Column::Spent => "spent",
            Column::Anchors => "anchors",
            Column::Leaves => "leaves",
            Column::Packages => "packages",
            Column::RootStates => "root_states",
            Column::Blocks => "blocks",
            Column::Meta => "meta",
        }
    }
}

/// decoupling the ledger from the db
pub trait KvStore: Send + Sync {
    /// Raw value under `key`, `None` when absent
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// All entries whose key starts with `prefix`, in key order
    fn scan_prefix(&self, column: Column, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Atomically apply a batch of writes
    fn write(&self, batch: DbBatch) -> Result<()>;

    fn contains(&self, column: Column, key: &[u8]) -> Result<bool> {
        Ok(self.get(column, key)?.is_some())
    }

    /// Decode a JSON row
    fn get_row<T: DeserializeOwned>(&self, column: Column, key: &[u8]) -> Result<Option<T>>
    where
        Self: Sized,
    {
        match self.get(column, key)? {
            Some(bytes) => {
                let row = serde_json::from_slice(&bytes)
                    .with_context(|| format!("invalid {} row", column.name()))?;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }
}

/// Batch of database operations for atomic commit
#[derive(Debug, Clone, Default)]
pub struct DbBatch {
    pub puts: Vec<(Column, Vec<u8>, Vec<u8>)>,
}

impl DbBatch {
    pub fn put(&mut self, column: Column, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.puts.push((column, key.into(), value.into()));
    }

    /// Encode `row` as JSON and queue it
    pub fn put_row<T: Serialize>(
        &mut self,
        column: Column,
        key: impl Into<Vec<u8>>,
        row: &T,
    ) -> Result<()> {
        let bytes = serde_json::to_vec(row)
            .with_context(|| format!("failed to encode {} row", column.name()))?;
        self.put(column, key, bytes);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.puts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.puts.is_empty()
    }
}
