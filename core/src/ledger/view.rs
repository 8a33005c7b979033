use std::sync::Arc;

use dece_privacy::{Commitment, Family};
use dece_transaction::PkgId;

use super::StateError;
use super::records::{OutputRecord, Package, anchor_key};
use crate::storage::{Column, KvStore};

/// Read-only lookups the builder and verifier need from the ledger
pub trait ShieldedView {
    /// Whether a nullifier or root has been spent
    fn has_in(&self, value: &[u8; 32]) -> Result<bool, StateError>;

    fn get_out(&self, root: &Commitment) -> Result<Option<OutputRecord>, StateError>;

    /// Whether `anchor` was produced by the family's accumulator
    fn has_anchor(&self, family: Family, anchor: &[u8; 32]) -> Result<bool, StateError>;

    fn get_pkg(&self, id: &PkgId) -> Result<Option<Package>, StateError>;
}

/// Lock-free view over committed blocks only
#[derive(Clone)]
pub struct StoreReader<S: KvStore> {
    store: Arc<S>,
}

impl<S: KvStore> StoreReader<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

impl<S: KvStore> ShieldedView for StoreReader<S> {
    fn has_in(&self, value: &[u8; 32]) -> Result<bool, StateError> {
        Ok(self.store.contains(Column::Spent, value)?)
    }

    fn get_out(&self, root: &Commitment) -> Result<Option<OutputRecord>, StateError> {
        Ok(self.store.get_row(Column::Outputs, &root.0)?)
    }

    fn has_anchor(&self, family: Family, anchor: &[u8; 32]) -> Result<bool, StateError> {
        Ok(self
            .store
            .contains(Column::Anchors, &anchor_key(family, anchor))?)
    }

    fn get_pkg(&self, id: &PkgId) -> Result<Option<Package>, StateError> {
        Ok(self.store.get_row(Column::Packages, &id.0)?)
    }
}
