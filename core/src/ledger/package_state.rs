//! Package Store
//!
//! Escrowed shielded assets keyed by package id, outside the accumulators.
//! A package is created open, may change owner while open, and is closed
//! exactly once.

use anyhow::Result;
use std::collections::BTreeMap;
use thiserror::Error;

use dece_privacy::{Asset, Blinding, CryptoOracle, Signature};
use dece_transaction::PkgId;

use super::records::Package;
use crate::storage::{Column, DbBatch, KvStore};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PackageError {
    #[error("package {0} not found")]
    NotFound(String),
    #[error("package {0} already exists")]
    AlreadyExists(String),
    #[error("package {0} is closed")]
    Closed(String),
    #[error("package {0} owner signature invalid")]
    InvalidSignature(String),
    #[error("package {0} payload cannot be opened: {1}")]
    Unreadable(String, String),
    #[error("package {0} payload does not match its commitment")]
    CommitmentMismatch(String),
}

fn label(id: &PkgId) -> String {
    hex::encode(id.0)
}

#[derive(Default)]
pub(crate) struct PackageState {
    dirty: BTreeMap<PkgId, Package>,
}

impl PackageState {
    pub fn get<S: KvStore>(&self, store: &S, id: &PkgId) -> Result<Option<Package>> {
        if let Some(pkg) = self.dirty.get(id) {
            return Ok(Some(pkg.clone()));
        }
        store.get_row(Column::Packages, &id.0)
    }

    /// Store `pkg`, returning the dirty value it replaced
    pub(crate) fn put(&mut self, pkg: Package) -> Option<Package> {
        self.dirty.insert(pkg.id(), pkg)
    }

    pub(crate) fn restore(&mut self, id: &PkgId, prev: Option<Package>) {
        match prev {
            Some(pkg) => {
                self.dirty.insert(*id, pkg);
            }
            None => {
                self.dirty.remove(id);
            }
        }
    }

    pub fn flush(&self, batch: &mut DbBatch) -> Result<()> {
        for (id, pkg) in &self.dirty {
            batch.put_row(Column::Packages, id.0, pkg)?;
        }
        Ok(())
    }

    pub fn take_block(&mut self) -> Vec<PkgId> {
        std::mem::take(&mut self.dirty).into_keys().collect()
    }
}

/// The id must be unused, open or closed
pub(crate) fn ensure_absent(id: &PkgId, existing: Option<&Package>) -> Result<(), PackageError> {
    match existing {
        Some(_) => Err(PackageError::AlreadyExists(label(id))),
        None => Ok(()),
    }
}

/// The package must exist and still be open
pub(crate) fn ensure_open(id: &PkgId, existing: Option<Package>) -> Result<Package, PackageError> {
    match existing {
        None => Err(PackageError::NotFound(label(id))),
        Some(pkg) if pkg.closed => Err(PackageError::Closed(label(id))),
        Some(pkg) => Ok(pkg),
    }
}

/// Check `sig` over `msg` against the recorded owner
pub(crate) fn verify_owner(
    oracle: &dyn CryptoOracle,
    pkg: &Package,
    msg: &[u8; 32],
    sig: &Signature,
) -> Result<(), PackageError> {
    if oracle.verify_sig(msg, sig, pkg.owner()) {
        Ok(())
    } else {
        Err(PackageError::InvalidSignature(label(&pkg.id())))
    }
}

/// Decrypt the payload and confirm it against the commitment
pub(crate) fn open_payload(
    oracle: &dyn CryptoOracle,
    pkg: &Package,
    key: &[u8; 32],
) -> Result<(Asset, Blinding), PackageError> {
    let id = label(&pkg.id());
    let (asset, _memo, ar) = oracle
        .decrypt_output(key, &pkg.create.einfo)
        .map_err(|e| PackageError::Unreadable(id.clone(), e.to_string()))?;
    let (cm, _) = oracle
        .commit_asset(&asset, &ar)
        .map_err(|e| PackageError::Unreadable(id.clone(), e.to_string()))?;
    if cm != pkg.create.asset_cm {
        return Err(PackageError::CommitmentMismatch(id));
    }
    Ok((asset, ar))
}
