//! Ledger State
//!
//! One `LedgerState` per block height. It owns the Output Store, the Package
//! Store and their journal behind a single mutex, on top of the durable
//! `KvStore` holding every committed block.
//!
//! ```text
//!   block processor
//!     snapshot ─▶ add_tx ─▶ (revert on failure)
//!     ...
//!     update ─▶ record_block(hash) ─▶ next()
//! ```
//!
//! Lookup failures of the durable store are remembered as the first error of
//! the state; `update` refuses to commit while one is held.

mod journal;
mod output_state;
pub mod package_state;
pub mod records;
mod view;

use anyhow::Result;
use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

use dece_config::ProtocolConfig;
use dece_privacy::{
    Asset, Commitment, CryptoOracle, Family, MerkleError, Memo, PseudoAddress, Signature, Witness,
};
use dece_transaction::{ExternalTransfer, OutP, PkgCreate, PkgId, Tx};

use crate::storage::{Column, DbBatch, KvStore};
use journal::{Journal, Log};
use output_state::OutputState;
use package_state::PackageState;

pub use package_state::PackageError;
pub use records::{BlockRecord, OutputPayload, OutputRecord, Package, RootState};
pub use view::{ShieldedView, StoreReader};

const META_NUM: &[u8] = b"num";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("in_p nullifier already used")]
    InPNullifierUsed,
    #[error("in_p root already used")]
    InPRootUsed,
    #[error("in_c nullifier already used")]
    InCNullifierUsed,
    #[error(transparent)]
    Package(#[from] PackageError),
    #[error("invalid output: {0}")]
    InvalidOutput(String),
    #[error(transparent)]
    Accumulator(#[from] MerkleError),
    #[error("storage error: {0}")]
    Store(String),
}

impl From<anyhow::Error> for StateError {
    fn from(e: anyhow::Error) -> Self {
        StateError::Store(format!("{:#}", e))
    }
}

/// Everything the journal mutates
pub(crate) struct WorkingSet {
    pub outputs: OutputState,
    pub packages: PackageState,
}

/// Touched sets of committed blocks not yet recorded
#[derive(Default)]
struct Finalized {
    roots: Vec<RootState>,
    dels: Vec<[u8; 32]>,
    pkgs: Vec<PkgId>,
}

struct StateData {
    set: WorkingSet,
    journal: Journal,
    db_err: Option<StateError>,
    finalized: Finalized,
}

impl StateData {
    /// Convert a store failure, remembering the first one
    fn note<T>(&mut self, res: Result<T>) -> Result<T, StateError> {
        res.map_err(|e| {
            let err = StateError::from(e);
            if self.db_err.is_none() {
                error!("ledger store failure: {}", err);
                self.db_err = Some(err.clone());
            }
            err
        })
    }

    fn record(&mut self, entry: Log) -> Result<(), StateError> {
        self.journal.record(entry, &mut self.set).map_err(StateError::from)
    }

    fn rollback(&mut self, mark: usize) {
        self.journal.rollback_to(mark, &mut self.set);
    }

    fn has_in<S: KvStore>(&mut self, store: &S, value: &[u8; 32]) -> Result<bool, StateError> {
        let res = self.set.outputs.has_in(store, value);
        self.note(res)
    }

    fn get_pkg<S: KvStore>(&mut self, store: &S, id: &PkgId) -> Result<Option<Package>, StateError> {
        let res = self.set.packages.get(store, id);
        self.note(res)
    }

    fn add_output(
        &mut self,
        oracle: &dyn CryptoOracle,
        payload: OutputPayload,
        tx_hash: [u8; 32],
    ) -> Result<OutputRecord, StateError> {
        let family = payload.family();
        let index = self.set.outputs.tree(family).leaf_size();
        let root_cm = payload
            .root_cm(oracle, index)
            .map_err(|e| StateError::InvalidOutput(e.to_string()))?;
        let record = OutputRecord {
            index,
            root_cm,
            payload,
        };
        self.record(Log::AddOutput {
            family,
            record: record.clone(),
            tx_hash,
            anchor: [0u8; 32],
        })?;
        Ok(record)
    }

    fn put_package(&mut self, pkg: Package) -> Result<(), StateError> {
        self.record(Log::PutPackage {
            id: pkg.id(),
            prev: None,
            next: pkg,
        })
    }

    fn force_add<S: KvStore>(
        &mut self,
        store: &S,
        num: u64,
        from: &PseudoAddress,
        create: &PkgCreate,
    ) -> Result<(), StateError> {
        let existing = self.get_pkg(store, &create.id)?;
        package_state::ensure_absent(&create.id, existing.as_ref())?;
        self.put_package(Package {
            high: num,
            from: *from,
            create: create.clone(),
            closed: false,
        })
    }

    fn force_del<S: KvStore>(&mut self, store: &S, id: &PkgId) -> Result<Package, StateError> {
        let existing = self.get_pkg(store, id)?;
        let mut pkg = package_state::ensure_open(id, existing)?;
        pkg.closed = true;
        self.put_package(pkg.clone())?;
        Ok(pkg)
    }

    fn force_transfer<S: KvStore>(
        &mut self,
        store: &S,
        id: &PkgId,
        to: &PseudoAddress,
    ) -> Result<(), StateError> {
        let existing = self.get_pkg(store, id)?;
        let mut pkg = package_state::ensure_open(id, existing)?;
        pkg.create.pkr = *to;
        self.put_package(pkg)
    }

    fn apply_tx<S: KvStore>(
        &mut self,
        store: &S,
        oracle: &dyn CryptoOracle,
        num: u64,
        tx: &Tx,
        tx_hash: [u8; 32],
    ) -> Result<(), StateError> {
        for in_p in &tx.body.ins_p {
            if self.has_in(store, &in_p.nil.0)? {
                return Err(StateError::InPNullifierUsed);
            }
            if self.has_in(store, &in_p.root.0)? {
                return Err(StateError::InPRootUsed);
            }
            self.record(Log::AddNullifier(in_p.nil.0))?;
            self.record(Log::AddSpentRoot(in_p.root.0))?;
        }
        for in_c in &tx.body.ins_c {
            if self.has_in(store, &in_c.nil.0)? {
                return Err(StateError::InCNullifierUsed);
            }
            self.record(Log::AddNullifier(in_c.nil.0))?;
        }

        for out in &tx.body.outs_c {
            self.add_output(oracle, OutputPayload::Shielded(out.clone()), tx_hash)?;
        }
        for out in &tx.body.outs_p {
            self.add_output(oracle, OutputPayload::Plain(out.clone()), tx_hash)?;
        }

        let pkg = &tx.desc_pkg;
        if let Some(create) = &pkg.create {
            self.force_add(store, num, &tx.from, create)?;
        }
        if let Some(transfer) = &pkg.transfer {
            self.force_transfer(store, &transfer.id, &transfer.pkr)?;
        }
        if let Some(close) = &pkg.close {
            self.force_del(store, &close.id)?;
        }
        Ok(())
    }
}

pub struct LedgerState<S: KvStore> {
    num: u64,
    store: Arc<S>,
    oracle: Arc<dyn CryptoOracle>,
    protocol: ProtocolConfig,
    data: Mutex<StateData>,
}

impl<S: KvStore> LedgerState<S> {
    /// State for block `num` on top of everything committed to `store`
    pub fn load(
        store: Arc<S>,
        num: u64,
        oracle: Arc<dyn CryptoOracle>,
        protocol: ProtocolConfig,
    ) -> Result<Self> {
        let outputs = OutputState::load(store.as_ref())?;
        info!(
            "Loaded ledger state {}: {} plain leaves, {} shielded leaves",
            num,
            outputs.tree(Family::Plain).leaf_size(),
            outputs.tree(Family::Shielded).leaf_size()
        );
        Ok(Self::with_outputs(store, num, oracle, protocol, outputs))
    }

    fn with_outputs(
        store: Arc<S>,
        num: u64,
        oracle: Arc<dyn CryptoOracle>,
        protocol: ProtocolConfig,
        outputs: OutputState,
    ) -> Self {
        Self {
            num,
            store,
            oracle,
            protocol,
            data: Mutex::new(StateData {
                set: WorkingSet {
                    outputs,
                    packages: PackageState::default(),
                },
                journal: Journal::default(),
                db_err: None,
                finalized: Finalized::default(),
            }),
        }
    }

    /// Child state at `num + 1`.
    ///
    /// The accumulators of a committed state are carried over as they are;
    /// only a state with uncommitted changes is rebuilt from the store.
    pub fn next(&self) -> Result<Self> {
        let data = self.lock();
        if data.journal.len() > 0 {
            drop(data);
            warn!(
                "Deriving state {} while state {} holds uncommitted changes, reloading",
                self.num + 1,
                self.num
            );
            return Self::load(
                self.store.clone(),
                self.num + 1,
                self.oracle.clone(),
                self.protocol.clone(),
            );
        }
        let outputs = data.set.outputs.carry();
        drop(data);

        debug!("ledger {}: derived from committed state {}", self.num + 1, self.num);
        Ok(Self::with_outputs(
            self.store.clone(),
            self.num + 1,
            self.oracle.clone(),
            self.protocol.clone(),
            outputs,
        ))
    }

    /// Height of the last committed block in `store`
    pub fn committed_num(store: &S) -> Result<Option<u64>> {
        match store.get(Column::Meta, META_NUM)? {
            Some(bytes) => {
                let bytes: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| anyhow::anyhow!("invalid meta num length"))?;
                Ok(Some(u64::from_be_bytes(bytes)))
            }
            None => Ok(None),
        }
    }

    pub fn num(&self) -> u64 {
        self.num
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn oracle(&self) -> &Arc<dyn CryptoOracle> {
        &self.oracle
    }

    fn lock(&self) -> MutexGuard<'_, StateData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// First store error met by this state, if any
    pub fn error(&self) -> Option<StateError> {
        self.lock().db_err.clone()
    }

    // ---- revisions --------------------------------------------------------

    pub fn snapshot(&self) -> usize {
        self.lock().journal.snapshot()
    }

    /// Undo every change since `snapshot` returned `id`.
    ///
    /// Panics on an unknown id.
    pub fn revert(&self, id: usize) {
        let mut data = self.lock();
        let StateData { journal, set, .. } = &mut *data;
        journal.revert(id, set);
        debug!("ledger {}: reverted to revision {}", self.num, id);
    }

    // ---- accumulators -----------------------------------------------------

    pub fn leaf_size(&self, family: Family) -> u64 {
        self.lock().set.outputs.tree(family).leaf_size()
    }

    /// Current root of a family's accumulator
    pub fn anchor(&self, family: Family) -> [u8; 32] {
        self.lock().set.outputs.tree(family).root()
    }

    /// Root commitment at leaf `index`
    pub fn leaf(&self, family: Family, index: u64) -> Option<Commitment> {
        self.lock().set.outputs.tree(family).get(index)
    }

    pub fn find_witness(&self, family: Family, index: u64) -> Result<Witness, MerkleError> {
        self.lock().set.outputs.tree(family).find_witness(index)
    }

    // ---- block execution --------------------------------------------------

    /// Apply an accepted transaction. All or nothing: on error no change
    /// of this call remains.
    pub fn add_tx(&self, tx: &Tx) -> Result<(), StateError> {
        let tx_hash = tx.hash();
        let mut data = self.lock();
        let mark = data.journal.len();
        let res = data.apply_tx(
            self.store.as_ref(),
            self.oracle.as_ref(),
            self.num,
            tx,
            tx_hash,
        );
        if let Err(e) = &res {
            data.rollback(mark);
            debug!("ledger {}: tx {} rejected: {}", self.num, hex::encode(tx_hash), e);
        }
        res
    }

    /// Credit a transfer from the account-based engine as a plain output.
    ///
    /// Every transfer counts toward the recipient's per-block limit, but only
    /// a non-empty asset sent to a well-formed address lands as an output.
    /// Returns `true` once the recipient received more than
    /// `max_contract_out_count` transfers in this block.
    pub fn add_external_out(&self, transfer: &ExternalTransfer) -> Result<bool, StateError> {
        let mut data = self.lock();
        let mark = data.journal.len();
        data.record(Log::AddExternalTransferCount(transfer.to))?;

        let asset = Asset::new(transfer.asset.tkn, transfer.asset.tkt);
        if asset.has_asset() && self.oracle.is_pkr_valid(&transfer.to) {
            let payload = OutputPayload::Plain(OutP {
                pkr: transfer.to,
                asset,
                memo: Memo::default(),
            });
            if let Err(e) = data.add_output(self.oracle.as_ref(), payload, transfer.tx_hash) {
                data.rollback(mark);
                return Err(e);
            }
        } else {
            debug!(
                "ledger {}: external transfer {} credits nothing",
                self.num,
                hex::encode(&transfer.tx_hash[..8])
            );
        }

        let count = data.set.outputs.external_count(&transfer.to);
        let alarm = count > self.protocol.max_contract_out_count;
        if alarm {
            warn!(
                "ledger {}: {} external transfers to one address exceed {}",
                self.num, count, self.protocol.max_contract_out_count
            );
        }
        Ok(alarm)
    }

    // ---- packages ---------------------------------------------------------

    pub fn force_add(&self, from: &PseudoAddress, create: &PkgCreate) -> Result<(), StateError> {
        self.lock()
            .force_add(self.store.as_ref(), self.num, from, create)
    }

    pub fn force_del(&self, id: &PkgId) -> Result<(), StateError> {
        self.lock().force_del(self.store.as_ref(), id).map(|_| ())
    }

    pub fn force_transfer(&self, id: &PkgId, to: &PseudoAddress) -> Result<(), StateError> {
        self.lock().force_transfer(self.store.as_ref(), id, to)
    }

    /// Close an open package as its owner and return the opened asset
    pub fn close(
        &self,
        id: &PkgId,
        msg: &[u8; 32],
        sig: &Signature,
        key: &[u8; 32],
    ) -> Result<Asset, StateError> {
        let mut data = self.lock();
        let existing = data.get_pkg(self.store.as_ref(), id)?;
        let pkg = package_state::ensure_open(id, existing)?;
        package_state::verify_owner(self.oracle.as_ref(), &pkg, msg, sig)?;
        let (asset, _) = package_state::open_payload(self.oracle.as_ref(), &pkg, key)?;
        data.force_del(self.store.as_ref(), id)?;
        Ok(asset)
    }

    /// Hand an open package to a new owner, signed by the current one
    pub fn transfer(
        &self,
        id: &PkgId,
        to: &PseudoAddress,
        msg: &[u8; 32],
        sig: &Signature,
    ) -> Result<(), StateError> {
        let mut data = self.lock();
        let existing = data.get_pkg(self.store.as_ref(), id)?;
        let pkg = package_state::ensure_open(id, existing)?;
        package_state::verify_owner(self.oracle.as_ref(), &pkg, msg, sig)?;
        data.force_transfer(self.store.as_ref(), id, to)
    }

    // ---- commit -----------------------------------------------------------

    /// Flush the block's changes as one atomic batch and clear the journal
    pub fn update(&self) -> Result<(), StateError> {
        let mut data = self.lock();
        if let Some(err) = &data.db_err {
            return Err(err.clone());
        }

        let mut batch = DbBatch::default();
        data.set.outputs.flush(&mut batch)?;
        data.set.packages.flush(&mut batch)?;
        batch.put(Column::Meta, META_NUM, self.num.to_be_bytes());
        let rows = batch.len();

        let res = self.store.write(batch);
        data.note(res)?;

        let (roots, dels) = data.set.outputs.take_block(self.num);
        let pkgs = data.set.packages.take_block();
        data.journal.clear();

        info!(
            "Committed ledger state {}: {} outputs, {} spent, {} packages ({} rows)",
            self.num,
            roots.len(),
            dels.len(),
            pkgs.len(),
            rows
        );

        let finalized = &mut data.finalized;
        finalized.roots.extend(roots);
        finalized.dels.extend(dels);
        finalized.pkgs.extend(pkgs);
        Ok(())
    }

    /// Persist the detail row of a root committed by `update`.
    ///
    /// Returns `false` if the root is not awaiting a record.
    pub fn record_state(&self, root: &Commitment) -> Result<bool, StateError> {
        let data = self.lock();
        let Some(state) = data
            .finalized
            .roots
            .iter()
            .find(|s| &s.record.root_cm == root)
        else {
            return Ok(false);
        };

        let mut batch = DbBatch::default();
        batch.put_row(Column::RootStates, root.0, state)?;
        self.store.write(batch)?;
        Ok(true)
    }

    /// Persist what the committed block touched under `(num, hash)`
    pub fn record_block(&self, hash: &[u8; 32]) -> Result<BlockRecord, StateError> {
        let mut data = self.lock();
        let Finalized { roots, dels, pkgs } = std::mem::take(&mut data.finalized);

        let record = BlockRecord {
            roots: roots.iter().map(|s| s.record.root_cm).collect(),
            dels,
            pkgs,
        };

        let mut batch = DbBatch::default();
        batch.put_row(Column::Blocks, records::block_key(self.num, hash), &record)?;
        for state in &roots {
            batch.put_row(Column::RootStates, state.record.root_cm.0, state)?;
        }
        self.store.write(batch)?;

        info!(
            "Recorded block {} ({}): {} roots, {} dels, {} packages",
            self.num,
            hex::encode(&hash[..8]),
            record.roots.len(),
            record.dels.len(),
            record.pkgs.len()
        );
        Ok(record)
    }

    pub fn get_block_record(&self, num: u64, hash: &[u8; 32]) -> Result<Option<BlockRecord>, StateError> {
        Ok(self
            .store
            .get_row(Column::Blocks, &records::block_key(num, hash))?)
    }

    pub fn get_root_state(&self, root: &Commitment) -> Result<Option<RootState>, StateError> {
        Ok(self.store.get_row(Column::RootStates, &root.0)?)
    }

    /// Committed package row
    pub fn get_pkg_state(&self, id: &PkgId) -> Result<Option<Package>, StateError> {
        Ok(self.store.get_row(Column::Packages, &id.0)?)
    }
}

impl<S: KvStore> ShieldedView for LedgerState<S> {
    fn has_in(&self, value: &[u8; 32]) -> Result<bool, StateError> {
        self.lock().has_in(self.store.as_ref(), value)
    }

    fn get_out(&self, root: &Commitment) -> Result<Option<OutputRecord>, StateError> {
        let mut data = self.lock();
        let res = data.set.outputs.get_out(self.store.as_ref(), root);
        data.note(res)
    }

    fn has_anchor(&self, family: Family, anchor: &[u8; 32]) -> Result<bool, StateError> {
        let mut data = self.lock();
        let res = data
            .set
            .outputs
            .has_anchor(self.store.as_ref(), family, anchor);
        data.note(res)
    }

    fn get_pkg(&self, id: &PkgId) -> Result<Option<Package>, StateError> {
        self.lock().get_pkg(self.store.as_ref(), id)
    }
}
