//! Snapshot journal: every mutation of the working set, undoable in order.

use dece_privacy::{Family, MerkleError, PseudoAddress};
use dece_transaction::PkgId;

use super::WorkingSet;
use super::records::{OutputRecord, Package};

#[derive(Debug, Clone)]
pub(crate) enum Log {
    AddOutput {
        family: Family,
        record: OutputRecord,
        tx_hash: [u8; 32],
        /// Root produced by the append, set when applied
        anchor: [u8; 32],
    },
    AddNullifier([u8; 32]),
    AddSpentRoot([u8; 32]),
    AddExternalTransferCount(PseudoAddress),
    PutPackage {
        id: PkgId,
        /// Dirty value before the write
        prev: Option<Package>,
        next: Package,
    },
}

impl Log {
    fn apply(&mut self, set: &mut WorkingSet) -> Result<(), MerkleError> {
        match self {
            Log::AddOutput {
                record,
                tx_hash,
                anchor,
                ..
            } => {
                *anchor = set.outputs.push_output(record.clone(), *tx_hash)?;
            }
            Log::AddNullifier(value) | Log::AddSpentRoot(value) => {
                set.outputs.mark_spent(*value);
            }
            Log::AddExternalTransferCount(pkr) => {
                set.outputs.bump_external(pkr);
            }
            Log::PutPackage { prev, next, .. } => {
                *prev = set.packages.put(next.clone());
            }
        }
        Ok(())
    }

    fn undo(self, set: &mut WorkingSet) {
        match self {
            Log::AddOutput {
                family,
                record,
                anchor,
                ..
            } => {
                set.outputs.pop_output(family, &record, &anchor);
            }
            Log::AddNullifier(value) | Log::AddSpentRoot(value) => {
                set.outputs.unmark_spent(&value);
            }
            Log::AddExternalTransferCount(pkr) => {
                set.outputs.drop_external(&pkr);
            }
            Log::PutPackage { id, prev, .. } => {
                set.packages.restore(&id, prev);
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Revision {
    id: usize,
    journal_index: usize,
}

#[derive(Default)]
pub(crate) struct Journal {
    entries: Vec<Log>,
    revisions: Vec<Revision>,
    next_revision: usize,
}

impl Journal {
    /// Apply `entry` to the working set and remember it. An entry that
    /// fails to apply leaves the set untouched and is not recorded.
    pub fn record(&mut self, mut entry: Log, set: &mut WorkingSet) -> Result<(), MerkleError> {
        entry.apply(set)?;
        self.entries.push(entry);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn snapshot(&mut self) -> usize {
        let id = self.next_revision;
        self.next_revision += 1;
        self.revisions.push(Revision {
            id,
            journal_index: self.entries.len(),
        });
        id
    }

    /// Undo everything recorded since revision `id` was taken.
    ///
    /// Panics if `id` is unknown or already reverted.
    pub fn revert(&mut self, id: usize, set: &mut WorkingSet) {
        let idx = match self.revisions.binary_search_by_key(&id, |r| r.id) {
            Ok(idx) => idx,
            Err(_) => panic!("revision id {} cannot be reverted", id),
        };
        let journal_index = self.revisions[idx].journal_index;
        self.rollback_to(journal_index, set);
        self.revisions.truncate(idx);
    }

    /// Undo entries backward until `len` remain
    pub fn rollback_to(&mut self, len: usize, set: &mut WorkingSet) {
        if len >= self.entries.len() {
            return;
        }
        let undone = self.entries.len() - len;
        for entry in self.entries.drain(len..).rev() {
            entry.undo(set);
        }
        log::debug!("journal: undid {} entries", undone);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.revisions.clear();
    }
}
