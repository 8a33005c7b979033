//! Output Store
//!
//! Dirty outputs and spent markers of the current block on top of the
//! durable store, plus one accumulator per output family.
//!
//! ```text
//!   has_in / get_out / has_anchor
//!        │
//!        ├── dirty maps (this block)
//!        └── KvStore (committed blocks)
//! ```

use anyhow::{Context, Result};
use std::collections::{BTreeSet, HashMap};

use dece_privacy::{Commitment, Family, MerkleError, MerkleTree, PseudoAddress};

use super::records::{OutputRecord, RootState, anchor_key, leaf_key};
use crate::storage::{Column, DbBatch, KvStore};

/// Output accepted during the current block
#[derive(Debug, Clone)]
pub(crate) struct DirtyOutput {
    pub record: OutputRecord,
    pub tx_hash: [u8; 32],
}

pub(crate) struct OutputState {
    plain: MerkleTree,
    shielded: MerkleTree,
    /// Insertion-ordered outputs of this block
    outputs: Vec<DirtyOutput>,
    by_root: HashMap<Commitment, usize>,
    spent: BTreeSet<[u8; 32]>,
    anchors: HashMap<(Family, [u8; 32]), u64>,
    external_counts: HashMap<PseudoAddress, usize>,
}

impl OutputState {
    /// Rebuild both accumulators from the persisted leaves
    pub fn load<S: KvStore>(store: &S) -> Result<Self> {
        let mut state = Self::empty();
        for family in Family::ALL {
            let tree = state.tree_mut(family);
            for (key, value) in store.scan_prefix(Column::Leaves, &[family.tag()])? {
                let index_bytes: [u8; 8] = key
                    .get(1..)
                    .and_then(|b| b.try_into().ok())
                    .context("invalid leaf key length")?;
                let leaf: [u8; 32] = value
                    .as_slice()
                    .try_into()
                    .context("invalid leaf length")?;
                tree.insert_at(u64::from_be_bytes(index_bytes), &Commitment(leaf))?;
            }
        }
        Ok(state)
    }

    pub fn empty() -> Self {
        Self {
            plain: MerkleTree::new(Family::Plain),
            shielded: MerkleTree::new(Family::Shielded),
            outputs: Vec::new(),
            by_root: HashMap::new(),
            spent: BTreeSet::new(),
            anchors: HashMap::new(),
            external_counts: HashMap::new(),
        }
    }

    /// Same accumulators, no dirty data. Only valid once the block is
    /// committed.
    pub fn carry(&self) -> Self {
        Self {
            plain: self.plain.clone(),
            shielded: self.shielded.clone(),
            outputs: Vec::new(),
            by_root: HashMap::new(),
            spent: BTreeSet::new(),
            anchors: HashMap::new(),
            external_counts: HashMap::new(),
        }
    }

    pub fn tree(&self, family: Family) -> &MerkleTree {
        match family {
            Family::Plain => &self.plain,
            Family::Shielded => &self.shielded,
        }
    }

    pub fn tree_mut(&mut self, family: Family) -> &mut MerkleTree {
        match family {
            Family::Plain => &mut self.plain,
            Family::Shielded => &mut self.shielded,
        }
    }

    pub fn has_in<S: KvStore>(&self, store: &S, value: &[u8; 32]) -> Result<bool> {
        if self.spent.contains(value) {
            return Ok(true);
        }
        store.contains(Column::Spent, value)
    }

    pub fn get_out<S: KvStore>(&self, store: &S, root: &Commitment) -> Result<Option<OutputRecord>> {
        if let Some(&pos) = self.by_root.get(root) {
            return Ok(Some(self.outputs[pos].record.clone()));
        }
        store.get_row(Column::Outputs, &root.0)
    }

    pub fn has_anchor<S: KvStore>(&self, store: &S, family: Family, anchor: &[u8; 32]) -> Result<bool> {
        if self.anchors.contains_key(&(family, *anchor)) {
            return Ok(true);
        }
        store.contains(Column::Anchors, &anchor_key(family, anchor))
    }

    // ---- journal hooks ----------------------------------------------------

    /// Append the output's leaf, returning the anchor it produced
    pub(crate) fn push_output(
        &mut self,
        record: OutputRecord,
        tx_hash: [u8; 32],
    ) -> Result<[u8; 32], MerkleError> {
        let family = record.family();
        let (anchor, index) = self.tree_mut(family).append_leaf(&record.root_cm)?;
        debug_assert_eq!(index, record.index);

        self.anchors.insert((family, anchor), index);
        self.by_root.insert(record.root_cm, self.outputs.len());
        self.outputs.push(DirtyOutput { record, tx_hash });
        Ok(anchor)
    }

    pub(crate) fn pop_output(&mut self, family: Family, record: &OutputRecord, anchor: &[u8; 32]) {
        self.tree_mut(family).truncate(record.index);
        self.anchors.remove(&(family, *anchor));
        if let Some(pos) = self.by_root.remove(&record.root_cm) {
            self.outputs.truncate(pos);
        }
    }

    pub(crate) fn mark_spent(&mut self, value: [u8; 32]) {
        self.spent.insert(value);
    }

    pub(crate) fn unmark_spent(&mut self, value: &[u8; 32]) {
        self.spent.remove(value);
    }

    pub(crate) fn bump_external(&mut self, pkr: &PseudoAddress) {
        *self.external_counts.entry(*pkr).or_insert(0) += 1;
    }

    pub(crate) fn drop_external(&mut self, pkr: &PseudoAddress) {
        if let Some(count) = self.external_counts.get_mut(pkr) {
            *count -= 1;
            if *count == 0 {
                self.external_counts.remove(pkr);
            }
        }
    }

    // ---- commit -----------------------------------------------------------

    /// Queue every dirty row into `batch`
    pub fn flush(&self, batch: &mut DbBatch) -> Result<()> {
        for out in &self.outputs {
            let record = &out.record;
            batch.put_row(Column::Outputs, record.root_cm.0, record)?;
            batch.put(
                Column::Leaves,
                leaf_key(record.family(), record.index),
                record.root_cm.0,
            );
        }
        for value in &self.spent {
            batch.put(Column::Spent, *value, Vec::new());
        }
        for ((family, anchor), index) in &self.anchors {
            batch.put(Column::Anchors, anchor_key(*family, anchor), index.to_be_bytes());
        }
        Ok(())
    }

    /// Hand over the block's touched sets and reset the dirty maps.
    /// The accumulators keep their leaves.
    pub fn take_block(&mut self, num: u64) -> (Vec<RootState>, Vec<[u8; 32]>) {
        let roots = self
            .outputs
            .drain(..)
            .map(|out| RootState {
                record: out.record,
                tx_hash: out.tx_hash,
                num,
            })
            .collect();
        let dels = std::mem::take(&mut self.spent).into_iter().collect();
        self.by_root.clear();
        self.anchors.clear();
        self.external_counts.clear();
        (roots, dels)
    }

    /// External transfers credited to `pkr` in this block
    pub fn external_count(&self, pkr: &PseudoAddress) -> usize {
        self.external_counts.get(pkr).copied().unwrap_or(0)
    }
}
