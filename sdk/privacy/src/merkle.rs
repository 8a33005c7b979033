//! Merkle Accumulator for Output Commitments
//!
//! Append-only sparse Merkle tree of root commitments. Every append moves
//! the root (the "anchor" spend proofs reference) and any historical leaf can
//! produce a witness against the current anchor.
//!
//! ```text
//!                    Root
//!                   /    \
//!                 H01    H23
//!                /  \   /   \
//!               H0  H1 H2   H3
//!               |   |   |    |
//!              C0  C1  C2   C3  (Root Commitments)
//! ```
//!
//! Plain and shielded outputs live in two independent trees whose hashes are
//! domain separated, so a witness from one family never verifies in the other.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::commitment::Commitment;
use crate::poseidon;

/// Tree depth (supports 2^32 outputs per family)
pub const TREE_DEPTH: usize = 32;

/// Leaf positions at or past this value do not fit the tree
pub const TREE_CAPACITY: u64 = 1 << TREE_DEPTH;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MerkleError {
    #[error("leaf index {index} out of range (tree holds {size} leaves)")]
    IndexOutOfRange { index: u64, size: u64 },
    #[error("leaf position {position} exceeds tree capacity {capacity}")]
    Full { position: u64, capacity: u64 },
}

/// Output family, one accumulator each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Family {
    /// Outputs carrying a cleartext asset
    Plain,
    /// Outputs carrying an encrypted payload and a blinded commitment
    Shielded,
}

impl Family {
    pub const ALL: [Family; 2] = [Family::Plain, Family::Shielded];

    fn domain(self) -> u64 {
        match self {
            Family::Plain => 0x5054_5245, // "PTRE"
            Family::Shielded => 0x5354_5245, // "STRE"
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            Family::Plain => b'P',
            Family::Shielded => b'S',
        }
    }
}

/// A Merkle path proving inclusion of a leaf
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerklePath {
    /// Tree the path belongs to
    pub family: Family,
    /// Sibling hashes from leaf to root
    pub siblings: Vec<[u8; 32]>,
    /// Position bits (0 = left, 1 = right)
    pub path_bits: Vec<bool>,
    /// The leaf position
    pub position: u64,
}

impl MerklePath {
    /// Verify that this path proves inclusion of `leaf` in `root`
    pub fn verify(&self, leaf: &Commitment, root: &[u8; 32]) -> bool {
        if self.siblings.len() != TREE_DEPTH || self.path_bits.len() != TREE_DEPTH {
            return false;
        }
        let hasher = MerkleHasher::new(self.family);
        let computed_root = hasher.compute_root_from_path(&leaf.0, &self.siblings, &self.path_bits);
        &computed_root == root
    }
}

/// Witness handed to a spender: the anchor plus the path reaching it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    pub anchor: [u8; 32],
    pub path: MerklePath,
}

/// Poseidon-based Merkle hash function
#[derive(Clone)]
pub struct MerkleHasher {
    family: Family,
    /// Precomputed empty subtree roots at each level
    empty_roots: Vec<[u8; 32]>,
}

impl MerkleHasher {
    pub fn new(family: Family) -> Self {
        let empty_leaf = poseidon::hash(family.domain(), &[&[0u8; 32]]);
        let mut hasher = Self {
            family,
            empty_roots: Vec::with_capacity(TREE_DEPTH + 1),
        };

        let mut current = empty_leaf;
        hasher.empty_roots.push(current);
        for _ in 0..TREE_DEPTH {
            current = hasher.hash_pair(&current, &current);
            hasher.empty_roots.push(current);
        }
        hasher
    }

    /// Hash two children to get parent
    pub fn hash_pair(&self, left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
        poseidon::hash(self.family.domain(), &[left, right])
    }

    /// Get the empty root at a given depth
    pub fn empty_root(&self, depth: usize) -> &[u8; 32] {
        &self.empty_roots[depth]
    }

    /// Compute root from leaf and authentication path
    pub fn compute_root_from_path(
        &self,
        leaf: &[u8; 32],
        siblings: &[[u8; 32]],
        path_bits: &[bool],
    ) -> [u8; 32] {
        let mut current = *leaf;

        for (sibling, is_right) in siblings.iter().zip(path_bits.iter()) {
            if *is_right {
                // Current node is on the right
                current = self.hash_pair(sibling, &current);
            } else {
                // Current node is on the left
                current = self.hash_pair(&current, sibling);
            }
        }

        current
    }
}

/// Sparse Merkle Tree for root commitments
///
/// Uses lazy evaluation - only stores non-empty nodes.
#[derive(Clone)]
pub struct MerkleTree {
    /// Non-empty nodes: (level, index) -> hash
    nodes: HashMap<(usize, u64), [u8; 32]>,
    /// Next available leaf position
    next_index: u64,
    /// Hasher for computing hashes
    hasher: MerkleHasher,
    /// Current root
    root: [u8; 32],
}

impl MerkleTree {
    /// Create a new empty tree
    pub fn new(family: Family) -> Self {
        let hasher = MerkleHasher::new(family);
        let root = *hasher.empty_root(TREE_DEPTH);

        Self {
            nodes: HashMap::new(),
            next_index: 0,
            hasher,
            root,
        }
    }

    pub fn family(&self) -> Family {
        self.hasher.family
    }

    /// Get current root
    pub fn root(&self) -> [u8; 32] {
        self.root
    }

    /// Number of leaves appended so far
    pub fn leaf_size(&self) -> u64 {
        self.next_index
    }

    /// Append a leaf, returning the new root and the leaf's index
    pub fn append_leaf(&mut self, leaf: &Commitment) -> Result<([u8; 32], u64), MerkleError> {
        let position = self.next_index;
        self.insert_at(position, leaf)?;
        Ok((self.root, position))
    }

    /// Insert at a specific position (for reconstruction)
    pub fn insert_at(&mut self, position: u64, leaf: &Commitment) -> Result<(), MerkleError> {
        if position >= TREE_CAPACITY {
            return Err(MerkleError::Full {
                position,
                capacity: TREE_CAPACITY,
            });
        }
        self.nodes.insert((0, position), leaf.0);
        self.next_index = self.next_index.max(position + 1);
        self.update_path(position, leaf.0);
        Ok(())
    }

    /// Rehash every ancestor of `position` up to the root
    fn update_path(&mut self, position: u64, leaf: [u8; 32]) {
        let mut current_index = position;
        let mut current_hash = leaf;

        for level in 0..TREE_DEPTH {
            let is_right = current_index & 1 == 1;
            let sibling_index = if is_right {
                current_index - 1
            } else {
                current_index + 1
            };

            let sibling = self
                .nodes
                .get(&(level, sibling_index))
                .copied()
                .unwrap_or_else(|| *self.hasher.empty_root(level));

            let parent_hash = if is_right {
                self.hasher.hash_pair(&sibling, &current_hash)
            } else {
                self.hasher.hash_pair(&current_hash, &sibling)
            };

            current_index /= 2;
            current_hash = parent_hash;

            self.nodes.insert((level + 1, current_index), parent_hash);
        }

        self.root = current_hash;
    }

    /// Witness for a historical leaf against the current root
    pub fn find_witness(&self, position: u64) -> Result<Witness, MerkleError> {
        if position >= self.next_index {
            return Err(MerkleError::IndexOutOfRange {
                index: position,
                size: self.next_index,
            });
        }

        let mut siblings = Vec::with_capacity(TREE_DEPTH);
        let mut path_bits = Vec::with_capacity(TREE_DEPTH);
        let mut current_index = position;

        for level in 0..TREE_DEPTH {
            let is_right = current_index & 1 == 1;
            path_bits.push(is_right);

            let sibling_index = if is_right {
                current_index - 1
            } else {
                current_index + 1
            };

            let sibling = self
                .nodes
                .get(&(level, sibling_index))
                .copied()
                .unwrap_or_else(|| *self.hasher.empty_root(level));

            siblings.push(sibling);
            current_index /= 2;
        }

        Ok(Witness {
            anchor: self.root,
            path: MerklePath {
                family: self.family(),
                siblings,
                path_bits,
                position,
            },
        })
    }

    /// Drop every leaf at or after `len` and restore the root of the prefix.
    ///
    /// Only ever used to undo appends of the current block.
    pub fn truncate(&mut self, len: u64) {
        if len >= self.next_index {
            return;
        }
        let old_len = self.next_index;

        for level in 0..=TREE_DEPTH {
            let first = len.div_ceil(1u64 << level);
            let last = (old_len - 1) >> level;
            for index in first..=last {
                self.nodes.remove(&(level, index));
            }
        }

        self.next_index = len;
        match len.checked_sub(1).and_then(|i| self.get(i).map(|c| (i, c))) {
            Some((last, leaf)) => self.update_path(last, leaf.0),
            None => {
                self.nodes.clear();
                self.root = *self.hasher.empty_root(TREE_DEPTH);
            }
        }
    }

    /// Check if a commitment exists at a position
    pub fn contains(&self, position: u64, commitment: &Commitment) -> bool {
        self.nodes
            .get(&(0, position))
            .map(|h| h == &commitment.0)
            .unwrap_or(false)
    }

    /// Get commitment at position
    pub fn get(&self, position: u64) -> Option<Commitment> {
        if position >= self.next_index {
            return None;
        }
        self.nodes.get(&(0, position)).map(|h| Commitment(*h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(b: u8) -> Commitment {
        Commitment([b; 32])
    }

    #[test]
    fn test_empty_tree() {
        let tree = MerkleTree::new(Family::Shielded);
        assert_eq!(tree.leaf_size(), 0);
        // Root should be the empty root
        let hasher = MerkleHasher::new(Family::Shielded);
        assert_eq!(tree.root(), *hasher.empty_root(TREE_DEPTH));
    }

    #[test]
    fn test_append_and_witness() {
        let mut tree = MerkleTree::new(Family::Shielded);

        let (_, pos1) = tree.append_leaf(&leaf(1)).unwrap();
        let (root, pos2) = tree.append_leaf(&leaf(2)).unwrap();

        assert_eq!(pos1, 0);
        assert_eq!(pos2, 1);
        assert_eq!(root, tree.root());

        let w1 = tree.find_witness(0).unwrap();
        assert_eq!(w1.anchor, tree.root());
        assert!(w1.path.verify(&leaf(1), &w1.anchor));

        let w2 = tree.find_witness(1).unwrap();
        assert!(w2.path.verify(&leaf(2), &w2.anchor));
    }

    #[test]
    fn test_positions_are_dense() {
        let mut tree = MerkleTree::new(Family::Plain);
        for n in 0..6u64 {
            let (root, pos) = tree.append_leaf(&leaf(n as u8)).unwrap();
            assert_eq!(pos, n);
            assert_eq!(root, tree.root());
            assert_eq!(tree.leaf_size(), n + 1);
            assert_eq!(tree.get(n), Some(leaf(n as u8)));
        }
        assert_eq!(tree.get(6), None);
        assert!(tree.find_witness(5).is_ok());
        assert_eq!(
            tree.find_witness(6),
            Err(MerkleError::IndexOutOfRange { index: 6, size: 6 })
        );
    }

    #[test]
    fn test_full_tree_rejects_append() {
        let mut tree = MerkleTree::new(Family::Plain);
        assert_eq!(
            tree.insert_at(TREE_CAPACITY, &leaf(1)),
            Err(MerkleError::Full {
                position: TREE_CAPACITY,
                capacity: TREE_CAPACITY
            })
        );
        assert_eq!(tree.leaf_size(), 0);

        tree.insert_at(TREE_CAPACITY - 1, &leaf(1)).unwrap();
        assert_eq!(tree.leaf_size(), TREE_CAPACITY);
        let root = tree.root();
        assert!(matches!(
            tree.append_leaf(&leaf(2)),
            Err(MerkleError::Full { .. })
        ));
        assert_eq!(tree.root(), root);
        assert_eq!(tree.leaf_size(), TREE_CAPACITY);
    }

    #[test]
    fn test_witness_out_of_range() {
        let mut tree = MerkleTree::new(Family::Plain);
        tree.append_leaf(&leaf(1)).unwrap();
        assert_eq!(
            tree.find_witness(1),
            Err(MerkleError::IndexOutOfRange { index: 1, size: 1 })
        );
    }

    #[test]
    fn test_witness_invalid_commitment() {
        let mut tree = MerkleTree::new(Family::Shielded);
        tree.append_leaf(&leaf(1)).unwrap();

        let w = tree.find_witness(0).unwrap();
        assert!(!w.path.verify(&leaf(99), &w.anchor));
    }

    #[test]
    fn test_old_leaves_follow_current_root() {
        let mut tree = MerkleTree::new(Family::Shielded);
        for b in 0..9u8 {
            tree.append_leaf(&leaf(b)).unwrap();
        }
        for i in 0..9u64 {
            let w = tree.find_witness(i).unwrap();
            assert_eq!(w.anchor, tree.root());
            assert!(w.path.verify(&leaf(i as u8), &tree.root()));
        }
    }

    #[test]
    fn test_families_are_separated() {
        let mut plain = MerkleTree::new(Family::Plain);
        let mut shielded = MerkleTree::new(Family::Shielded);
        plain.append_leaf(&leaf(1)).unwrap();
        shielded.append_leaf(&leaf(1)).unwrap();
        assert_ne!(plain.root(), shielded.root());

        let mut w = plain.find_witness(0).unwrap();
        w.path.family = Family::Shielded;
        assert!(!w.path.verify(&leaf(1), &plain.root()));
    }

    #[test]
    fn test_truncate_restores_prefix_root() {
        let mut tree = MerkleTree::new(Family::Shielded);
        tree.append_leaf(&leaf(1)).unwrap();
        tree.append_leaf(&leaf(2)).unwrap();
        tree.append_leaf(&leaf(3)).unwrap();
        let root3 = tree.root();

        tree.append_leaf(&leaf(4)).unwrap();
        tree.append_leaf(&leaf(5)).unwrap();
        tree.truncate(3);

        assert_eq!(tree.leaf_size(), 3);
        assert_eq!(tree.root(), root3);
        assert_eq!(tree.get(3), None);

        // appending again lands on the same index as before
        let (_, pos) = tree.append_leaf(&leaf(6)).unwrap();
        assert_eq!(pos, 3);
        let w = tree.find_witness(3).unwrap();
        assert!(w.path.verify(&leaf(6), &tree.root()));
    }

    #[test]
    fn test_truncate_to_empty() {
        let mut tree = MerkleTree::new(Family::Plain);
        let empty = tree.root();
        tree.append_leaf(&leaf(1)).unwrap();
        tree.truncate(0);
        assert_eq!(tree.root(), empty);
        assert_eq!(tree.leaf_size(), 0);
    }

    #[test]
    fn test_rebuild_matches_incremental() {
        let mut incremental = MerkleTree::new(Family::Shielded);
        for b in 1..=5u8 {
            incremental.append_leaf(&leaf(b)).unwrap();
        }

        let mut rebuilt = MerkleTree::new(Family::Shielded);
        for (i, b) in (1..=5u8).enumerate() {
            rebuilt.insert_at(i as u64, &leaf(b)).unwrap();
        }
        assert_eq!(rebuilt.root(), incremental.root());
        assert_eq!(rebuilt.leaf_size(), 5);
    }
}
