//! Commitments
//!
//! Two kinds of 32-byte commitment travel through the ledger:
//!
//! ```text
//! AssetCommitment = Σ v·H_asset + r·G          (Pedersen, hides the asset)
//! Commitment      = Poseidon(index || asset_cm || pkr || randomness)
//!                                              (root commitment, the leaf)
//! ```
//!
//! An unblinded asset commitment (`r = 0`) is the "cc" form used for
//! plaintext outputs and fees so they can enter the same balance equation.

use serde::{Deserialize, Serialize};

use crate::keys::PseudoAddress;
use crate::poseidon;

const ROOT_COMMITMENT_DOMAIN: u64 = 0x524f_4f54; // "ROOT"

/// Root commitment of an output (32 bytes), the accumulator leaf
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Commitment(pub [u8; 32]);

impl Commitment {
    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl AsRef<[u8]> for Commitment {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Compressed Pedersen commitment to an asset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetCommitment(pub [u8; 32]);

impl AsRef<[u8]> for AssetCommitment {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Blinding factor of an asset commitment (canonical scalar bytes)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blinding(pub [u8; 32]);

impl Blinding {
    pub const ZERO: Blinding = Blinding([0u8; 32]);
}

/// Root commitment scheme
pub struct CommitmentScheme;

impl CommitmentScheme {
    /// Commit an output at its accumulator position
    ///
    /// Plain outputs pass their unblinded asset commitment and a zero
    /// randomness; shielded outputs pass the blinded commitment and the
    /// public ephemeral value of their payload encryption.
    pub fn root_commitment(
        index: u64,
        asset_cm: &AssetCommitment,
        pkr: &PseudoAddress,
        randomness: &[u8; 32],
    ) -> Commitment {
        let mut index_bytes = [0u8; 32];
        index_bytes[..8].copy_from_slice(&index.to_le_bytes());

        Commitment(poseidon::hash(
            ROOT_COMMITMENT_DOMAIN,
            &[
                &index_bytes,
                &asset_cm.0,
                &pkr.zpk,
                &pkr.r,
                &pkr.ek,
                randomness,
            ],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkr() -> PseudoAddress {
        PseudoAddress {
            zpk: [1u8; 32],
            r: [2u8; 32],
            ek: [3u8; 32],
        }
    }

    #[test]
    fn root_commitment_deterministic() {
        let cm = AssetCommitment([9u8; 32]);
        let c1 = CommitmentScheme::root_commitment(4, &cm, &pkr(), &[0u8; 32]);
        let c2 = CommitmentScheme::root_commitment(4, &cm, &pkr(), &[0u8; 32]);
        assert_eq!(c1, c2, "same inputs should produce same commitment");
    }

    #[test]
    fn root_commitment_binds_index() {
        let cm = AssetCommitment([9u8; 32]);
        let c1 = CommitmentScheme::root_commitment(4, &cm, &pkr(), &[0u8; 32]);
        let c2 = CommitmentScheme::root_commitment(5, &cm, &pkr(), &[0u8; 32]);
        assert_ne!(c1, c2, "different positions should produce different commitments");
    }

    #[test]
    fn root_commitment_binds_randomness() {
        let cm = AssetCommitment([9u8; 32]);
        let c1 = CommitmentScheme::root_commitment(4, &cm, &pkr(), &[1u8; 32]);
        let c2 = CommitmentScheme::root_commitment(4, &cm, &pkr(), &[2u8; 32]);
        assert_ne!(c1, c2);
    }
}
