//! Package commands: escrowed shielded assets outside the accumulator.

use serde::{Deserialize, Serialize};

use dece_privacy::{AssetCommitment, EncryptedInfo, Proof, PseudoAddress, Signature};

use crate::TxHash;

/// Package identifier chosen by the creator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PkgId(pub [u8; 32]);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkgCreate {
    pub id: PkgId,
    /// Holder allowed to transfer or close
    pub pkr: PseudoAddress,
    pub asset_cm: AssetCommitment,
    /// Opening encrypted under the creator's package key
    pub einfo: EncryptedInfo,
    pub proof: Proof,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkgTransfer {
    pub id: PkgId,
    /// New holder
    pub pkr: PseudoAddress,
    /// Current holder's signature
    pub sign: Signature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkgClose {
    pub id: PkgId,
    pub sign: Signature,
}

/// At most one package command per transaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkgDesc {
    pub create: Option<PkgCreate>,
    pub transfer: Option<PkgTransfer>,
    pub close: Option<PkgClose>,
}

impl PkgDesc {
    pub fn count(&self) -> usize {
        [
            self.create.is_some(),
            self.transfer.is_some(),
            self.close.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }

    pub fn is_valid(&self) -> bool {
        self.count() <= 1
    }
}

impl TxHash for PkgCreate {
    fn hash_for_sign(&self, hasher: &mut blake3::Hasher) {
        hasher.update(&self.id.0);
        hasher.update(&self.pkr.to_bytes());
        hasher.update(&self.asset_cm.0);
        hasher.update(&self.einfo.0);
    }

    fn hash_full(&self, hasher: &mut blake3::Hasher) {
        self.hash_for_sign(hasher);
        hasher.update(&self.proof.0);
    }
}

impl TxHash for PkgTransfer {
    fn hash_for_sign(&self, hasher: &mut blake3::Hasher) {
        hasher.update(&self.id.0);
        hasher.update(&self.pkr.to_bytes());
    }

    fn hash_full(&self, hasher: &mut blake3::Hasher) {
        self.hash_for_sign(hasher);
        hasher.update(self.sign.as_bytes());
    }
}

impl TxHash for PkgClose {
    fn hash_for_sign(&self, hasher: &mut blake3::Hasher) {
        hasher.update(&self.id.0);
    }

    fn hash_full(&self, hasher: &mut blake3::Hasher) {
        self.hash_for_sign(hasher);
        hasher.update(self.sign.as_bytes());
    }
}

impl TxHash for PkgDesc {
    fn hash_for_sign(&self, hasher: &mut blake3::Hasher) {
        self.create.hash_for_sign(hasher);
        self.transfer.hash_for_sign(hasher);
        self.close.hash_for_sign(hasher);
    }

    fn hash_full(&self, hasher: &mut blake3::Hasher) {
        self.create.hash_full(hasher);
        self.transfer.hash_full(hasher);
        self.close.hash_full(hasher);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_commands_are_invalid() {
        let desc = PkgDesc {
            transfer: Some(PkgTransfer {
                id: PkgId([1u8; 32]),
                pkr: PseudoAddress::default(),
                sign: Signature::default(),
            }),
            close: Some(PkgClose {
                id: PkgId([1u8; 32]),
                sign: Signature::default(),
            }),
            ..Default::default()
        };
        assert_eq!(desc.count(), 2);
        assert!(!desc.is_valid());
        assert!(PkgDesc::default().is_valid());
    }
}
