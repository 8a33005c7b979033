//! Transaction body: inputs and outputs of both families.

use serde::{Deserialize, Serialize};

use dece_privacy::{
    Asset, AssetCommitment, Commitment, EncryptedInfo, Memo, Nullifier, Proof, PseudoAddress,
    Signature,
};

use crate::TxHash;

/// Spend of an output by its root commitment, revealing the asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InP {
    pub root: Commitment,
    pub nil: Nullifier,
    /// Payload key when the spent output is shielded
    pub key: Option<[u8; 32]>,
    /// Owner signature by the output's pseudo-address
    pub asign: Signature,
    /// Proof that `nil` belongs to the output
    pub nsign: Signature,
}

/// Anonymous spend of a shielded output against an anchor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InC {
    pub anchor: [u8; 32],
    pub nil: Nullifier,
    /// Re-randomised commitment of the spent asset
    pub asset_cm: AssetCommitment,
    pub zpka: [u8; 32],
    pub sign: Signature,
    pub proof: Proof,
}

/// Output with a blinded commitment and an encrypted opening
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutC {
    pub pkr: PseudoAddress,
    pub asset_cm: AssetCommitment,
    pub rpk: [u8; 32],
    pub einfo: EncryptedInfo,
    pub proof: Proof,
}

/// Output carrying its asset in cleartext
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutP {
    pub pkr: PseudoAddress,
    pub asset: Asset,
    pub memo: Memo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxBody {
    pub ins_p: Vec<InP>,
    pub ins_c: Vec<InC>,
    pub outs_c: Vec<OutC>,
    pub outs_p: Vec<OutP>,
}

impl TxBody {
    pub fn nullifiers(&self) -> impl Iterator<Item = &Nullifier> {
        self.ins_p
            .iter()
            .map(|i| &i.nil)
            .chain(self.ins_c.iter().map(|i| &i.nil))
    }
}

impl TxHash for InP {
    fn hash_for_sign(&self, hasher: &mut blake3::Hasher) {
        hasher.update(&self.root.0);
        hasher.update(&self.nil.0);
        match &self.key {
            Some(key) => {
                hasher.update(&[1]);
                hasher.update(key);
            }
            None => {
                hasher.update(&[0]);
            }
        }
    }

    fn hash_full(&self, hasher: &mut blake3::Hasher) {
        self.hash_for_sign(hasher);
        hasher.update(self.asign.as_bytes());
        hasher.update(self.nsign.as_bytes());
    }
}

impl TxHash for InC {
    fn hash_for_sign(&self, hasher: &mut blake3::Hasher) {
        hasher.update(&self.anchor);
        hasher.update(&self.nil.0);
        hasher.update(&self.asset_cm.0);
        hasher.update(&self.zpka);
    }

    fn hash_full(&self, hasher: &mut blake3::Hasher) {
        self.hash_for_sign(hasher);
        hasher.update(self.sign.as_bytes());
        hasher.update(&self.proof.0);
    }
}

impl TxHash for OutC {
    fn hash_for_sign(&self, hasher: &mut blake3::Hasher) {
        hasher.update(&self.pkr.to_bytes());
        hasher.update(&self.asset_cm.0);
        hasher.update(&self.rpk);
        hasher.update(&self.einfo.0);
    }

    fn hash_full(&self, hasher: &mut blake3::Hasher) {
        self.hash_for_sign(hasher);
        hasher.update(&self.proof.0);
    }
}

impl TxHash for OutP {
    fn hash_for_sign(&self, hasher: &mut blake3::Hasher) {
        hasher.update(&self.pkr.to_bytes());
        hasher.update(&self.asset.hash());
        hasher.update(&self.memo.0);
    }
}

impl TxHash for TxBody {
    fn hash_for_sign(&self, hasher: &mut blake3::Hasher) {
        self.ins_p.hash_for_sign(hasher);
        self.ins_c.hash_for_sign(hasher);
        self.outs_c.hash_for_sign(hasher);
        self.outs_p.hash_for_sign(hasher);
    }

    fn hash_full(&self, hasher: &mut blake3::Hasher) {
        self.ins_p.hash_full(hasher);
        self.ins_c.hash_full(hasher);
        self.outs_c.hash_full(hasher);
        self.outs_p.hash_full(hasher);
    }
}
