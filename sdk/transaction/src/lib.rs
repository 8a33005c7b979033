use serde::{Deserialize, Serialize};

use dece_privacy::{BalanceProof, PseudoAddress, Signature, Token};

pub mod body;
pub mod bridge;
pub mod cmd;
pub mod pkg;

pub use body::{InC, InP, OutC, OutP, TxBody};
pub use bridge::ExternalTransfer;
pub use cmd::{BuyShare, ClosePool, CmdDesc, Contract, RegistPool};
pub use pkg::{PkgClose, PkgCreate, PkgDesc, PkgId, PkgTransfer};

/// Incremental hashing of transaction parts.
///
/// `hash_for_sign` covers everything a signature commits to; signatures and
/// proofs are added on top by `hash_full`.
pub trait TxHash {
    fn hash_for_sign(&self, hasher: &mut blake3::Hasher);

    fn hash_full(&self, hasher: &mut blake3::Hasher) {
        self.hash_for_sign(hasher);
    }
}

impl<T: TxHash> TxHash for Option<T> {
    fn hash_for_sign(&self, hasher: &mut blake3::Hasher) {
        match self {
            Some(inner) => {
                hasher.update(&[1]);
                inner.hash_for_sign(hasher);
            }
            None => {
                hasher.update(&[0]);
            }
        }
    }

    fn hash_full(&self, hasher: &mut blake3::Hasher) {
        match self {
            Some(inner) => {
                hasher.update(&[1]);
                inner.hash_full(hasher);
            }
            None => {
                hasher.update(&[0]);
            }
        }
    }
}

impl<T: TxHash> TxHash for Vec<T> {
    fn hash_for_sign(&self, hasher: &mut blake3::Hasher) {
        hasher.update(&(self.len() as u64).to_le_bytes());
        for item in self {
            item.hash_for_sign(hasher);
        }
    }

    fn hash_full(&self, hasher: &mut blake3::Hasher) {
        hasher.update(&(self.len() as u64).to_le_bytes());
        for item in self {
            item.hash_full(hasher);
        }
    }
}

/// A shielded transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tx {
    /// Execution-side hash binding the gas terms
    pub ehash: [u8; 32],
    pub from: PseudoAddress,
    pub fee: Token,
    /// Sender signature over `signing_hash`
    pub sign: Signature,
    /// Aggregate balance proof, zeroed when only cleartext assets move
    pub balance: BalanceProof,
    pub desc_pkg: PkgDesc,
    pub desc_cmd: CmdDesc,
    pub body: TxBody,
}

impl Tx {
    /// Hash signed by every signature in the transaction
    pub fn signing_hash(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new_derive_key("dece-tx-sign-v1");
        self.hash_for_sign(&mut hasher);
        hasher.finalize().into()
    }

    /// Identity of the transaction, covering signatures and proofs
    pub fn hash(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new_derive_key("dece-tx-v1");
        self.hash_full(&mut hasher);
        hasher.finalize().into()
    }

    /// Outputs the transaction creates. The fee and a command payment count
    /// as open outputs, a package create as a shielded one.
    pub fn out_count(&self) -> usize {
        let oout = 1 + self.body.outs_p.len() + usize::from(self.desc_cmd.asset().is_some());
        let zout = self.body.outs_c.len() + usize::from(self.desc_pkg.create.is_some());
        oout + zout
    }

    pub fn has_shielded(&self) -> bool {
        !self.body.ins_c.is_empty()
            || !self.body.outs_c.is_empty()
            || self.desc_pkg.create.is_some()
            || self.desc_pkg.close.is_some()
    }
}

impl TxHash for Tx {
    fn hash_for_sign(&self, hasher: &mut blake3::Hasher) {
        hasher.update(&self.ehash);
        hasher.update(&self.from.to_bytes());
        hasher.update(&self.fee.to_bytes());
        self.desc_pkg.hash_for_sign(hasher);
        self.desc_cmd.hash_for_sign(hasher);
        self.body.hash_for_sign(hasher);
    }

    fn hash_full(&self, hasher: &mut blake3::Hasher) {
        hasher.update(&self.ehash);
        hasher.update(&self.from.to_bytes());
        hasher.update(&self.fee.to_bytes());
        hasher.update(self.sign.as_bytes());
        hasher.update(&self.balance.bcr);
        hasher.update(self.balance.bsign.as_bytes());
        self.desc_pkg.hash_full(hasher);
        self.desc_cmd.hash_full(hasher);
        self.body.hash_full(hasher);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dece_privacy::{Asset, Memo};

    fn sample_tx() -> Tx {
        Tx {
            ehash: [1u8; 32],
            from: PseudoAddress {
                zpk: [2u8; 32],
                r: [3u8; 32],
                ek: [4u8; 32],
            },
            fee: Token::dece(1),
            sign: Signature::default(),
            balance: BalanceProof::default(),
            desc_pkg: PkgDesc::default(),
            desc_cmd: CmdDesc::default(),
            body: TxBody {
                outs_p: vec![OutP {
                    pkr: PseudoAddress::default(),
                    asset: Asset::token(Token::dece(99)),
                    memo: Memo::default(),
                }],
                ..Default::default()
            },
        }
    }

    #[test]
    fn signing_hash_ignores_signatures() {
        let tx = sample_tx();
        let mut signed = tx.clone();
        signed.sign = Signature([9u8; 64]);

        assert_eq!(tx.signing_hash(), signed.signing_hash());
        assert_ne!(tx.hash(), signed.hash());
    }

    #[test]
    fn signing_hash_covers_outputs() {
        let tx = sample_tx();
        let mut changed = tx.clone();
        changed.body.outs_p[0].asset = Asset::token(Token::dece(98));
        assert_ne!(tx.signing_hash(), changed.signing_hash());
    }

    #[test]
    fn out_count_includes_fee_and_command() {
        let mut tx = sample_tx();
        assert_eq!(tx.out_count(), 2);

        tx.desc_cmd.buy_share = Some(BuyShare {
            value: 10,
            vote: PseudoAddress::default(),
            pool: None,
        });
        assert_eq!(tx.out_count(), 3);
    }

    #[test]
    fn tx_serde_roundtrip() {
        let tx = sample_tx();
        let json = serde_json::to_string(&tx).unwrap();
        let back: Tx = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tx);
        assert_eq!(back.hash(), tx.hash());
    }
}
