//! Ledger-level side commands (staking and contract calls).

use serde::{Deserialize, Serialize};

use dece_privacy::{Asset, PseudoAddress, Token};

use crate::TxHash;

/// Stake purchase; the value leaves the shielded ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyShare {
    pub value: u128,
    pub vote: PseudoAddress,
    pub pool: Option<[u8; 32]>,
}

/// Staking pool registration with its fee rate in basis points of 10000
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistPool {
    pub value: u128,
    pub vote: PseudoAddress,
    pub fee_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosePool {}

/// Call into the account-based engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub asset: Asset,
    /// Target account, `None` for a creation
    pub to: Option<[u8; 20]>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmdDesc {
    pub buy_share: Option<BuyShare>,
    pub regist_pool: Option<RegistPool>,
    pub close_pool: Option<ClosePool>,
    pub contract: Option<Contract>,
}

impl CmdDesc {
    pub fn count(&self) -> usize {
        [
            self.buy_share.is_some(),
            self.regist_pool.is_some(),
            self.close_pool.is_some(),
            self.contract.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }

    pub fn is_valid(&self) -> bool {
        self.count() <= 1
    }

    /// Value the command takes out of the transaction
    pub fn asset(&self) -> Option<Asset> {
        if let Some(cmd) = &self.buy_share {
            return Some(Asset::token(Token::dece(cmd.value)));
        }
        if let Some(cmd) = &self.regist_pool {
            return Some(Asset::token(Token::dece(cmd.value)));
        }
        if let Some(cmd) = &self.contract {
            return Some(cmd.asset);
        }
        None
    }

    /// Pseudo-address the command names, if any
    pub fn to_pkr(&self) -> Option<PseudoAddress> {
        if let Some(cmd) = &self.buy_share {
            return Some(cmd.vote);
        }
        if let Some(cmd) = &self.regist_pool {
            return Some(cmd.vote);
        }
        None
    }
}

impl TxHash for BuyShare {
    fn hash_for_sign(&self, hasher: &mut blake3::Hasher) {
        hasher.update(&self.value.to_le_bytes());
        hasher.update(&self.vote.to_bytes());
        hasher.update(&self.pool.unwrap_or_default());
    }
}

impl TxHash for RegistPool {
    fn hash_for_sign(&self, hasher: &mut blake3::Hasher) {
        hasher.update(&self.value.to_le_bytes());
        hasher.update(&self.vote.to_bytes());
        hasher.update(&self.fee_rate.to_le_bytes());
    }
}

impl TxHash for ClosePool {
    fn hash_for_sign(&self, hasher: &mut blake3::Hasher) {
        hasher.update(b"close_pool");
    }
}

impl TxHash for Contract {
    fn hash_for_sign(&self, hasher: &mut blake3::Hasher) {
        hasher.update(&self.asset.hash());
        hasher.update(&self.to.unwrap_or_default());
        hasher.update(&(self.data.len() as u64).to_le_bytes());
        hasher.update(&self.data);
    }
}

impl TxHash for CmdDesc {
    fn hash_for_sign(&self, hasher: &mut blake3::Hasher) {
        self.buy_share.hash_for_sign(hasher);
        self.regist_pool.hash_for_sign(hasher);
        self.close_pool.hash_for_sign(hasher);
        self.contract.hash_for_sign(hasher);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buy_share_spends_dece() {
        let cmd = CmdDesc {
            buy_share: Some(BuyShare {
                value: 500,
                vote: PseudoAddress::default(),
                pool: None,
            }),
            ..Default::default()
        };
        assert!(cmd.is_valid());
        assert_eq!(cmd.asset(), Some(Asset::token(Token::dece(500))));
        assert_eq!(cmd.to_pkr(), Some(PseudoAddress::default()));
    }

    #[test]
    fn close_pool_moves_nothing() {
        let cmd = CmdDesc {
            close_pool: Some(ClosePool {}),
            ..Default::default()
        };
        assert_eq!(cmd.count(), 1);
        assert_eq!(cmd.asset(), None);
    }
}
