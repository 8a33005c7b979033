//! Spend requests handed to the builder.

use dece_privacy::{Asset, AssetCommitment, Blinding, Memo, PseudoAddress, SecretKey, Token, Witness};
use dece_transaction::{BuyShare, ClosePool, Contract, PkgId, RegistPool};

use crate::ledger::OutputRecord;

/// An owned output to spend
#[derive(Debug, Clone)]
pub struct SpendIn {
    pub record: OutputRecord,
    /// Accumulator witness; only shielded-family outputs with one can be
    /// spent anonymously
    pub witness: Option<Witness>,
}

#[derive(Debug, Clone)]
pub struct SpendOut {
    pub pkr: PseudoAddress,
    pub asset: Asset,
    pub memo: Memo,
}

#[derive(Debug, Clone)]
pub struct PkgCreateCmd {
    pub id: PkgId,
    /// First owner
    pub pkr: PseudoAddress,
    pub asset: Asset,
    pub memo: Memo,
}

#[derive(Debug, Clone)]
pub struct PkgTransferCmd {
    pub id: PkgId,
    /// New owner
    pub pkr: PseudoAddress,
    /// Current owner, signed for with the spending key
    pub owner: PseudoAddress,
}

/// Close of an open package; the caller has opened its payload
#[derive(Debug, Clone)]
pub struct PkgCloseCmd {
    pub id: PkgId,
    pub owner: PseudoAddress,
    pub asset: Asset,
    pub ar: Blinding,
    pub asset_cm: AssetCommitment,
}

/// Side commands; at most one may be set
#[derive(Debug, Clone, Default)]
pub struct Cmds {
    pub buy_share: Option<BuyShare>,
    pub regist_pool: Option<RegistPool>,
    pub close_pool: Option<ClosePool>,
    pub contract: Option<Contract>,
    pub pkg_create: Option<PkgCreateCmd>,
    pub pkg_transfer: Option<PkgTransferCmd>,
    pub pkg_close: Option<PkgCloseCmd>,
}

impl Cmds {
    pub fn count(&self) -> usize {
        [
            self.buy_share.is_some(),
            self.regist_pool.is_some(),
            self.close_pool.is_some(),
            self.contract.is_some(),
            self.pkg_create.is_some(),
            self.pkg_transfer.is_some(),
            self.pkg_close.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }

    /// Outputs the commands add besides the requested ones
    pub fn out_count(&self) -> usize {
        let pays = self.buy_share.is_some() || self.regist_pool.is_some() || self.contract.is_some();
        usize::from(pays) + usize::from(self.pkg_create.is_some())
    }
}

#[derive(Debug, Clone)]
pub struct TxParam {
    /// Sender address; signs the whole transaction
    pub from: PseudoAddress,
    pub sk: SecretKey,
    pub ehash: [u8; 32],
    pub fee: Token,
    /// Spend shielded inputs anonymously and emit shielded outputs
    pub z: bool,
    pub ins: Vec<SpendIn>,
    pub outs: Vec<SpendOut>,
    pub cmds: Cmds,
}
