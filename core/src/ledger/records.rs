//! Rows persisted by the ledger.

use serde::{Deserialize, Serialize};

use dece_privacy::{
    AssetCommitment, Commitment, CryptoOracle, Family, OracleError, PseudoAddress,
};
use dece_transaction::{OutC, OutP, PkgCreate, PkgId};

/// Body of an accepted output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputPayload {
    Plain(OutP),
    Shielded(OutC),
}

impl OutputPayload {
    pub fn family(&self) -> Family {
        match self {
            OutputPayload::Plain(_) => Family::Plain,
            OutputPayload::Shielded(_) => Family::Shielded,
        }
    }

    pub fn pkr(&self) -> &PseudoAddress {
        match self {
            OutputPayload::Plain(out) => &out.pkr,
            OutputPayload::Shielded(out) => &out.pkr,
        }
    }

    /// Randomness slot of the root commitment: zero for plain outputs,
    /// the ephemeral `rpk` for shielded ones
    pub fn randomness(&self) -> [u8; 32] {
        match self {
            OutputPayload::Plain(_) => [0u8; 32],
            OutputPayload::Shielded(out) => out.rpk,
        }
    }

    /// Commitment bound into the root commitment
    pub fn asset_cm(&self, oracle: &dyn CryptoOracle) -> Result<AssetCommitment, OracleError> {
        match self {
            OutputPayload::Plain(out) => oracle.asset_cc(&out.asset),
            OutputPayload::Shielded(out) => Ok(out.asset_cm),
        }
    }

    /// Root commitment of this payload at leaf `index`
    pub fn root_cm(&self, oracle: &dyn CryptoOracle, index: u64) -> Result<Commitment, OracleError> {
        let asset_cm = self.asset_cm(oracle)?;
        Ok(oracle.gen_root_cm(index, &asset_cm, self.pkr(), &self.randomness()))
    }
}

/// An output accepted into state. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    /// Leaf index in its family's accumulator
    pub index: u64,
    pub root_cm: Commitment,
    pub payload: OutputPayload,
}

impl OutputRecord {
    pub fn family(&self) -> Family {
        self.payload.family()
    }
}

/// Per-output detail row written when its block is recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootState {
    pub record: OutputRecord,
    pub tx_hash: [u8; 32],
    /// Block the output landed in
    pub num: u64,
}

/// Escrowed shielded asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Block number of creation
    pub high: u64,
    pub from: PseudoAddress,
    /// Creation payload; `create.pkr` tracks the current owner
    pub create: PkgCreate,
    pub closed: bool,
}

impl Package {
    pub fn id(&self) -> PkgId {
        self.create.id
    }

    pub fn owner(&self) -> &PseudoAddress {
        &self.create.pkr
    }
}

/// Everything one block touched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub roots: Vec<Commitment>,
    /// Spent nullifiers and roots
    pub dels: Vec<[u8; 32]>,
    pub pkgs: Vec<PkgId>,
}

/// `num || hash` key of a block record
pub fn block_key(num: u64, hash: &[u8; 32]) -> Vec<u8> {
    let mut key = Vec::with_capacity(40);
    key.extend_from_slice(&num.to_be_bytes());
    key.extend_from_slice(hash);
    key
}

/// `family || index` key of a leaf
pub fn leaf_key(family: Family, index: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(9);
    key.push(family.tag());
    key.extend_from_slice(&index.to_be_bytes());
    key
}

/// `family || anchor` key of a produced anchor
pub fn anchor_key(family: Family, anchor: &[u8; 32]) -> Vec<u8> {
    let mut key = Vec::with_capacity(33);
    key.push(family.tag());
    key.extend_from_slice(anchor);
    key
}
