mod txtool;

use std::sync::Arc;

use dece_config::{ProtocolConfig, VerifierConfig};
use dece_privacy::{
    Asset, CryptoOracle, Family, PseudoAddress, PublicKey, ReferenceOracle, SecretKey, TracingKey, Token,
};
use dece_transaction::ExternalTransfer;

use crate::ledger::{LedgerState, OutputRecord, ShieldedView};
use crate::storage::{KvStore, MemoryStore};
use crate::txtool::{ProofPool, TxBuilder, TxVerifier};

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub(crate) fn oracle() -> Arc<dyn CryptoOracle> {
    Arc::new(ReferenceOracle::new())
}

pub(crate) fn dece(value: u128) -> Asset {
    Asset::token(Token::dece(value))
}

/// Key material of one test participant
pub(crate) struct Wallet {
    pub sk: SecretKey,
    pub tk: TracingKey,
    pub pk: PublicKey,
}

impl Wallet {
    pub fn new(oracle: &dyn CryptoOracle, seed: u8) -> Self {
        let sk = SecretKey([seed; 32]);
        let tk = oracle.derive_tracing_key(&sk);
        let pk = oracle.derive_public_key(&tk).unwrap();
        Self { sk, tk, pk }
    }

    pub fn pkr(&self, oracle: &dyn CryptoOracle) -> PseudoAddress {
        oracle.gen_pkr(&self.pk).unwrap()
    }
}

pub(crate) fn memory_state(num: u64) -> LedgerState<MemoryStore> {
    LedgerState::load(
        Arc::new(MemoryStore::new()),
        num,
        oracle(),
        ProtocolConfig::default(),
    )
    .unwrap()
}

/// Credit `value` DECE to `to` as a plain output and return its record
pub(crate) fn fund<S: KvStore>(state: &LedgerState<S>, to: PseudoAddress, value: u128, tag: u8) -> OutputRecord {
    let index = state.leaf_size(Family::Plain);
    state
        .add_external_out(&ExternalTransfer {
            to,
            asset: dece(value),
            tx_hash: [tag; 32],
        })
        .unwrap();
    record_at(state, Family::Plain, index)
}

pub(crate) fn record_at<S: KvStore>(state: &LedgerState<S>, family: Family, index: u64) -> OutputRecord {
    let leaf = state.leaf(family, index).unwrap();
    state.get_out(&leaf).unwrap().unwrap()
}

pub(crate) struct Tools {
    pub builder: TxBuilder,
    pub verifier: TxVerifier,
}

pub(crate) fn tools() -> Tools {
    let protocol = ProtocolConfig::default();
    let pool = Arc::new(ProofPool::from_config(&VerifierConfig { threads: 2 }).unwrap());
    Tools {
        builder: TxBuilder::new(oracle(), protocol.clone()),
        verifier: TxVerifier::new(oracle(), pool, protocol),
    }
}
