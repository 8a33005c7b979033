//! Transaction Verifier
//!
//! `verify_without_state` needs nothing but the transaction: shape, limits,
//! signatures and proofs. `verify_with_state` replays the spends against a
//! `ShieldedView` and checks the balance over the recomputed descriptor,
//! which carries no blinding factors.

use log::{debug, warn};
use std::collections::HashSet;
use std::sync::Arc;

use dece_config::ProtocolConfig;
use dece_privacy::{
    Asset, AssetCommitment, BalanceDesc, CkState, CryptoOracle, Currency, Family, InputStatement,
    OutputStatement,
};
use dece_transaction::Tx;

use super::VerifyError;
use super::proof_pool::ProofPool;
use crate::ledger::{OutputPayload, ShieldedView, package_state};

pub struct TxVerifier {
    oracle: Arc<dyn CryptoOracle>,
    pool: Arc<ProofPool>,
    protocol: ProtocolConfig,
}

impl TxVerifier {
    pub fn new(oracle: Arc<dyn CryptoOracle>, pool: Arc<ProofPool>, protocol: ProtocolConfig) -> Self {
        Self {
            oracle,
            pool,
            protocol,
        }
    }

    fn reject(tx: &Tx, reason: String) -> VerifyError {
        let err = VerifyError {
            reason,
            tx_hash: tx.hash(),
        };
        warn!("{}", err);
        err
    }

    /// Both passes in order
    pub fn verify(
        &self,
        ehash: &[u8; 32],
        tx: &Tx,
        num: u64,
        view: &dyn ShieldedView,
    ) -> Result<(), VerifyError> {
        self.verify_without_state(ehash, tx, num)?;
        self.verify_with_state(tx, view)
    }

    pub fn verify_without_state(&self, ehash: &[u8; 32], tx: &Tx, num: u64) -> Result<(), VerifyError> {
        self.check_static(ehash, tx)
            .map_err(|reason| Self::reject(tx, reason))?;
        debug!(
            "tx {} passed stateless checks for block {}",
            hex::encode(&tx.hash()[..8]),
            num
        );
        Ok(())
    }

    pub fn verify_with_state(&self, tx: &Tx, view: &dyn ShieldedView) -> Result<(), VerifyError> {
        self.check_state(tx, view)
            .map_err(|reason| Self::reject(tx, reason))
    }

    fn check_static(&self, ehash: &[u8; 32], tx: &Tx) -> Result<(), String> {
        if &tx.ehash != ehash {
            return Err("ehash mismatch".to_string());
        }

        // proofs run on the pool while the cheap checks below proceed
        let mut batch = self.pool.batch();
        for in_c in &tx.body.ins_c {
            let oracle = self.oracle.clone();
            let proof = in_c.proof;
            let stmt = InputStatement {
                anchor: in_c.anchor,
                nil: in_c.nil,
                asset_cm: in_c.asset_cm,
                zpka: in_c.zpka,
            };
            batch.submit("input", move || oracle.verify_input(&proof, &stmt));
        }
        for out in &tx.body.outs_c {
            let oracle = self.oracle.clone();
            let proof = out.proof;
            let stmt = OutputStatement {
                asset_cm: out.asset_cm,
                pkr: out.pkr,
            };
            batch.submit("output", move || oracle.verify_output(&proof, &stmt));
        }
        if let Some(create) = &tx.desc_pkg.create {
            let oracle = self.oracle.clone();
            let proof = create.proof;
            let stmt = OutputStatement {
                asset_cm: create.asset_cm,
                pkr: create.pkr,
            };
            batch.submit("package", move || oracle.verify_package(&proof, &stmt));
        }

        let oracle = self.oracle.as_ref();
        let protocol = &self.protocol;
        let hash = tx.signing_hash();

        if tx.fee.currency != Currency::dece() || !tx.fee.is_valid() {
            return Err("invalid fee".to_string());
        }
        if !oracle.is_pkr_valid(&tx.from) || !oracle.verify_sig(&hash, &tx.sign, &tx.from) {
            return Err("invalid from signature".to_string());
        }

        if tx.desc_pkg.count() + tx.desc_cmd.count() > 1 {
            return Err("pkg and cmd desc only exists one".to_string());
        }
        if let Some(asset) = tx.desc_cmd.asset() {
            if !asset.is_valid() {
                return Err("cmd asset out of range".to_string());
            }
        }
        if let Some(pkr) = tx.desc_cmd.to_pkr() {
            if !oracle.is_pkr_valid(&pkr) {
                return Err("cmd address malformed".to_string());
            }
        }
        if let Some(pool) = &tx.desc_cmd.regist_pool {
            if pool.fee_rate < protocol.lowest_fee_rate || pool.fee_rate > protocol.highest_fee_rate {
                return Err(format!("pool fee rate {} out of range", pool.fee_rate));
            }
        }
        if let Some(contract) = &tx.desc_cmd.contract {
            if contract.to == Some([0u8; 20]) {
                return Err("contract target is zero".to_string());
            }
        }
        if let Some(create) = &tx.desc_pkg.create {
            if !oracle.is_pkr_valid(&create.pkr) {
                return Err("package owner malformed".to_string());
            }
        }
        if let Some(transfer) = &tx.desc_pkg.transfer {
            if !oracle.is_pkr_valid(&transfer.pkr) {
                return Err("package recipient malformed".to_string());
            }
        }

        let body = &tx.body;
        let outs = tx.out_count();
        if outs > protocol.max_z_out_length {
            return Err(format!("{} outputs exceed {}", outs, protocol.max_z_out_length));
        }

        let mut seen = HashSet::new();
        if !body.nullifiers().all(|nil| seen.insert(nil.0)) {
            return Err("duplicate nullifier".to_string());
        }
        let mut roots = HashSet::new();
        if !body.ins_p.iter().all(|in_p| roots.insert(in_p.root)) {
            return Err("duplicate in_p root".to_string());
        }

        for in_c in &body.ins_c {
            if !oracle.verify_zpka(&hash, &in_c.sign, &in_c.zpka) {
                return Err("invalid in_c signature".to_string());
            }
        }
        for out in &body.outs_p {
            if !oracle.is_pkr_valid(&out.pkr) {
                return Err("out_p address malformed".to_string());
            }
            if !out.asset.is_valid() {
                return Err("out_p asset out of range".to_string());
            }
        }
        for out in &body.outs_c {
            if !oracle.is_pkr_valid(&out.pkr) {
                return Err("out_c address malformed".to_string());
            }
        }

        batch.wait().map_err(|e| e.to_string())
    }

    fn check_state(&self, tx: &Tx, view: &dyn ShieldedView) -> Result<(), String> {
        let oracle = self.oracle.as_ref();
        let hash = tx.signing_hash();
        let cc = |asset: &Asset| -> Result<AssetCommitment, String> {
            oracle.asset_cc(asset).map_err(|e| e.to_string())
        };
        let lookup = |e: crate::ledger::StateError| format!("state lookup failed: {}", e);

        let mut desc = BalanceDesc {
            hash,
            ..Default::default()
        };
        let mut ck = CkState::new(&tx.fee);
        desc.oout_accs.push(cc(&Asset::token(tx.fee))?);

        for in_p in &tx.body.ins_p {
            let record = view
                .get_out(&in_p.root)
                .map_err(lookup)?
                .ok_or("in_p output not found")?;
            if view.has_in(&in_p.nil.0).map_err(lookup)? {
                return Err("in_p nullifier already used".to_string());
            }
            if view.has_in(&in_p.root.0).map_err(lookup)? {
                return Err("in_p root already used".to_string());
            }

            let pkr = record.payload.pkr();
            if !oracle.verify_sig(&hash, &in_p.asign, pkr) {
                return Err("invalid in_p asign".to_string());
            }
            if !oracle.verify_nil(&hash, &in_p.nsign, &in_p.nil, &in_p.root, pkr) {
                return Err("invalid in_p nsign".to_string());
            }

            let asset = match &record.payload {
                OutputPayload::Plain(out) => out.asset,
                OutputPayload::Shielded(out) => {
                    let key = in_p.key.ok_or("in_p key missing")?;
                    let (asset, _, ar) = oracle
                        .decrypt_output(&key, &out.einfo)
                        .map_err(|e| format!("in_p payload: {}", e))?;
                    let (cm, _) = oracle.commit_asset(&asset, &ar).map_err(|e| e.to_string())?;
                    if cm != out.asset_cm {
                        return Err("in_p payload does not match its commitment".to_string());
                    }
                    asset
                }
            };
            desc.oin_accs.push(cc(&asset)?);
            ck.add_in(&asset);
        }

        for in_c in &tx.body.ins_c {
            if !view.has_anchor(Family::Shielded, &in_c.anchor).map_err(lookup)? {
                return Err("in_c anchor unknown".to_string());
            }
            if view.has_in(&in_c.nil.0).map_err(lookup)? {
                return Err("in_c nullifier already used".to_string());
            }
            desc.zin_acms.push(in_c.asset_cm);
        }

        for out in &tx.body.outs_c {
            desc.zout_acms.push(out.asset_cm);
        }
        for out in &tx.body.outs_p {
            desc.oout_accs.push(cc(&out.asset)?);
            ck.add_out(&out.asset);
        }
        if let Some(asset) = tx.desc_cmd.asset() {
            desc.oout_accs.push(cc(&asset)?);
            ck.add_out(&asset);
        }

        let pkg = &tx.desc_pkg;
        if let Some(create) = &pkg.create {
            let existing = view.get_pkg(&create.id).map_err(lookup)?;
            package_state::ensure_absent(&create.id, existing.as_ref()).map_err(|e| e.to_string())?;
            desc.zout_acms.push(create.asset_cm);
        }
        if let Some(transfer) = &pkg.transfer {
            let existing = view.get_pkg(&transfer.id).map_err(lookup)?;
            let current = package_state::ensure_open(&transfer.id, existing).map_err(|e| e.to_string())?;
            package_state::verify_owner(oracle, &current, &hash, &transfer.sign)
                .map_err(|e| e.to_string())?;
        }
        if let Some(close) = &pkg.close {
            let existing = view.get_pkg(&close.id).map_err(lookup)?;
            let current = package_state::ensure_open(&close.id, existing).map_err(|e| e.to_string())?;
            package_state::verify_owner(oracle, &current, &hash, &close.sign)
                .map_err(|e| e.to_string())?;
            desc.zin_acms.push(current.create.asset_cm);
        }

        if desc.has_shielded() {
            oracle
                .verify_balance(&desc, &tx.balance)
                .map_err(|e| format!("balance: {}", e))
        } else {
            ck.check().map_err(|e| format!("balance: {}", e))
        }
    }
}
