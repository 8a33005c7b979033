//! Transaction Builder
//!
//! Turns a `TxParam` into a signed, balance-proven `Tx`. Stages run in a
//! fixed order over one `SignCtx`:
//!
//! ```text
//!   check → prepare → from → fee → cmd → ins_p → ins_c → outs_c → outs_p
//!         → sign (signing hash, signatures, balance) → proofs
//! ```
//!
//! Proofs come last since they are not covered by the signing hash.

use log::debug;
use std::sync::Arc;

use dece_config::ProtocolConfig;
use dece_privacy::{
    Asset, BalanceDesc, Blinding, CkState, CryptoOracle, Currency, Family, InputStatement,
    InputWitness, OutputStatement, OutputWitness, Proof, Signature, TracingKey,
};
use dece_transaction::{
    CmdDesc, InC, InP, OutC, OutP, PkgClose, PkgCreate, PkgDesc, PkgTransfer, Tx, TxBody,
};

use super::BuildError;
use super::decode::confirm_out_c;
use super::params::{SpendIn, TxParam};
use crate::ledger::OutputPayload;

/// Output of a build
#[derive(Debug, Clone)]
pub struct SignedTx {
    pub tx: Tx,
    /// Payload key of each shielded output, in `outs_c` order
    pub keys: Vec<[u8; 32]>,
    /// Key opening the created package, for whoever will close it
    pub pkg_key: Option<[u8; 32]>,
}

pub struct TxBuilder {
    oracle: Arc<dyn CryptoOracle>,
    protocol: ProtocolConfig,
}

impl TxBuilder {
    pub fn new(oracle: Arc<dyn CryptoOracle>, protocol: ProtocolConfig) -> Self {
        Self { oracle, protocol }
    }

    pub fn build(&self, param: &TxParam) -> Result<SignedTx, BuildError> {
        let mut ctx = SignCtx::new(self.oracle.as_ref(), &self.protocol, param);
        ctx.check()?;
        ctx.prepare()?;
        ctx.gen_from()?;
        ctx.gen_fee()?;
        ctx.gen_cmd()?;
        ctx.gen_ins_p()?;
        ctx.gen_ins_c()?;
        ctx.gen_outs_c()?;
        ctx.gen_outs_p()?;
        ctx.gen_sign()?;
        ctx.gen_proofs()?;
        Ok(ctx.finish())
    }
}

/// Working state of one build
struct SignCtx<'a> {
    oracle: &'a dyn CryptoOracle,
    protocol: &'a ProtocolConfig,
    param: &'a TxParam,
    tk: TracingKey,

    ins_p: Vec<&'a SpendIn>,
    ins_c: Vec<&'a SpendIn>,

    tx: Tx,
    desc: BalanceDesc,
    ck: CkState,
    keys: Vec<[u8; 32]>,
    pkg_key: Option<[u8; 32]>,

    in_c_witnesses: Vec<(InputStatement, InputWitness)>,
    out_c_witnesses: Vec<OutputWitness>,
    pkg_witness: Option<OutputWitness>,
}

impl<'a> SignCtx<'a> {
    fn new(oracle: &'a dyn CryptoOracle, protocol: &'a ProtocolConfig, param: &'a TxParam) -> Self {
        Self {
            oracle,
            protocol,
            param,
            tk: oracle.derive_tracing_key(&param.sk),
            ins_p: Vec::new(),
            ins_c: Vec::new(),
            tx: Tx {
                ehash: param.ehash,
                from: param.from,
                fee: param.fee,
                sign: Signature::default(),
                balance: Default::default(),
                desc_pkg: PkgDesc::default(),
                desc_cmd: CmdDesc::default(),
                body: TxBody::default(),
            },
            desc: BalanceDesc::default(),
            ck: CkState::new(&param.fee),
            keys: Vec::new(),
            pkg_key: None,
            in_c_witnesses: Vec::new(),
            out_c_witnesses: Vec::new(),
            pkg_witness: None,
        }
    }

    /// Decrypt a shielded payload and confirm it against its commitment
    fn open(&self, out: &OutC) -> Result<(Asset, Blinding, [u8; 32]), String> {
        let oracle = self.oracle;
        let key = oracle
            .fetch_key(&self.tk, &out.pkr, &out.rpk)
            .map_err(|e| e.to_string())?;
        let opened = confirm_out_c(oracle, &key, out).map_err(|e| e.to_string())?;
        Ok((opened.asset, opened.ar, key))
    }

    fn check(&mut self) -> Result<(), BuildError> {
        let param = self.param;
        if param.cmds.count() > 1 {
            return Err(BuildError::Check("more than one command".to_string()));
        }
        if !self.oracle.is_my_pkr(&self.tk, &param.from) {
            return Err(BuildError::Check("from address is not owned by the key".to_string()));
        }
        for input in &param.ins {
            if !self.oracle.is_my_pkr(&self.tk, input.record.payload.pkr()) {
                return Err(BuildError::Check(format!(
                    "input {} is not owned by the key",
                    hex::encode(input.record.root_cm.0)
                )));
            }
        }
        debug!("build: {} inputs owned", param.ins.len());
        Ok(())
    }

    fn prepare(&mut self) -> Result<(), BuildError> {
        let param = self.param;
        for input in &param.ins {
            let anonymous = param.z
                && input.record.family() == Family::Shielded
                && input.witness.is_some();
            if anonymous {
                self.ins_c.push(input);
            } else {
                self.ins_p.push(input);
            }
        }

        // the fee is an output too
        let outs = 1 + param.outs.len() + param.cmds.out_count();
        if outs > self.protocol.max_z_out_length {
            return Err(BuildError::Prepare(format!(
                "{} outputs exceed {}",
                outs, self.protocol.max_z_out_length
            )));
        }
        debug!(
            "build: routed {} ins_p, {} ins_c, {} {} outputs",
            self.ins_p.len(),
            self.ins_c.len(),
            param.outs.len(),
            if param.z { "shielded" } else { "plain" }
        );
        Ok(())
    }

    fn gen_from(&mut self) -> Result<(), BuildError> {
        if !self.oracle.is_pkr_valid(&self.param.from) {
            return Err(BuildError::Prepare("from address is malformed".to_string()));
        }
        self.tx.from = self.param.from;
        Ok(())
    }

    fn gen_fee(&mut self) -> Result<(), BuildError> {
        let fee = self.param.fee;
        if fee.currency != Currency::dece() {
            return Err(BuildError::Fee(format!("fee paid in {}", fee.currency.name())));
        }
        if !fee.is_valid() {
            return Err(BuildError::Fee("fee value out of range".to_string()));
        }
        let cc = self
            .oracle
            .asset_cc(&Asset::token(fee))
            .map_err(|e| BuildError::Fee(e.to_string()))?;
        self.desc.oout_accs.push(cc);
        debug!("build: fee {}", fee.value);
        Ok(())
    }

    fn gen_cmd(&mut self) -> Result<(), BuildError> {
        let oracle = self.oracle;
        let cmds = &self.param.cmds;

        self.tx.desc_cmd = CmdDesc {
            buy_share: cmds.buy_share.clone(),
            regist_pool: cmds.regist_pool.clone(),
            close_pool: cmds.close_pool.clone(),
            contract: cmds.contract.clone(),
        };
        if let Some(pool) = &cmds.regist_pool {
            let bounds = self.protocol.lowest_fee_rate..=self.protocol.highest_fee_rate;
            if !bounds.contains(&pool.fee_rate) {
                return Err(BuildError::Command(format!(
                    "pool fee rate {} out of range",
                    pool.fee_rate
                )));
            }
        }
        if let Some(contract) = &cmds.contract {
            if contract.to == Some([0u8; 20]) {
                return Err(BuildError::Command("contract target is zero".to_string()));
            }
        }
        if let Some(asset) = self.tx.desc_cmd.asset() {
            let cc = oracle
                .asset_cc(&asset)
                .map_err(|e| BuildError::Command(e.to_string()))?;
            self.desc.oout_accs.push(cc);
            self.ck.add_out(&asset);
        }

        if let Some(cmd) = &cmds.pkg_create {
            let key = oracle.gen_pkg_key(&self.tk, &self.param.from);
            let ar = oracle.random_blinding();
            let (asset_cm, _) = oracle
                .commit_asset(&cmd.asset, &ar)
                .map_err(|e| BuildError::Command(e.to_string()))?;
            let einfo = oracle
                .encrypt_output(&key, &cmd.asset, &cmd.memo, &ar)
                .map_err(|e| BuildError::Command(e.to_string()))?;

            self.tx.desc_pkg.create = Some(PkgCreate {
                id: cmd.id,
                pkr: cmd.pkr,
                asset_cm,
                einfo,
                proof: Proof::default(),
            });
            self.desc.zout_acms.push(asset_cm);
            self.desc.zout_ars.push(ar);
            self.ck.add_out(&cmd.asset);
            self.pkg_witness = Some(OutputWitness { asset: cmd.asset, ar });
            self.pkg_key = Some(key);
        }
        if let Some(cmd) = &cmds.pkg_transfer {
            self.tx.desc_pkg.transfer = Some(PkgTransfer {
                id: cmd.id,
                pkr: cmd.pkr,
                sign: Signature::default(),
            });
        }
        if let Some(cmd) = &cmds.pkg_close {
            self.tx.desc_pkg.close = Some(PkgClose {
                id: cmd.id,
                sign: Signature::default(),
            });
            self.desc.zin_acms.push(cmd.asset_cm);
            self.desc.zin_ars.push(cmd.ar);
            self.ck.add_in(&cmd.asset);
        }
        debug!("build: {} command(s)", cmds.count());
        Ok(())
    }

    fn gen_ins_p(&mut self) -> Result<(), BuildError> {
        let oracle = self.oracle;
        for input in self.ins_p.clone() {
            let record = &input.record;
            let pkr = record.payload.pkr();
            let nil = oracle
                .derive_nullifier(&self.tk, &record.root_cm, pkr)
                .map_err(|e| BuildError::InputP(e.to_string()))?;

            let (asset, key) = match &record.payload {
                OutputPayload::Plain(out) => (out.asset, None),
                OutputPayload::Shielded(out) => {
                    let (asset, _, key) = self.open(out).map_err(BuildError::InputP)?;
                    (asset, Some(key))
                }
            };
            let cc = oracle
                .asset_cc(&asset)
                .map_err(|e| BuildError::InputP(e.to_string()))?;
            self.desc.oin_accs.push(cc);
            self.ck.add_in(&asset);

            self.tx.body.ins_p.push(InP {
                root: record.root_cm,
                nil,
                key,
                asign: Signature::default(),
                nsign: Signature::default(),
            });
        }
        debug!("build: {} ins_p", self.tx.body.ins_p.len());
        Ok(())
    }

    fn gen_ins_c(&mut self) -> Result<(), BuildError> {
        let oracle = self.oracle;
        for input in self.ins_c.clone() {
            let record = &input.record;
            let OutputPayload::Shielded(out) = &record.payload else {
                return Err(BuildError::InputC("input is not shielded".to_string()));
            };
            let Some(witness) = &input.witness else {
                return Err(BuildError::InputC("input has no witness".to_string()));
            };
            if witness.path.position != record.index {
                return Err(BuildError::InputC(format!(
                    "witness is for leaf {}, input is leaf {}",
                    witness.path.position, record.index
                )));
            }

            let (asset, ar_old, _) = self.open(out).map_err(BuildError::InputC)?;
            let ar = oracle.random_blinding();
            let alpha = oracle.random_blinding();
            let (asset_cm, _) = oracle
                .commit_asset(&asset, &ar)
                .map_err(|e| BuildError::InputC(e.to_string()))?;
            let zpka = oracle
                .gen_zpka(&out.pkr, &alpha)
                .map_err(|e| BuildError::InputC(e.to_string()))?;
            let nil = oracle
                .derive_nullifier(&self.tk, &record.root_cm, &out.pkr)
                .map_err(|e| BuildError::InputC(e.to_string()))?;

            let stmt = InputStatement {
                anchor: witness.anchor,
                nil,
                asset_cm,
                zpka,
            };
            self.tx.body.ins_c.push(InC {
                anchor: witness.anchor,
                nil,
                asset_cm,
                zpka,
                sign: Signature::default(),
                proof: Proof::default(),
            });
            self.desc.zin_acms.push(asset_cm);
            self.desc.zin_ars.push(ar);
            self.ck.add_in(&asset);
            self.in_c_witnesses.push((
                stmt,
                InputWitness {
                    tk: self.tk,
                    pkr: out.pkr,
                    rpk: out.rpk,
                    asset_cm_old: out.asset_cm,
                    ar_old,
                    asset,
                    ar,
                    alpha,
                    path: witness.path.clone(),
                },
            ));
        }
        debug!("build: {} ins_c", self.tx.body.ins_c.len());
        Ok(())
    }

    fn gen_outs_c(&mut self) -> Result<(), BuildError> {
        if !self.param.z {
            return Ok(());
        }
        let oracle = self.oracle;
        for out in &self.param.outs {
            if !oracle.is_pkr_valid(&out.pkr) {
                return Err(BuildError::OutputC("malformed recipient address".to_string()));
            }
            let ar = oracle.random_blinding();
            let (asset_cm, _) = oracle
                .commit_asset(&out.asset, &ar)
                .map_err(|e| BuildError::OutputC(e.to_string()))?;
            let (key, rpk) = oracle
                .gen_key(&out.pkr)
                .map_err(|e| BuildError::OutputC(e.to_string()))?;
            let einfo = oracle
                .encrypt_output(&key, &out.asset, &out.memo, &ar)
                .map_err(|e| BuildError::OutputC(e.to_string()))?;

            self.tx.body.outs_c.push(OutC {
                pkr: out.pkr,
                asset_cm,
                rpk,
                einfo,
                proof: Proof::default(),
            });
            self.desc.zout_acms.push(asset_cm);
            self.desc.zout_ars.push(ar);
            self.ck.add_out(&out.asset);
            self.keys.push(key);
            self.out_c_witnesses.push(OutputWitness {
                asset: out.asset,
                ar,
            });
        }
        debug!("build: {} outs_c", self.tx.body.outs_c.len());
        Ok(())
    }

    fn gen_outs_p(&mut self) -> Result<(), BuildError> {
        if self.param.z {
            return Ok(());
        }
        let oracle = self.oracle;
        for out in &self.param.outs {
            if !oracle.is_pkr_valid(&out.pkr) {
                return Err(BuildError::OutputP("malformed recipient address".to_string()));
            }
            let cc = oracle
                .asset_cc(&out.asset)
                .map_err(|e| BuildError::OutputP(e.to_string()))?;
            self.desc.oout_accs.push(cc);
            self.ck.add_out(&out.asset);
            self.tx.body.outs_p.push(OutP {
                pkr: out.pkr,
                asset: out.asset,
                memo: out.memo,
            });
        }
        debug!("build: {} outs_p", self.tx.body.outs_p.len());
        Ok(())
    }

    fn gen_sign(&mut self) -> Result<(), BuildError> {
        let oracle = self.oracle;
        let param = self.param;
        let sign_err = |e: dece_privacy::OracleError| BuildError::Sign(e.to_string());

        let hash = self.tx.signing_hash();
        self.desc.hash = hash;
        self.tx.sign = oracle.sign(&param.sk, &hash, &param.from).map_err(sign_err)?;

        for (in_p, input) in self.tx.body.ins_p.iter_mut().zip(&self.ins_p) {
            let pkr = input.record.payload.pkr();
            in_p.asign = oracle.sign(&param.sk, &hash, pkr).map_err(sign_err)?;
            in_p.nsign = oracle
                .sign_nil(&self.tk, &hash, &input.record.root_cm, pkr)
                .map_err(sign_err)?;
        }
        for (in_c, (_, witness)) in self.tx.body.ins_c.iter_mut().zip(&self.in_c_witnesses) {
            in_c.sign = oracle
                .sign_zpka(&param.sk, &hash, &witness.alpha, &witness.pkr)
                .map_err(sign_err)?;
        }

        if let (Some(transfer), Some(cmd)) = (&mut self.tx.desc_pkg.transfer, &param.cmds.pkg_transfer) {
            transfer.sign = oracle.sign(&param.sk, &hash, &cmd.owner).map_err(sign_err)?;
        }
        if let (Some(close), Some(cmd)) = (&mut self.tx.desc_pkg.close, &param.cmds.pkg_close) {
            close.sign = oracle.sign(&param.sk, &hash, &cmd.owner).map_err(sign_err)?;
        }

        self.ck
            .check()
            .map_err(|e| BuildError::Balance(e.to_string()))?;
        if self.desc.has_shielded() {
            self.tx.balance = oracle
                .sign_balance(&self.desc)
                .map_err(|e| BuildError::Balance(e.to_string()))?;
        }
        debug!("build: signed {}", hex::encode(&hash[..8]));
        Ok(())
    }

    fn gen_proofs(&mut self) -> Result<(), BuildError> {
        let oracle = self.oracle;
        let proof_err = |e: dece_privacy::OracleError| BuildError::Proof(e.to_string());

        for (in_c, (stmt, witness)) in self.tx.body.ins_c.iter_mut().zip(&self.in_c_witnesses) {
            in_c.proof = oracle.prove_input(stmt, witness).map_err(proof_err)?;
        }
        for (out, witness) in self.tx.body.outs_c.iter_mut().zip(&self.out_c_witnesses) {
            let stmt = OutputStatement {
                asset_cm: out.asset_cm,
                pkr: out.pkr,
            };
            out.proof = oracle.prove_output(&stmt, witness).map_err(proof_err)?;
        }
        if let (Some(create), Some(witness)) = (&mut self.tx.desc_pkg.create, &self.pkg_witness) {
            let stmt = OutputStatement {
                asset_cm: create.asset_cm,
                pkr: create.pkr,
            };
            create.proof = oracle.prove_package(&stmt, witness).map_err(proof_err)?;
        }
        debug!(
            "build: {} proofs",
            self.in_c_witnesses.len() + self.out_c_witnesses.len() + self.pkg_witness.iter().count()
        );
        Ok(())
    }

    fn finish(self) -> SignedTx {
        SignedTx {
            tx: self.tx,
            keys: self.keys,
            pkg_key: self.pkg_key,
        }
    }
}
