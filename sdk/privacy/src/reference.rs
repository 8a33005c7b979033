//! Reference Oracle
//!
//! Software implementation of [`CryptoOracle`] over the Ristretto group.
//!
//! ```text
//! Keys        a = H_s(sk)          PK = a·G
//!             b, c = H_s(view)     VK = b·G, EK = c·G
//! Pkr         R = r·G   zpk = PK + H_s(r·VK)·G   ek = r·EK
//! Asset cm    C = v·H_token + H_ticket + r·G
//! Nullifier   N = c·H_p(root_cm || pkr)
//! Output key  rpk = e·R   key = KDF(e·ek) = KDF(c·rpk)
//! Balance     Σin − Σout = x·G, Schnorr-signed under x
//! ```
//!
//! Proofs are binding digests over the public inputs, emitted only after the
//! prover has checked the witness. They stand in for a real proving system
//! the same way a mock batch prover does and give no zero-knowledge.

use curve25519_dalek::{
    constants::RISTRETTO_BASEPOINT_POINT,
    ristretto::{CompressedRistretto, RistrettoPoint},
    scalar::Scalar,
    traits::Identity,
};
use rand::RngCore;
use sha2::{Digest, Sha512};

use crate::asset::Asset;
use crate::commitment::{AssetCommitment, Blinding, Commitment, CommitmentScheme};
use crate::encryption::{self, EncryptedInfo, Memo};
use crate::keys::{PseudoAddress, PublicKey, SecretKey, TracingKey};
use crate::merkle::Family;
use crate::nullifier::Nullifier;
use crate::oracle::{
    BalanceDesc, BalanceProof, CryptoOracle, InputStatement, InputWitness, OracleError,
    OutputStatement, OutputWitness, Proof, Signature,
};

const G: RistrettoPoint = RISTRETTO_BASEPOINT_POINT;
const PROOF_CONTEXT: &str = "dece-reference-proof-v1";

const PKR_SIG: &[u8] = b"dece/pkr-sig";
const ZPKA_SIG: &[u8] = b"dece/zpka-sig";
const NIL_SIG: &[u8] = b"dece/nil-sig";
const BALANCE_SIG: &[u8] = b"dece/balance-sig";

#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceOracle;

impl ReferenceOracle {
    pub fn new() -> Self {
        Self
    }

    /// One-time secret behind `pkr.zpk`, if `sk` owns it
    fn one_time_secret(&self, sk: &SecretKey, pkr: &PseudoAddress) -> Result<Scalar, OracleError> {
        let tk = self.derive_tracing_key(sk);
        let view = ViewScalars::from_tracing_key(&tk)?;
        let r = decompress(&pkr.r, "pkr randomiser")?;

        let x = spend_scalar(sk) + pkr_tweak(&(view.b * r));
        if compress(&(x * G)) != pkr.zpk {
            return Err(OracleError::NotOwner);
        }
        Ok(x)
    }
}

struct ViewScalars {
    spend: RistrettoPoint,
    b: Scalar,
    c: Scalar,
}

impl ViewScalars {
    fn from_tracing_key(tk: &TracingKey) -> Result<Self, OracleError> {
        Ok(Self {
            spend: decompress(&tk.pk, "tracing key")?,
            b: hash_to_scalar(b"dece/view-b", &[&tk.view]),
            c: hash_to_scalar(b"dece/view-c", &[&tk.view]),
        })
    }
}

fn spend_scalar(sk: &SecretKey) -> Scalar {
    hash_to_scalar(b"dece/spend", &[&sk.0])
}

fn pkr_tweak(shared: &RistrettoPoint) -> Scalar {
    hash_to_scalar(b"dece/pkr", &[&compress(shared)])
}

fn nil_base(root_cm: &Commitment, pkr: &PseudoAddress) -> RistrettoPoint {
    hash_to_point(b"dece/nil", &[&root_cm.0, &pkr.to_bytes()])
}

fn wide_hash(domain: &[u8], parts: &[&[u8]]) -> [u8; 64] {
    let mut hasher = Sha512::new();
    hasher.update(domain);
    for part in parts {
        hasher.update(part);
    }
    let digest = hasher.finalize();
    let mut wide = [0u8; 64];
    wide.copy_from_slice(&digest);
    wide
}

fn hash_to_scalar(domain: &[u8], parts: &[&[u8]]) -> Scalar {
    Scalar::from_bytes_mod_order_wide(&wide_hash(domain, parts))
}

fn hash_to_point(domain: &[u8], parts: &[&[u8]]) -> RistrettoPoint {
    RistrettoPoint::from_uniform_bytes(&wide_hash(domain, parts))
}

fn random_scalar() -> Scalar {
    let mut wide = [0u8; 64];
    rand::thread_rng().fill_bytes(&mut wide);
    Scalar::from_bytes_mod_order_wide(&wide)
}

fn blinding_scalar(ar: &Blinding) -> Scalar {
    Scalar::from_bytes_mod_order(ar.0)
}

fn decompress(bytes: &[u8; 32], what: &'static str) -> Result<RistrettoPoint, OracleError> {
    CompressedRistretto(*bytes)
        .decompress()
        .ok_or(OracleError::InvalidPoint(what))
}

fn compress(point: &RistrettoPoint) -> [u8; 32] {
    point.compress().to_bytes()
}

fn split_signature(sig: &Signature) -> ([u8; 32], [u8; 32]) {
    let mut left = [0u8; 32];
    let mut right = [0u8; 32];
    left.copy_from_slice(&sig.0[..32]);
    right.copy_from_slice(&sig.0[32..]);
    (left, right)
}

fn join_signature(left: &[u8; 32], right: &[u8; 32]) -> Signature {
    let mut out = [0u8; 64];
    out[..32].copy_from_slice(left);
    out[32..].copy_from_slice(right);
    Signature(out)
}

fn canonical_scalar(bytes: [u8; 32]) -> Option<Scalar> {
    Option::from(Scalar::from_canonical_bytes(bytes))
}

fn schnorr_sign(domain: &[u8], x: &Scalar, public: &[u8; 32], msg: &[u8; 32]) -> Signature {
    let mut seed = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut seed);
    let k = hash_to_scalar(b"dece/nonce", &[x.as_bytes(), msg, &seed]);

    let big_r = compress(&(k * G));
    let e = hash_to_scalar(domain, &[&big_r, public, msg]);
    let s = k + e * x;
    join_signature(&big_r, &s.to_bytes())
}

fn schnorr_verify(domain: &[u8], public: &[u8; 32], msg: &[u8; 32], sig: &Signature) -> bool {
    let (r_bytes, s_bytes) = split_signature(sig);
    let (Some(p), Some(big_r), Some(s)) = (
        CompressedRistretto(*public).decompress(),
        CompressedRistretto(r_bytes).decompress(),
        canonical_scalar(s_bytes),
    ) else {
        return false;
    };
    let e = hash_to_scalar(domain, &[&r_bytes, public, msg]);
    s * G == big_r + e * p
}

fn proof_digest(kind: &str, parts: &[&[u8]]) -> Proof {
    let key = blake3::derive_key(PROOF_CONTEXT, kind.as_bytes());
    let mut hasher = blake3::Hasher::new_keyed(&key);
    for part in parts {
        hasher.update(part);
    }
    Proof(hasher.finalize().into())
}

fn input_digest(stmt: &InputStatement) -> Proof {
    proof_digest(
        "input",
        &[&stmt.anchor, &stmt.nil.0, &stmt.asset_cm.0, &stmt.zpka],
    )
}

fn output_digest(kind: &str, stmt: &OutputStatement) -> Proof {
    proof_digest(kind, &[&stmt.asset_cm.0, &stmt.pkr.to_bytes()])
}

/// Σ inputs − Σ outputs over every commitment of the descriptor
fn excess_point(desc: &BalanceDesc) -> Result<RistrettoPoint, OracleError> {
    let mut excess = RistrettoPoint::identity();
    for cm in desc.oin_accs.iter().chain(desc.zin_acms.iter()) {
        excess += decompress(&cm.0, "input commitment")?;
    }
    for cm in desc.oout_accs.iter().chain(desc.zout_acms.iter()) {
        excess -= decompress(&cm.0, "output commitment")?;
    }
    Ok(excess)
}

impl CryptoOracle for ReferenceOracle {
    fn derive_tracing_key(&self, sk: &SecretKey) -> TracingKey {
        TracingKey {
            pk: compress(&(spend_scalar(sk) * G)),
            view: blake3::derive_key("dece-view-key-v1", &sk.0),
        }
    }

    fn derive_public_key(&self, tk: &TracingKey) -> Result<PublicKey, OracleError> {
        let view = ViewScalars::from_tracing_key(tk)?;
        Ok(PublicKey {
            spend: tk.pk,
            view: compress(&(view.b * G)),
            enc: compress(&(view.c * G)),
        })
    }

    fn gen_pkr(&self, pk: &PublicKey) -> Result<PseudoAddress, OracleError> {
        let spend = decompress(&pk.spend, "public spend key")?;
        let view = decompress(&pk.view, "public view key")?;
        let enc = decompress(&pk.enc, "public encryption key")?;

        let r = random_scalar();
        let t = pkr_tweak(&(r * view));
        Ok(PseudoAddress {
            zpk: compress(&(spend + t * G)),
            r: compress(&(r * G)),
            ek: compress(&(r * enc)),
        })
    }

    fn is_my_pkr(&self, tk: &TracingKey, pkr: &PseudoAddress) -> bool {
        let (Ok(view), Ok(r)) = (
            ViewScalars::from_tracing_key(tk),
            decompress(&pkr.r, "pkr randomiser"),
        ) else {
            return false;
        };
        let t = pkr_tweak(&(view.b * r));
        compress(&(view.spend + t * G)) == pkr.zpk && compress(&(view.c * r)) == pkr.ek
    }

    fn is_pkr_valid(&self, pkr: &PseudoAddress) -> bool {
        let identity = compress(&RistrettoPoint::identity());
        pkr.zpk != identity
            && pkr.r != identity
            && [pkr.zpk, pkr.r, pkr.ek]
                .iter()
                .all(|p| CompressedRistretto(*p).decompress().is_some())
    }

    fn derive_nullifier(
        &self,
        tk: &TracingKey,
        root_cm: &Commitment,
        pkr: &PseudoAddress,
    ) -> Result<Nullifier, OracleError> {
        let view = ViewScalars::from_tracing_key(tk)?;
        Ok(Nullifier(compress(&(view.c * nil_base(root_cm, pkr)))))
    }

    fn commit_asset(
        &self,
        asset: &Asset,
        ar: &Blinding,
    ) -> Result<(AssetCommitment, AssetCommitment), OracleError> {
        if !asset.is_valid() {
            return Err(OracleError::AssetOutOfRange);
        }

        let mut cc = RistrettoPoint::identity();
        if let Some(tkn) = &asset.tkn {
            cc += Scalar::from(tkn.value) * hash_to_point(b"dece/token", &[&tkn.currency.0]);
        }
        if let Some(tkt) = &asset.tkt {
            cc += hash_to_point(b"dece/ticket", &[&tkt.category.0, &tkt.value]);
        }
        let cm = cc + blinding_scalar(ar) * G;

        Ok((AssetCommitment(compress(&cm)), AssetCommitment(compress(&cc))))
    }

    fn random_blinding(&self) -> Blinding {
        Blinding(random_scalar().to_bytes())
    }

    fn gen_key(&self, pkr: &PseudoAddress) -> Result<([u8; 32], [u8; 32]), OracleError> {
        let r = decompress(&pkr.r, "pkr randomiser")?;
        let ek = decompress(&pkr.ek, "pkr encryption point")?;

        let e = random_scalar();
        let rpk = compress(&(e * r));
        let shared = compress(&(e * ek));
        Ok((encryption::derive_output_key(&shared, &rpk), rpk))
    }

    fn fetch_key(
        &self,
        tk: &TracingKey,
        pkr: &PseudoAddress,
        rpk: &[u8; 32],
    ) -> Result<[u8; 32], OracleError> {
        let view = ViewScalars::from_tracing_key(tk)?;
        let r = decompress(&pkr.r, "pkr randomiser")?;
        if compress(&(view.c * r)) != pkr.ek {
            return Err(OracleError::NotOwner);
        }

        let shared = compress(&(view.c * decompress(rpk, "rpk")?));
        Ok(encryption::derive_output_key(&shared, rpk))
    }

    fn encrypt_output(
        &self,
        key: &[u8; 32],
        asset: &Asset,
        memo: &Memo,
        ar: &Blinding,
    ) -> Result<EncryptedInfo, OracleError> {
        Ok(encryption::encrypt_info(key, asset, memo, ar)?)
    }

    fn decrypt_output(
        &self,
        key: &[u8; 32],
        einfo: &EncryptedInfo,
    ) -> Result<(Asset, Memo, Blinding), OracleError> {
        Ok(encryption::decrypt_info(key, einfo)?)
    }

    fn sign(
        &self,
        sk: &SecretKey,
        msg: &[u8; 32],
        pkr: &PseudoAddress,
    ) -> Result<Signature, OracleError> {
        let x = self.one_time_secret(sk, pkr)?;
        Ok(schnorr_sign(PKR_SIG, &x, &pkr.zpk, msg))
    }

    fn verify_sig(&self, msg: &[u8; 32], sig: &Signature, pkr: &PseudoAddress) -> bool {
        schnorr_verify(PKR_SIG, &pkr.zpk, msg, sig)
    }

    fn gen_zpka(&self, pkr: &PseudoAddress, alpha: &Blinding) -> Result<[u8; 32], OracleError> {
        let zpk = decompress(&pkr.zpk, "pkr spend point")?;
        Ok(compress(&(zpk + blinding_scalar(alpha) * G)))
    }

    fn sign_zpka(
        &self,
        sk: &SecretKey,
        msg: &[u8; 32],
        alpha: &Blinding,
        pkr: &PseudoAddress,
    ) -> Result<Signature, OracleError> {
        let x = self.one_time_secret(sk, pkr)? + blinding_scalar(alpha);
        let zpka = compress(&(x * G));
        Ok(schnorr_sign(ZPKA_SIG, &x, &zpka, msg))
    }

    fn verify_zpka(&self, msg: &[u8; 32], sig: &Signature, zpka: &[u8; 32]) -> bool {
        schnorr_verify(ZPKA_SIG, zpka, msg, sig)
    }

    fn sign_nil(
        &self,
        tk: &TracingKey,
        msg: &[u8; 32],
        root_cm: &Commitment,
        pkr: &PseudoAddress,
    ) -> Result<Signature, OracleError> {
        let view = ViewScalars::from_tracing_key(tk)?;
        let r = decompress(&pkr.r, "pkr randomiser")?;
        if compress(&(view.c * r)) != pkr.ek {
            return Err(OracleError::NotOwner);
        }

        // DLEQ: log_R(ek) == log_Hp(nil)
        let hp = nil_base(root_cm, pkr);
        let nil = compress(&(view.c * hp));
        let k = random_scalar();
        let e = hash_to_scalar(
            NIL_SIG,
            &[
                &pkr.r,
                &pkr.ek,
                &compress(&hp),
                &nil,
                &compress(&(k * r)),
                &compress(&(k * hp)),
                msg,
            ],
        );
        let s = k + e * view.c;
        Ok(join_signature(&e.to_bytes(), &s.to_bytes()))
    }

    fn verify_nil(
        &self,
        msg: &[u8; 32],
        sig: &Signature,
        nil: &Nullifier,
        root_cm: &Commitment,
        pkr: &PseudoAddress,
    ) -> bool {
        let (e_bytes, s_bytes) = split_signature(sig);
        let (Some(r), Some(ek), Some(n), Some(e), Some(s)) = (
            CompressedRistretto(pkr.r).decompress(),
            CompressedRistretto(pkr.ek).decompress(),
            CompressedRistretto(nil.0).decompress(),
            canonical_scalar(e_bytes),
            canonical_scalar(s_bytes),
        ) else {
            return false;
        };

        let hp = nil_base(root_cm, pkr);
        let a1 = s * r - e * ek;
        let a2 = s * hp - e * n;
        let expected = hash_to_scalar(
            NIL_SIG,
            &[
                &pkr.r,
                &pkr.ek,
                &compress(&hp),
                &nil.0,
                &compress(&a1),
                &compress(&a2),
                msg,
            ],
        );
        expected == e
    }

    fn prove_input(
        &self,
        stmt: &InputStatement,
        witness: &InputWitness,
    ) -> Result<Proof, OracleError> {
        let leaf = CommitmentScheme::root_commitment(
            witness.path.position,
            &witness.asset_cm_old,
            &witness.pkr,
            &witness.rpk,
        );
        if witness.path.family != Family::Shielded {
            return Err(OracleError::InvalidWitness("input", "wrong accumulator"));
        }
        if !witness.path.verify(&leaf, &stmt.anchor) {
            return Err(OracleError::InvalidWitness("input", "path does not reach anchor"));
        }
        if self.commit_asset(&witness.asset, &witness.ar_old)?.0 != witness.asset_cm_old {
            return Err(OracleError::InvalidWitness("input", "spent commitment"));
        }
        if self.commit_asset(&witness.asset, &witness.ar)?.0 != stmt.asset_cm {
            return Err(OracleError::InvalidWitness("input", "re-randomised commitment"));
        }
        if self.gen_zpka(&witness.pkr, &witness.alpha)? != stmt.zpka {
            return Err(OracleError::InvalidWitness("input", "zpka"));
        }
        if self.derive_nullifier(&witness.tk, &leaf, &witness.pkr)? != stmt.nil {
            return Err(OracleError::InvalidWitness("input", "nullifier"));
        }
        Ok(input_digest(stmt))
    }

    fn verify_input(&self, proof: &Proof, stmt: &InputStatement) -> Result<(), OracleError> {
        if input_digest(stmt) != *proof {
            return Err(OracleError::InvalidProof("input"));
        }
        Ok(())
    }

    fn prove_output(
        &self,
        stmt: &OutputStatement,
        witness: &OutputWitness,
    ) -> Result<Proof, OracleError> {
        if !self.is_pkr_valid(&stmt.pkr) {
            return Err(OracleError::InvalidWitness("output", "pkr"));
        }
        if self.commit_asset(&witness.asset, &witness.ar)?.0 != stmt.asset_cm {
            return Err(OracleError::InvalidWitness("output", "commitment"));
        }
        Ok(output_digest("output", stmt))
    }

    fn verify_output(&self, proof: &Proof, stmt: &OutputStatement) -> Result<(), OracleError> {
        if output_digest("output", stmt) != *proof {
            return Err(OracleError::InvalidProof("output"));
        }
        Ok(())
    }

    fn prove_package(
        &self,
        stmt: &OutputStatement,
        witness: &OutputWitness,
    ) -> Result<Proof, OracleError> {
        if self.commit_asset(&witness.asset, &witness.ar)?.0 != stmt.asset_cm {
            return Err(OracleError::InvalidWitness("package", "commitment"));
        }
        Ok(output_digest("package", stmt))
    }

    fn verify_package(&self, proof: &Proof, stmt: &OutputStatement) -> Result<(), OracleError> {
        if output_digest("package", stmt) != *proof {
            return Err(OracleError::InvalidProof("package"));
        }
        Ok(())
    }

    fn sign_balance(&self, desc: &BalanceDesc) -> Result<BalanceProof, OracleError> {
        if desc.zin_ars.len() != desc.zin_acms.len() || desc.zout_ars.len() != desc.zout_acms.len()
        {
            return Err(OracleError::InvalidWitness("balance", "missing blinding"));
        }

        let mut x = Scalar::ZERO;
        for ar in &desc.zin_ars {
            x += blinding_scalar(ar);
        }
        for ar in &desc.zout_ars {
            x -= blinding_scalar(ar);
        }

        let excess = excess_point(desc)?;
        if excess != x * G {
            log::debug!(
                "balance excess is not a blinding commitment ({} in, {} out)",
                desc.zin_acms.len(),
                desc.zout_acms.len()
            );
            return Err(OracleError::Unbalanced);
        }

        let bcr = compress(&excess);
        Ok(BalanceProof {
            bcr,
            bsign: schnorr_sign(BALANCE_SIG, &x, &bcr, &desc.hash),
        })
    }

    fn verify_balance(&self, desc: &BalanceDesc, proof: &BalanceProof) -> Result<(), OracleError> {
        if compress(&excess_point(desc)?) != proof.bcr {
            return Err(OracleError::Unbalanced);
        }
        if !schnorr_verify(BALANCE_SIG, &proof.bcr, &desc.hash, &proof.bsign) {
            return Err(OracleError::InvalidSignature);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Token;
    use crate::merkle::MerkleTree;

    fn owner(seed: u8) -> (SecretKey, TracingKey, PublicKey) {
        let oracle = ReferenceOracle::new();
        let sk = SecretKey([seed; 32]);
        let tk = oracle.derive_tracing_key(&sk);
        let pk = oracle.derive_public_key(&tk).unwrap();
        (sk, tk, pk)
    }

    #[test]
    fn pkr_is_recognised_only_by_owner() {
        let oracle = ReferenceOracle::new();
        let (_, tk, pk) = owner(1);
        let (_, other_tk, _) = owner(2);

        let pkr = oracle.gen_pkr(&pk).unwrap();
        assert!(oracle.is_pkr_valid(&pkr));
        assert!(oracle.is_my_pkr(&tk, &pkr));
        assert!(!oracle.is_my_pkr(&other_tk, &pkr));
    }

    #[test]
    fn pkrs_of_one_owner_are_unlinkable() {
        let oracle = ReferenceOracle::new();
        let (_, _, pk) = owner(1);
        let a = oracle.gen_pkr(&pk).unwrap();
        let b = oracle.gen_pkr(&pk).unwrap();
        assert_ne!(a.zpk, b.zpk);
        assert_ne!(a.ek, b.ek);
    }

    #[test]
    fn zero_pkr_is_not_valid() {
        let oracle = ReferenceOracle::new();
        assert!(!oracle.is_pkr_valid(&PseudoAddress::default()));
    }

    #[test]
    fn signature_roundtrip() {
        let oracle = ReferenceOracle::new();
        let (sk, _, pk) = owner(1);
        let pkr = oracle.gen_pkr(&pk).unwrap();
        let msg = [9u8; 32];

        let sig = oracle.sign(&sk, &msg, &pkr).unwrap();
        assert!(oracle.verify_sig(&msg, &sig, &pkr));
        assert!(!oracle.verify_sig(&[8u8; 32], &sig, &pkr));

        let other = oracle.gen_pkr(&pk).unwrap();
        assert!(!oracle.verify_sig(&msg, &sig, &other));
    }

    #[test]
    fn foreign_key_cannot_sign() {
        let oracle = ReferenceOracle::new();
        let (_, _, pk) = owner(1);
        let (thief, _, _) = owner(2);
        let pkr = oracle.gen_pkr(&pk).unwrap();
        assert_eq!(oracle.sign(&thief, &[0u8; 32], &pkr), Err(OracleError::NotOwner));
    }

    #[test]
    fn zpka_signature_roundtrip() {
        let oracle = ReferenceOracle::new();
        let (sk, _, pk) = owner(3);
        let pkr = oracle.gen_pkr(&pk).unwrap();
        let alpha = oracle.random_blinding();
        let msg = [1u8; 32];

        let zpka = oracle.gen_zpka(&pkr, &alpha).unwrap();
        let sig = oracle.sign_zpka(&sk, &msg, &alpha, &pkr).unwrap();
        assert!(oracle.verify_zpka(&msg, &sig, &zpka));
        assert!(!oracle.verify_zpka(&msg, &sig, &pkr.zpk));
    }

    #[test]
    fn nullifier_is_deterministic_and_provable() {
        let oracle = ReferenceOracle::new();
        let (_, tk, pk) = owner(4);
        let pkr = oracle.gen_pkr(&pk).unwrap();
        let root_cm = Commitment([5u8; 32]);
        let msg = [6u8; 32];

        let n1 = oracle.derive_nullifier(&tk, &root_cm, &pkr).unwrap();
        let n2 = oracle.derive_nullifier(&tk, &root_cm, &pkr).unwrap();
        assert_eq!(n1, n2);

        let other = oracle
            .derive_nullifier(&tk, &Commitment([7u8; 32]), &pkr)
            .unwrap();
        assert_ne!(n1, other);

        let sig = oracle.sign_nil(&tk, &msg, &root_cm, &pkr).unwrap();
        assert!(oracle.verify_nil(&msg, &sig, &n1, &root_cm, &pkr));
        assert!(!oracle.verify_nil(&msg, &sig, &other, &root_cm, &pkr));
    }

    #[test]
    fn output_key_agreement() {
        let oracle = ReferenceOracle::new();
        let (_, tk, pk) = owner(5);
        let (_, other_tk, _) = owner(6);
        let pkr = oracle.gen_pkr(&pk).unwrap();

        let (key, rpk) = oracle.gen_key(&pkr).unwrap();
        assert_eq!(oracle.fetch_key(&tk, &pkr, &rpk).unwrap(), key);
        assert_eq!(
            oracle.fetch_key(&other_tk, &pkr, &rpk),
            Err(OracleError::NotOwner)
        );
    }

    #[test]
    fn package_key_depends_on_creator() {
        let oracle = ReferenceOracle::new();
        let (_, tk, pk) = owner(5);
        let (_, other_tk, _) = owner(6);
        let from = oracle.gen_pkr(&pk).unwrap();

        let key = oracle.gen_pkg_key(&tk, &from);
        assert_eq!(key, oracle.gen_pkg_key(&tk, &from));
        assert_ne!(key, oracle.gen_pkg_key(&other_tk, &from));
    }

    #[test]
    fn balance_proof_accepts_conserved_value() {
        let oracle = ReferenceOracle::new();
        let input = Asset::token(Token::dece(100));
        let output = Asset::token(Token::dece(99));
        let fee = Asset::token(Token::dece(1));

        let ar_in = oracle.random_blinding();
        let ar_out = oracle.random_blinding();
        let (zin, _) = oracle.commit_asset(&input, &ar_in).unwrap();
        let (zout, _) = oracle.commit_asset(&output, &ar_out).unwrap();

        let desc = BalanceDesc {
            hash: [1u8; 32],
            oout_accs: vec![oracle.asset_cc(&fee).unwrap()],
            zin_acms: vec![zin],
            zin_ars: vec![ar_in],
            zout_acms: vec![zout],
            zout_ars: vec![ar_out],
            ..Default::default()
        };
        let proof = oracle.sign_balance(&desc).unwrap();

        let public = BalanceDesc {
            zin_ars: vec![],
            zout_ars: vec![],
            ..desc.clone()
        };
        assert!(oracle.verify_balance(&public, &proof).is_ok());

        let tampered = BalanceDesc {
            hash: [2u8; 32],
            ..public
        };
        assert_eq!(
            oracle.verify_balance(&tampered, &proof),
            Err(OracleError::InvalidSignature)
        );
    }

    #[test]
    fn balance_proof_rejects_inflation() {
        let oracle = ReferenceOracle::new();
        let ar_in = oracle.random_blinding();
        let ar_out = oracle.random_blinding();
        let (zin, _) = oracle
            .commit_asset(&Asset::token(Token::dece(100)), &ar_in)
            .unwrap();
        let (zout, _) = oracle
            .commit_asset(&Asset::token(Token::dece(101)), &ar_out)
            .unwrap();

        let desc = BalanceDesc {
            zin_acms: vec![zin],
            zin_ars: vec![ar_in],
            zout_acms: vec![zout],
            zout_ars: vec![ar_out],
            ..Default::default()
        };
        assert_eq!(oracle.sign_balance(&desc), Err(OracleError::Unbalanced));
    }

    #[test]
    fn input_proof_checks_witness() {
        let oracle = ReferenceOracle::new();
        let (_, tk, pk) = owner(7);
        let pkr = oracle.gen_pkr(&pk).unwrap();
        let asset = Asset::token(Token::dece(50));
        let ar_old = oracle.random_blinding();
        let (asset_cm_old, _) = oracle.commit_asset(&asset, &ar_old).unwrap();
        let rpk = [3u8; 32];

        let mut tree = MerkleTree::new(Family::Shielded);
        let leaf = oracle.gen_root_cm(0, &asset_cm_old, &pkr, &rpk);
        tree.append_leaf(&leaf).unwrap();
        let witness = tree.find_witness(0).unwrap();

        let ar = oracle.random_blinding();
        let alpha = oracle.random_blinding();
        let stmt = InputStatement {
            anchor: witness.anchor,
            nil: oracle.derive_nullifier(&tk, &leaf, &pkr).unwrap(),
            asset_cm: oracle.commit_asset(&asset, &ar).unwrap().0,
            zpka: oracle.gen_zpka(&pkr, &alpha).unwrap(),
        };
        let input_witness = InputWitness {
            tk,
            pkr,
            rpk,
            asset_cm_old,
            ar_old,
            asset,
            ar,
            alpha,
            path: witness.path,
        };

        let proof = oracle.prove_input(&stmt, &input_witness).unwrap();
        assert!(oracle.verify_input(&proof, &stmt).is_ok());

        let forged = InputStatement {
            anchor: [0u8; 32],
            ..stmt
        };
        assert!(oracle.prove_input(&forged, &input_witness).is_err());
        assert_eq!(
            oracle.verify_input(&proof, &forged),
            Err(OracleError::InvalidProof("input"))
        );
    }

    #[test]
    fn output_proof_binds_commitment() {
        let oracle = ReferenceOracle::new();
        let (_, _, pk) = owner(8);
        let pkr = oracle.gen_pkr(&pk).unwrap();
        let asset = Asset::token(Token::dece(10));
        let ar = oracle.random_blinding();
        let stmt = OutputStatement {
            asset_cm: oracle.commit_asset(&asset, &ar).unwrap().0,
            pkr,
        };

        let proof = oracle
            .prove_output(&stmt, &OutputWitness { asset, ar })
            .unwrap();
        assert!(oracle.verify_output(&proof, &stmt).is_ok());
        // package and output proofs are not interchangeable
        assert!(oracle.verify_package(&proof, &stmt).is_err());
    }
}
