//! Crypto Oracle
//!
//! The narrow capability interface the ledger core depends on. Every value
//! crossing it is a fixed-size byte type; no curve or field representation
//! leaks into the store, the journal or the transaction format.
//!
//! ```text
//!   builder ──┐                         ┌── keys / pkr / nullifiers
//!             ├──▶ dyn CryptoOracle ────┼── commitments / encryption
//!   verifier ─┘                         ├── signatures
//!                                       └── proofs / balance proof
//! ```

use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;
use thiserror::Error;

use crate::asset::Asset;
use crate::commitment::{AssetCommitment, Blinding, Commitment, CommitmentScheme};
use crate::encryption::{EncryptedInfo, EncryptionError, Memo};
use crate::keys::{PublicKey, PseudoAddress, SecretKey, TracingKey};
use crate::merkle::MerklePath;
use crate::nullifier::Nullifier;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OracleError {
    #[error("invalid curve point: {0}")]
    InvalidPoint(&'static str),
    #[error("asset value exceeds the protocol maximum")]
    AssetOutOfRange,
    #[error("key does not own the pseudo-address")]
    NotOwner,
    #[error(transparent)]
    Encryption(#[from] EncryptionError),
    #[error("commitment does not open to the claimed asset")]
    CommitmentMismatch,
    #[error("balance does not hold")]
    Unbalanced,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid {0} witness: {1}")]
    InvalidWitness(&'static str, &'static str),
    #[error("invalid {0} proof")]
    InvalidProof(&'static str),
}

/// 64-byte signature (Schnorr or DLEQ transcript)
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
pub struct Signature(#[serde(with = "BigArray")] pub [u8; 64]);

impl Default for Signature {
    fn default() -> Self {
        Self([0u8; 64])
    }
}

impl Signature {
    pub const LEN: usize = 64;

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

/// Opaque proof bytes
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
pub struct Proof(pub [u8; 32]);

/// Public inputs of a shielded input spend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputStatement {
    pub anchor: [u8; 32],
    pub nil: Nullifier,
    /// Re-randomised commitment of the spent asset
    pub asset_cm: AssetCommitment,
    /// Re-randomised spend key
    pub zpka: [u8; 32],
}

/// Private side of a shielded input spend
#[derive(Debug, Clone)]
pub struct InputWitness {
    pub tk: TracingKey,
    pub pkr: PseudoAddress,
    pub rpk: [u8; 32],
    pub asset_cm_old: AssetCommitment,
    pub ar_old: Blinding,
    pub asset: Asset,
    pub ar: Blinding,
    pub alpha: Blinding,
    pub path: MerklePath,
}

/// Public inputs of a shielded output or a package create
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputStatement {
    pub asset_cm: AssetCommitment,
    pub pkr: PseudoAddress,
}

/// Opening of an output commitment
#[derive(Debug, Clone, Copy)]
pub struct OutputWitness {
    pub asset: Asset,
    pub ar: Blinding,
}

/// All commitments of one transaction, fed to the balance proof
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceDesc {
    /// Signing hash of the transaction
    pub hash: [u8; 32],
    /// Unblinded commitments of plaintext inputs
    pub oin_accs: Vec<AssetCommitment>,
    /// Unblinded commitments of fee, command asset and plaintext outputs
    pub oout_accs: Vec<AssetCommitment>,
    pub zin_acms: Vec<AssetCommitment>,
    /// Blinding of each `zin_acms` entry (builder side only)
    pub zin_ars: Vec<Blinding>,
    pub zout_acms: Vec<AssetCommitment>,
    /// Blinding of each `zout_acms` entry (builder side only)
    pub zout_ars: Vec<Blinding>,
}

impl BalanceDesc {
    /// Whether any blinded commitment takes part
    pub fn has_shielded(&self) -> bool {
        !self.zin_acms.is_empty() || !self.zout_acms.is_empty()
    }
}

/// Aggregate balance proof: excess commitment plus a signature under it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceProof {
    pub bcr: [u8; 32],
    pub bsign: Signature,
}

/// Cryptographic capabilities consumed by the ledger core
pub trait CryptoOracle: Send + Sync {
    // ---- keys -------------------------------------------------------------

    fn derive_tracing_key(&self, sk: &SecretKey) -> TracingKey;

    fn derive_public_key(&self, tk: &TracingKey) -> Result<PublicKey, OracleError>;

    /// Fresh unlinkable pseudo-address for `pk`
    fn gen_pkr(&self, pk: &PublicKey) -> Result<PseudoAddress, OracleError>;

    fn is_my_pkr(&self, tk: &TracingKey, pkr: &PseudoAddress) -> bool;

    fn is_pkr_valid(&self, pkr: &PseudoAddress) -> bool;

    // ---- commitments ------------------------------------------------------

    fn derive_nullifier(
        &self,
        tk: &TracingKey,
        root_cm: &Commitment,
        pkr: &PseudoAddress,
    ) -> Result<Nullifier, OracleError>;

    /// Returns the blinded commitment and the unblinded (`cc`) form
    fn commit_asset(
        &self,
        asset: &Asset,
        ar: &Blinding,
    ) -> Result<(AssetCommitment, AssetCommitment), OracleError>;

    fn asset_cc(&self, asset: &Asset) -> Result<AssetCommitment, OracleError> {
        self.commit_asset(asset, &Blinding::ZERO).map(|(_, cc)| cc)
    }

    fn random_blinding(&self) -> Blinding;

    fn gen_root_cm(
        &self,
        index: u64,
        asset_cm: &AssetCommitment,
        pkr: &PseudoAddress,
        randomness: &[u8; 32],
    ) -> Commitment {
        CommitmentScheme::root_commitment(index, asset_cm, pkr, randomness)
    }

    // ---- payload encryption ----------------------------------------------

    /// Per-output key plus the public value the owner recovers it from
    fn gen_key(&self, pkr: &PseudoAddress) -> Result<([u8; 32], [u8; 32]), OracleError>;

    fn fetch_key(
        &self,
        tk: &TracingKey,
        pkr: &PseudoAddress,
        rpk: &[u8; 32],
    ) -> Result<[u8; 32], OracleError>;

    fn encrypt_output(
        &self,
        key: &[u8; 32],
        asset: &Asset,
        memo: &Memo,
        ar: &Blinding,
    ) -> Result<EncryptedInfo, OracleError>;

    fn decrypt_output(
        &self,
        key: &[u8; 32],
        einfo: &EncryptedInfo,
    ) -> Result<(Asset, Memo, Blinding), OracleError>;

    /// Package payload key of a creator. It is handed to whoever closes
    /// the package.
    fn gen_pkg_key(&self, tk: &TracingKey, from: &PseudoAddress) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new_derive_key("dece-pkg-key-v1");
        hasher.update(&tk.view);
        hasher.update(&from.to_bytes());
        hasher.finalize().into()
    }

    // ---- signatures -------------------------------------------------------

    fn sign(
        &self,
        sk: &SecretKey,
        msg: &[u8; 32],
        pkr: &PseudoAddress,
    ) -> Result<Signature, OracleError>;

    fn verify_sig(&self, msg: &[u8; 32], sig: &Signature, pkr: &PseudoAddress) -> bool;

    fn gen_zpka(&self, pkr: &PseudoAddress, alpha: &Blinding) -> Result<[u8; 32], OracleError>;

    fn sign_zpka(
        &self,
        sk: &SecretKey,
        msg: &[u8; 32],
        alpha: &Blinding,
        pkr: &PseudoAddress,
    ) -> Result<Signature, OracleError>;

    fn verify_zpka(&self, msg: &[u8; 32], sig: &Signature, zpka: &[u8; 32]) -> bool;

    /// Proves `nil` was derived for (`root_cm`, `pkr`) by its tracing key
    fn sign_nil(
        &self,
        tk: &TracingKey,
        msg: &[u8; 32],
        root_cm: &Commitment,
        pkr: &PseudoAddress,
    ) -> Result<Signature, OracleError>;

    fn verify_nil(
        &self,
        msg: &[u8; 32],
        sig: &Signature,
        nil: &Nullifier,
        root_cm: &Commitment,
        pkr: &PseudoAddress,
    ) -> bool;

    // ---- proofs -----------------------------------------------------------

    fn prove_input(
        &self,
        stmt: &InputStatement,
        witness: &InputWitness,
    ) -> Result<Proof, OracleError>;

    fn verify_input(&self, proof: &Proof, stmt: &InputStatement) -> Result<(), OracleError>;

    fn prove_output(
        &self,
        stmt: &OutputStatement,
        witness: &OutputWitness,
    ) -> Result<Proof, OracleError>;

    fn verify_output(&self, proof: &Proof, stmt: &OutputStatement) -> Result<(), OracleError>;

    fn prove_package(
        &self,
        stmt: &OutputStatement,
        witness: &OutputWitness,
    ) -> Result<Proof, OracleError>;

    fn verify_package(&self, proof: &Proof, stmt: &OutputStatement) -> Result<(), OracleError>;

    // ---- balance ----------------------------------------------------------

    fn sign_balance(&self, desc: &BalanceDesc) -> Result<BalanceProof, OracleError>;

    fn verify_balance(&self, desc: &BalanceDesc, proof: &BalanceProof) -> Result<(), OracleError>;
}
