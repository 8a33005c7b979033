//! Transaction Tool
//!
//! Builds shielded transactions from spend requests and verifies received
//! ones, in two passes:
//!
//! ```text
//!   TxParam ──▶ TxBuilder ──▶ Tx ──▶ TxVerifier::verify_without_state
//!                                          │ (signatures, shape, proofs)
//!                                          ▼
//!                                  TxVerifier::verify_with_state
//!                                          │ (spent set, anchors, balance)
//!                                          ▼
//!                                  LedgerState::add_tx
//! ```

pub mod builder;
pub mod decode;
pub mod params;
pub mod proof_pool;
pub mod verifier;

use thiserror::Error;

pub use builder::{SignedTx, TxBuilder};
pub use decode::{DecodedOut, OpenedOut, confirm_out_c, dec_out, dec_outs};
pub use params::{Cmds, PkgCloseCmd, PkgCreateCmd, PkgTransferCmd, SpendIn, SpendOut, TxParam};
pub use proof_pool::{ProofBatch, ProofError, ProofPool};
pub use verifier::TxVerifier;

/// Failure of one build stage
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("check: {0}")]
    Check(String),
    #[error("prepare: {0}")]
    Prepare(String),
    #[error("fee: {0}")]
    Fee(String),
    #[error("command: {0}")]
    Command(String),
    #[error("in_p: {0}")]
    InputP(String),
    #[error("in_c: {0}")]
    InputC(String),
    #[error("out_c: {0}")]
    OutputC(String),
    #[error("out_p: {0}")]
    OutputP(String),
    #[error("sign: {0}")]
    Sign(String),
    #[error("balance: {0}")]
    Balance(String),
    #[error("proof: {0}")]
    Proof(String),
}

/// Permanent rejection of a transaction
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("tx {} rejected: {reason}", hex::encode(.tx_hash))]
pub struct VerifyError {
    pub reason: String,
    pub tx_hash: [u8; 32],
}
