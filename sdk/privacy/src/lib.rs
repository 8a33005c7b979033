//! Dece Privacy SDK
//!
//! Shielded-asset primitives shared by the ledger core, the transaction
//! builder and the verifier.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Shielded Transaction                         │
//! │  ┌──────────────┐  ┌──────────────┐  ┌───────────────────────┐ │
//! │  │  Nullifiers  │  │ Commitments  │  │   Encrypted Payload   │ │
//! │  │  (spent)     │  │  (new leaves)│  │   (for recipient)     │ │
//! │  └──────────────┘  └──────────────┘  └───────────────────────┘ │
//! │         │                 │                     │               │
//! │         ▼                 ▼                     ▼               │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │                    CryptoOracle                          │   │
//! │  │  • Nullifier derivation and spend signatures             │   │
//! │  │  • Input / output / package proofs                       │   │
//! │  │  • Balance proof: Σ inputs = Σ outputs + fee             │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod asset;
pub mod commitment;
pub mod encryption;
pub mod keys;
pub mod merkle;
pub mod nullifier;
pub mod oracle;
mod poseidon;
pub mod reference;

pub use asset::{Asset, AssetError, CkState, Currency, MAX_TOKEN_VALUE, Ticket, Token};
pub use commitment::{AssetCommitment, Blinding, Commitment, CommitmentScheme};
pub use encryption::{EncryptedInfo, EncryptionError, MEMO_LEN, Memo};
pub use keys::{PseudoAddress, PublicKey, SecretKey, TracingKey};
pub use merkle::{
    Family, MerkleError, MerkleHasher, MerklePath, MerkleTree, TREE_CAPACITY, TREE_DEPTH,
    Witness,
};
pub use nullifier::Nullifier;
pub use oracle::{
    BalanceDesc, BalanceProof, CryptoOracle, InputStatement, InputWitness, OracleError,
    OutputStatement, OutputWitness, Proof, Signature,
};
pub use reference::ReferenceOracle;
