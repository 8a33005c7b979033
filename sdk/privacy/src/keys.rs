//! Key Material
//!
//! ```text
//! SecretKey ──derive──▶ TracingKey ──▶ PublicKey (long-term address)
//!                                         │
//!                                   gen_pkr(r)
//!                                         ▼
//!                                   PseudoAddress (one per output)
//! ```
//!
//! The secret key authorises spends. The tracing key recognises owned
//! outputs, decrypts their payloads and derives nullifiers, but cannot sign.
//! Derivations live behind the `CryptoOracle`; these are plain byte holders.

use serde::{Deserialize, Serialize};

/// Spending secret
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKey(pub [u8; 32]);

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

/// View capability: public spend point plus the view seed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracingKey {
    pub pk: [u8; 32],
    pub view: [u8; 32],
}

/// Long-term public address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey {
    pub spend: [u8; 32],
    pub view: [u8; 32],
    pub enc: [u8; 32],
}

/// Re-randomised one-time address
///
/// `zpk` is the one-time spend point, `r` the public randomiser and `ek`
/// the encryption point a sender uses to reach the owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PseudoAddress {
    pub zpk: [u8; 32],
    pub r: [u8; 32],
    pub ek: [u8; 32],
}

impl PseudoAddress {
    pub const LEN: usize = 96;

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[..32].copy_from_slice(&self.zpk);
        out[32..64].copy_from_slice(&self.r);
        out[64..].copy_from_slice(&self.ek);
        out
    }

    pub fn is_zero(&self) -> bool {
        self.zpk == [0u8; 32] && self.r == [0u8; 32] && self.ek == [0u8; 32]
    }
}
