//! Asset Descriptors
//!
//! An asset is an optional fungible token plus an optional non-fungible ticket.
//!
//! ```text
//! Asset
//!  ├── tkn: Token  { currency, value }     (summed per currency)
//!  └── tkt: Ticket { category, value }     (unique, moved as a whole)
//! ```
//!
//! `CkState` is the plaintext conservation accumulator used by the builder and
//! the verifier when no blinded commitment takes part in a transaction.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Largest token value any output may carry
pub const MAX_TOKEN_VALUE: u128 = (1u128 << 112) - 1;

/// Native currency of the shielded ledger
pub const DECE: &str = "DECE";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssetError {
    #[error("token {0} is not balanced")]
    UnbalancedToken(String),
    #[error("ticket {0} is not balanced")]
    UnbalancedTicket(String),
}

/// 32-byte currency tag, the name right-padded with zeros
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Currency(pub [u8; 32]);

impl Currency {
    pub fn from_name(name: &str) -> Self {
        let mut bytes = [0u8; 32];
        let raw = name.as_bytes();
        let len = raw.len().min(32);
        bytes[..len].copy_from_slice(&raw[..len]);
        Self(bytes)
    }

    pub fn dece() -> Self {
        Self::from_name(DECE)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Display name with the padding stripped
    pub fn name(&self) -> String {
        let end = self.0.iter().position(|b| *b == 0).unwrap_or(32);
        String::from_utf8_lossy(&self.0[..end]).into_owned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    pub currency: Currency,
    pub value: u128,
}

impl Token {
    pub fn new(currency: Currency, value: u128) -> Self {
        Self { currency, value }
    }

    pub fn dece(value: u128) -> Self {
        Self::new(Currency::dece(), value)
    }

    pub fn is_valid(&self) -> bool {
        self.value <= MAX_TOKEN_VALUE
    }

    pub fn to_bytes(&self) -> [u8; 48] {
        let mut out = [0u8; 48];
        out[..32].copy_from_slice(&self.currency.0);
        out[32..].copy_from_slice(&self.value.to_le_bytes());
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ticket {
    pub category: Currency,
    pub value: [u8; 32],
}

impl Ticket {
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&self.category.0);
        out[32..].copy_from_slice(&self.value);
        out
    }
}

/// A token, a ticket, both or neither
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Asset {
    pub tkn: Option<Token>,
    pub tkt: Option<Ticket>,
}

impl Asset {
    /// Builds a normalised asset: zero tokens and empty tickets are dropped
    pub fn new(tkn: Option<Token>, tkt: Option<Ticket>) -> Self {
        Self {
            tkn: tkn.filter(|t| t.value > 0 && !t.currency.is_zero()),
            tkt: tkt.filter(|t| t.value != [0u8; 32] && !t.category.is_zero()),
        }
    }

    pub fn token(token: Token) -> Self {
        Self::new(Some(token), None)
    }

    pub fn ticket(ticket: Ticket) -> Self {
        Self::new(None, Some(ticket))
    }

    pub fn has_asset(&self) -> bool {
        self.tkn.is_some_and(|t| t.value > 0) || self.tkt.is_some_and(|t| t.value != [0u8; 32])
    }

    pub fn is_valid(&self) -> bool {
        self.tkn.is_none_or(|t| t.is_valid())
    }

    pub fn hash(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        if let Some(tkn) = &self.tkn {
            hasher.update(&tkn.to_bytes());
        }
        if let Some(tkt) = &self.tkt {
            hasher.update(&tkt.to_bytes());
        }
        hasher.finalize().into()
    }
}

/// Running conservation check over cleartext assets.
///
/// The fee is booked on the output side at construction; `check` passes only
/// when every currency sums to zero and every ticket moved in was moved out.
#[derive(Debug, Clone, Default)]
pub struct CkState {
    tokens: HashMap<Currency, i128>,
    tickets: HashMap<Ticket, i64>,
}

impl CkState {
    pub fn new(fee: &Token) -> Self {
        let mut ck = Self::default();
        ck.add_out(&Asset::token(*fee));
        ck
    }

    pub fn add_in(&mut self, asset: &Asset) {
        self.book(asset, 1);
    }

    pub fn add_out(&mut self, asset: &Asset) {
        self.book(asset, -1);
    }

    fn book(&mut self, asset: &Asset, sign: i8) {
        if let Some(tkn) = asset.tkn.filter(|t| t.value > 0) {
            // values are capped at 2^112 so the signed sum cannot overflow
            let delta = tkn.value as i128 * sign as i128;
            *self.tokens.entry(tkn.currency).or_default() += delta;
        }
        if let Some(tkt) = asset.tkt.filter(|t| t.value != [0u8; 32]) {
            *self.tickets.entry(tkt).or_default() += sign as i64;
        }
    }

    pub fn check(&self) -> Result<(), AssetError> {
        if let Some((currency, _)) = self.tokens.iter().find(|(_, v)| **v != 0) {
            return Err(AssetError::UnbalancedToken(currency.name()));
        }
        if let Some((ticket, _)) = self.tickets.iter().find(|(_, v)| **v != 0) {
            return Err(AssetError::UnbalancedTicket(ticket.category.name()));
        }
        Ok(())
    }

    /// Tokens still owed by inputs and tickets that were spent but not moved
    pub fn unbalanced(&self) -> (Vec<Token>, Vec<Ticket>) {
        let tokens = self
            .tokens
            .iter()
            .filter(|(_, v)| **v < 0)
            .map(|(c, v)| Token::new(*c, v.unsigned_abs()))
            .collect();
        let tickets = self
            .tickets
            .iter()
            .filter(|(_, v)| **v > 0)
            .map(|(t, _)| *t)
            .collect();
        (tokens, tickets)
    }
}
