//! Output Payload Encryption
//!
//! Encrypts the opening of a shielded output (asset, memo, blinding) under a
//! per-output key with ChaCha20-Poly1305.
//!
//! ```text
//! Flow:
//! 1. Sender derives (key, rpk) for the recipient's pseudo-address
//! 2. Plaintext = flags || token || ticket || memo || blinding   (fixed size)
//! 3. Ciphertext = ChaCha20-Poly1305(key, nonce, plaintext)
//! 4. EncryptedInfo = (nonce, ciphertext, tag)
//! ```
//!
//! Key agreement belongs to the oracle; this module only seals and opens.

use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, KeyInit},
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;
use thiserror::Error;

use crate::asset::{Asset, Currency, Ticket, Token};
use crate::commitment::Blinding;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const PLAINTEXT_LEN: usize = 1 + 32 + 16 + 32 + 32 + MEMO_LEN + 32;

pub const MEMO_LEN: usize = 64;
pub const EINFO_LEN: usize = NONCE_LEN + PLAINTEXT_LEN + TAG_LEN;

const HAS_TOKEN: u8 = 0b01;
const HAS_TICKET: u8 = 0b10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncryptionError {
    #[error("payload encryption failed")]
    Seal,
    #[error("payload decryption failed")]
    Open,
    #[error("malformed payload plaintext")]
    Malformed,
}

/// Free-form memo attached to an output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memo(#[serde(with = "BigArray")] pub [u8; MEMO_LEN]);

impl Default for Memo {
    fn default() -> Self {
        Self([0u8; MEMO_LEN])
    }
}

impl Memo {
    pub fn from_text(text: &str) -> Self {
        let mut memo = Self::default();
        let raw = text.as_bytes();
        let len = raw.len().min(MEMO_LEN);
        memo.0[..len].copy_from_slice(&raw[..len]);
        memo
    }
}

/// Sealed output opening (sent on-chain)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedInfo(#[serde(with = "BigArray")] pub [u8; EINFO_LEN]);

/// Seal an output opening under `key`
pub fn encrypt_info(
    key: &[u8; 32],
    asset: &Asset,
    memo: &Memo,
    ar: &Blinding,
) -> Result<EncryptedInfo, EncryptionError> {
    let plaintext = serialize_plaintext(asset, memo, ar);

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let cipher = ChaCha20Poly1305::new_from_slice(key).map_err(|_| EncryptionError::Seal)?;
    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_slice())
        .map_err(|_| EncryptionError::Seal)?;
    if ciphertext.len() != PLAINTEXT_LEN + TAG_LEN {
        return Err(EncryptionError::Seal);
    }

    let mut out = [0u8; EINFO_LEN];
    out[..NONCE_LEN].copy_from_slice(&nonce_bytes);
    out[NONCE_LEN..].copy_from_slice(&ciphertext);
    Ok(EncryptedInfo(out))
}

/// Open a sealed output, returning (asset, memo, blinding)
pub fn decrypt_info(
    key: &[u8; 32],
    einfo: &EncryptedInfo,
) -> Result<(Asset, Memo, Blinding), EncryptionError> {
    let cipher = ChaCha20Poly1305::new_from_slice(key).map_err(|_| EncryptionError::Open)?;
    let nonce = Nonce::from_slice(&einfo.0[..NONCE_LEN]);

    let plaintext = cipher
        .decrypt(nonce, &einfo.0[NONCE_LEN..])
        .map_err(|_| EncryptionError::Open)?;

    deserialize_plaintext(&plaintext).ok_or(EncryptionError::Malformed)
}

/// Derive the symmetric key from an agreed secret
pub fn derive_output_key(shared_secret: &[u8], rpk: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key("dece-output-v1");
    hasher.update(shared_secret);
    hasher.update(rpk);
    *hasher.finalize().as_bytes()
}

fn serialize_plaintext(asset: &Asset, memo: &Memo, ar: &Blinding) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(PLAINTEXT_LEN);

    let mut flags = 0u8;
    if asset.tkn.is_some() {
        flags |= HAS_TOKEN;
    }
    if asset.tkt.is_some() {
        flags |= HAS_TICKET;
    }
    bytes.push(flags);

    let tkn = asset.tkn.unwrap_or(Token::new(Currency([0u8; 32]), 0));
    bytes.extend_from_slice(&tkn.to_bytes());

    let tkt = asset.tkt.unwrap_or(Ticket {
        category: Currency([0u8; 32]),
        value: [0u8; 32],
    });
    bytes.extend_from_slice(&tkt.to_bytes());

    bytes.extend_from_slice(&memo.0);
    bytes.extend_from_slice(&ar.0);
    bytes
}

fn deserialize_plaintext(bytes: &[u8]) -> Option<(Asset, Memo, Blinding)> {
    if bytes.len() != PLAINTEXT_LEN {
        return None;
    }
    let flags = bytes[0];

    let currency: [u8; 32] = bytes[1..33].try_into().ok()?;
    let value = u128::from_le_bytes(bytes[33..49].try_into().ok()?);
    let category: [u8; 32] = bytes[49..81].try_into().ok()?;
    let tkt_value: [u8; 32] = bytes[81..113].try_into().ok()?;
    let memo: [u8; MEMO_LEN] = bytes[113..113 + MEMO_LEN].try_into().ok()?;
    let ar: [u8; 32] = bytes[113 + MEMO_LEN..].try_into().ok()?;

    let tkn = (flags & HAS_TOKEN != 0).then(|| Token::new(Currency(currency), value));
    let tkt = (flags & HAS_TICKET != 0).then_some(Ticket {
        category: Currency(category),
        value: tkt_value,
    });

    Some((Asset::new(tkn, tkt), Memo(memo), Blinding(ar)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_asset() -> Asset {
        Asset::new(
            Some(Token::dece(1000)),
            Some(Ticket {
                category: Currency::from_name("TK"),
                value: [5u8; 32],
            }),
        )
    }

    #[test]
    fn test_encrypt_decrypt_info() {
        let key = derive_output_key(&[1u8; 32], &[2u8; 32]);
        let memo = Memo::from_text("test memo");
        let ar = Blinding([42u8; 32]);

        let sealed = encrypt_info(&key, &sample_asset(), &memo, &ar).unwrap();
        let (asset, opened_memo, opened_ar) = decrypt_info(&key, &sealed).unwrap();

        assert_eq!(asset, sample_asset());
        assert_eq!(opened_memo, memo);
        assert_eq!(opened_ar, ar);
    }

    #[test]
    fn test_wrong_key_fails() {
        let key = derive_output_key(&[1u8; 32], &[2u8; 32]);
        let wrong = derive_output_key(&[3u8; 32], &[2u8; 32]);

        let sealed = encrypt_info(&key, &sample_asset(), &Memo::default(), &Blinding::ZERO).unwrap();
        assert_eq!(decrypt_info(&wrong, &sealed), Err(EncryptionError::Open));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = derive_output_key(&[1u8; 32], &[2u8; 32]);
        let mut sealed =
            encrypt_info(&key, &sample_asset(), &Memo::default(), &Blinding::ZERO).unwrap();
        sealed.0[EINFO_LEN - 1] ^= 0xff;
        assert!(decrypt_info(&key, &sealed).is_err());
    }

    #[test]
    fn test_token_only_asset_survives() {
        let key = [7u8; 32];
        let asset = Asset::token(Token::dece(99));
        let sealed = encrypt_info(&key, &asset, &Memo::default(), &Blinding::ZERO).unwrap();
        let (opened, _, _) = decrypt_info(&key, &sealed).unwrap();
        assert_eq!(opened, asset);
        assert!(opened.tkt.is_none());
    }
}
