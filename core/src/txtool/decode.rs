//! Output Decoding
//!
//! Opens ledger outputs with a tracing key: the asset and memo they carry,
//! and the nullifier that will mark them spent. Plain outputs are read
//! directly; shielded ones are decrypted and checked against their asset
//! commitment first.

use log::debug;

use dece_privacy::{Asset, Blinding, CryptoOracle, Memo, Nullifier, OracleError, TracingKey};
use dece_transaction::OutC;

use crate::ledger::{OutputPayload, OutputRecord};

/// Contents of a shielded output, confirmed against its commitment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedOut {
    pub asset: Asset,
    pub memo: Memo,
    pub ar: Blinding,
}

/// An output as seen by its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedOut {
    pub asset: Asset,
    pub memo: Memo,
    pub nil: Nullifier,
    /// Payload key, shielded outputs only
    pub key: Option<[u8; 32]>,
}

/// Decrypt `out` with its payload key and check the result reproduces
/// the published asset commitment.
pub fn confirm_out_c(
    oracle: &dyn CryptoOracle,
    key: &[u8; 32],
    out: &OutC,
) -> Result<OpenedOut, OracleError> {
    let (asset, memo, ar) = oracle.decrypt_output(key, &out.einfo)?;
    let (cm, _) = oracle.commit_asset(&asset, &ar)?;
    if cm != out.asset_cm {
        return Err(OracleError::CommitmentMismatch);
    }
    Ok(OpenedOut { asset, memo, ar })
}

/// Decode one output. Fails with `NotOwner` unless `tk` owns its address.
pub fn dec_out(
    oracle: &dyn CryptoOracle,
    tk: &TracingKey,
    record: &OutputRecord,
) -> Result<DecodedOut, OracleError> {
    let pkr = record.payload.pkr();
    if !oracle.is_my_pkr(tk, pkr) {
        return Err(OracleError::NotOwner);
    }
    let (asset, memo, key) = match &record.payload {
        OutputPayload::Plain(out) => (out.asset, out.memo, None),
        OutputPayload::Shielded(out) => {
            let key = oracle.fetch_key(tk, &out.pkr, &out.rpk)?;
            let opened = confirm_out_c(oracle, &key, out)?;
            (opened.asset, opened.memo, Some(key))
        }
    };
    let nil = oracle.derive_nullifier(tk, &record.root_cm, pkr)?;
    Ok(DecodedOut {
        asset,
        memo,
        nil,
        key,
    })
}

/// Decode a batch, keeping positions. Outputs that do not open under
/// `tk` come back as `None`.
pub fn dec_outs(
    oracle: &dyn CryptoOracle,
    tk: &TracingKey,
    records: &[OutputRecord],
) -> Vec<Option<DecodedOut>> {
    records
        .iter()
        .map(|record| match dec_out(oracle, tk, record) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                debug!("decode: leaf {} skipped: {}", record.index, e);
                None
            }
        })
        .collect()
}
