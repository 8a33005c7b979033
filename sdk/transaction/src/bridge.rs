use serde::{Deserialize, Serialize};

use dece_privacy::{Asset, PseudoAddress};

/// Value credited to the shielded ledger by the account-based engine
/// (contract payouts, bridge deposits). Lands as a plaintext output.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ExternalTransfer {
    pub to: PseudoAddress,
    pub asset: Asset,
    /// Hash of the account-side transaction that produced it
    pub tx_hash: [u8; 32],
}
