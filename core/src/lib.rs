//! Dece Core
//!
//! Shielded ledger state and the transaction tool working on it.
//!
//! ```text
//!   txtool::TxBuilder ──▶ Tx ──▶ txtool::TxVerifier ──▶ ledger::LedgerState
//!                                      │                      │
//!                                      └── ShieldedView ◀─────┤
//!                                                             ▼
//!                                                  storage::KvStore (RocksDB)
//! ```

pub mod ledger;
pub mod storage;
pub mod txtool;

#[cfg(test)]
mod tests;
