//! Nullifiers
//!
//! ```text
//! Nullifier = view_scalar · H_p(root_cm || pkr)
//! ```
//!
//! Only a tracing-key holder can derive it, and distinct outputs of the same
//! owner yield unlinkable values. Once a nullifier is published, the
//! corresponding output cannot be spent again.

use serde::{Deserialize, Serialize};

/// A nullifier (32 bytes) - unique tag for a spent output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Nullifier(pub [u8; 32]);

impl Nullifier {
    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Nullifier {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
