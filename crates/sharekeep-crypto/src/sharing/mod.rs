//! 2-of-2 key splitting: the project master key is held as a stored part
//! (server side) and a project part (tenant side); both are needed to
//! rebuild it.
//!
//! Two schemes exist. [`ReconstructionStrategy::Sss`] is Shamir over GF(256)
//! with versioned, index-tagged parts and is used for every key split today.
//! [`ReconstructionStrategy::Legacy`] is the XOR split older projects were
//! registered with; it is only read until the project is migrated.

pub mod compat;
pub mod legacy;
pub mod sss;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};

/// Maximum number of split attempts before giving up on self-verification.
pub const SPLIT_RETRIES: usize = 5;

/// The two halves of a split key, base64-encoded.
#[derive(Clone, PartialEq, Eq)]
pub struct SplitKey {
    pub stored_part: String,
    pub project_part: String,
}

impl std::fmt::Debug for SplitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SplitKey")
            .field("stored_part", &"[REDACTED]")
            .field("project_part", &"[REDACTED]")
            .finish()
    }
}

/// Secret-sharing scheme used to rebuild a project's key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconstructionStrategy {
    /// XOR split, pre-migration projects only
    Legacy,
    /// Shamir 2-of-2 with tagged shares
    Sss,
}

impl ReconstructionStrategy {
    /// Split a base64 key into `(stored, project)` parts.
    pub fn split(&self, key: &str) -> CryptoResult<SplitKey> {
        match self {
            Self::Legacy => legacy::split(key),
            Self::Sss => sss::split(key),
        }
    }

    /// Rebuild the base64 key from its stored and project parts.
    pub fn reconstruct(&self, stored_part: &str, project_part: &str) -> CryptoResult<String> {
        match self {
            Self::Legacy => legacy::reconstruct(stored_part, project_part),
            Self::Sss => sss::reconstruct(stored_part, project_part),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Sss => "sss",
        }
    }
}

/// Decode one base64 key part; `label` names the part in the error.
pub(crate) fn decode_part(part: &str, label: &str) -> CryptoResult<Zeroizing<Vec<u8>>> {
    STANDARD
        .decode(part)
        .map(Zeroizing::new)
        .map_err(|e| CryptoError::InvalidEncryptionPart(format!("{label} part: {e}")))
}

/// Decode the key to be split.
pub(crate) fn decode_key(key: &str) -> CryptoResult<Zeroizing<Vec<u8>>> {
    let decoded = STANDARD
        .decode(key)
        .map(Zeroizing::new)
        .map_err(|e| CryptoError::InvalidEncryptionKey(format!("base64: {e}")))?;
    if decoded.is_empty() {
        return Err(CryptoError::InvalidEncryptionKey("empty key".into()));
    }
    Ok(decoded)
}
