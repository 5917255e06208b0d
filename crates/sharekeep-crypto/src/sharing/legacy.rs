//! Legacy XOR split.
//!
//! The stored part is a random pad, the project part is `key XOR pad`. Both
//! are bare 32-byte values, i.e. the pre-versioning part format: read through
//! the SSS strategy the very same parts yield a different key, which is the
//! key a project's shares move to when it migrates. New keys are never
//! registered with this scheme.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use zeroize::Zeroizing;

use super::compat::PartKind;
use super::{decode_key, decode_part, SplitKey};
use crate::error::{CryptoError, CryptoResult};
use crate::KEY_SIZE;

pub fn split(key: &str) -> CryptoResult<SplitKey> {
    let secret = decode_key(key)?;
    if secret.len() != KEY_SIZE {
        return Err(CryptoError::InvalidEncryptionKey(format!(
            "expected {KEY_SIZE} bytes, got {}",
            secret.len()
        )));
    }

    let mut pad = Zeroizing::new(vec![0u8; KEY_SIZE]);
    rand::thread_rng().fill_bytes(&mut pad);
    let project = xor(&secret, &pad);

    Ok(SplitKey {
        stored_part: STANDARD.encode(&*pad),
        project_part: STANDARD.encode(&*project),
    })
}

pub fn reconstruct(stored_part: &str, project_part: &str) -> CryptoResult<String> {
    let stored = decode_legacy_part(stored_part, PartKind::Stored)?;
    let project = decode_legacy_part(project_part, PartKind::Project)?;
    Ok(STANDARD.encode(&*xor(&stored, &project)))
}

fn decode_legacy_part(part: &str, kind: PartKind) -> CryptoResult<Zeroizing<Vec<u8>>> {
    let decoded = decode_part(part, kind.label())?;
    if decoded.len() != KEY_SIZE {
        return Err(CryptoError::InvalidEncryptionPart(format!(
            "{} part: expected {KEY_SIZE} bytes, got {}",
            kind.label(),
            decoded.len()
        )));
    }
    Ok(decoded)
}

fn xor(a: &[u8], b: &[u8]) -> Zeroizing<Vec<u8>> {
    Zeroizing::new(a.iter().zip(b).map(|(x, y)| x ^ y).collect())
}
