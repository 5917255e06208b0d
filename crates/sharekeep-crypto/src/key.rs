//! Project master keys: generation and base64 decoding

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{CryptoError, CryptoResult};
use crate::KEY_SIZE;

/// A decoded 256-bit symmetric key. Zeroized on drop.
#[derive(Clone)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Decode a base64 key. Anything but exactly [`KEY_SIZE`] raw bytes is rejected.
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let decoded = Zeroizing::new(
            STANDARD
                .decode(encoded)
                .map_err(|e| CryptoError::InvalidEncryptionKey(format!("base64: {e}")))?,
        );

        if decoded.len() != KEY_SIZE {
            return Err(CryptoError::InvalidEncryptionKey(format!(
                "expected {KEY_SIZE} bytes, got {}",
                decoded.len()
            )));
        }

        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(&decoded);
        Ok(Self { bytes })
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.bytes)
    }
}

impl Drop for EncryptionKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a random 256-bit key, base64-encoded.
pub fn generate_key() -> String {
    let mut bytes = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    let key = EncryptionKey::from_bytes(bytes);
    bytes.zeroize();
    key.to_base64()
}
