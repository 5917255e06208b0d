//! Share secret encryption with XChaCha20-Poly1305
//!
//! Ciphertext format (base64 of):
//! ```text
//! [24 bytes: random nonce][N bytes: ciphertext][16 bytes: Poly1305 tag]
//! ```

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;

use crate::error::{CryptoError, CryptoResult};
use crate::key::EncryptionKey;
use crate::NONCE_SIZE;

/// Symmetric cipher bound to one reconstructed project key.
pub struct Cipher {
    key: EncryptionKey,
}

impl Cipher {
    /// Build a cipher from a base64-encoded 256-bit key.
    pub fn new(key: &str) -> CryptoResult<Self> {
        Ok(Self {
            key: EncryptionKey::from_base64(key)?,
        })
    }

    /// Encrypt a share secret. A fresh nonce is drawn for every call.
    pub fn encrypt(&self, plaintext: &str) -> CryptoResult<String> {
        let cipher = XChaCha20Poly1305::new(self.key.as_bytes().into());

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = XNonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(result))
    }

    /// Decrypt a share secret produced by [`Cipher::encrypt`].
    ///
    /// Every failure (bad base64, truncated input, tag mismatch, non UTF-8
    /// plaintext) collapses to [`CryptoError::DecryptionFailed`].
    pub fn decrypt(&self, ciphertext: &str) -> CryptoResult<String> {
        let encrypted = STANDARD
            .decode(ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)?;

        if encrypted.len() < NONCE_SIZE {
            return Err(CryptoError::DecryptionFailed);
        }

        let (nonce_bytes, sealed) = encrypted.split_at(NONCE_SIZE);
        let nonce = XNonce::from_slice(nonce_bytes);
        let cipher = XChaCha20Poly1305::new(self.key.as_bytes().into());

        let plaintext = cipher
            .decrypt(nonce, sealed)
            .map_err(|_| CryptoError::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)
    }
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher").field("key", &"[REDACTED]").finish()
    }
}

/// Encrypt `plaintext` under a base64 key.
pub fn encrypt(plaintext: &str, key: &str) -> CryptoResult<String> {
    Cipher::new(key)?.encrypt(plaintext)
}

/// Decrypt `ciphertext` under a base64 key.
pub fn decrypt(ciphertext: &str, key: &str) -> CryptoResult<String> {
    Cipher::new(key)?.decrypt(ciphertext)
}
