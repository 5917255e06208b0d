use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// A key part is not valid base64 or has an unusable length.
    #[error("invalid encryption part: {0}")]
    InvalidEncryptionPart(String),

    /// The secret-sharing scheme rejected the parts (duplicate index, corrupted share).
    #[error("failed to combine key parts: {0}")]
    CombineFailed(String),

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("invalid encryption key: {0}")]
    InvalidEncryptionKey(String),

    #[error("failed to split key after {attempts} attempts")]
    FailedToSplitKey { attempts: usize },
}
