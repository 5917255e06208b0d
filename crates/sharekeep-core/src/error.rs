use sharekeep_crypto::CryptoError;
use thiserror::Error;

pub type CustodyResult<T> = Result<T, CustodyError>;

#[derive(Debug, Error)]
pub enum CustodyError {
    // ── Input validation ────────────────────────────────────────────────────
    #[error("project part is required")]
    ProjectPartRequired,

    #[error("database part is required")]
    DatabasePartRequired,

    #[error("user entropy requires salt, iterations, length and digest")]
    MissingEncryptionParameters,

    #[error("encryption parameters are only accepted for user entropy")]
    UnexpectedEncryptionParameters,

    #[error("passkey entropy requires a passkey reference")]
    MissingPasskeyReference,

    // ── Cryptography ────────────────────────────────────────────────────────
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    // ── State ───────────────────────────────────────────────────────────────
    #[error("invalid or expired encryption session")]
    InvalidEncryptionSession,

    #[error("key part not found")]
    KeyPartNotFound,

    #[error("key part already exists")]
    KeyPartAlreadyExists,

    #[error("encryption part not found")]
    EncryptionPartNotFound,

    #[error("encryption part already exists")]
    EncryptionPartAlreadyExists,

    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("share not found")]
    ShareNotFound,

    #[error("share already exists: {0}")]
    ShareAlreadyExists(String),

    /// Shares were re-encrypted and persisted, but the success record could not be appended.
    #[error("migration of project {project_id} persisted but was not recorded: {source}")]
    MigrationNotRecorded {
        project_id: String,
        #[source]
        source: Box<CustodyError>,
    },

    // ── Infrastructure ──────────────────────────────────────────────────────
    #[error("repository error: {0}")]
    Repository(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl CustodyError {
    /// Whether an external caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Repository(_) | Self::Cancelled => true,
            Self::MigrationNotRecorded { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crypto_errors_convert() {
        let err: CustodyError = CryptoError::DecryptionFailed.into();
        assert!(matches!(err, CustodyError::Crypto(CryptoError::DecryptionFailed)));
        assert_eq!(err.to_string(), "decryption failed");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(CustodyError::Repository("timeout".into()).is_retryable());
        assert!(CustodyError::Cancelled.is_retryable());
        assert!(!CustodyError::InvalidEncryptionSession.is_retryable());
        assert!(!CustodyError::Crypto(CryptoError::DecryptionFailed).is_retryable());

        let not_recorded = CustodyError::MigrationNotRecorded {
            project_id: "proj_1".into(),
            source: Box::new(CustodyError::Repository("ledger down".into())),
        };
        assert!(not_recorded.is_retryable());
        assert!(not_recorded.to_string().contains("proj_1"));
    }
}
