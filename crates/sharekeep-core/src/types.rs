use serde::{Deserialize, Serialize};

use crate::error::{CustodyError, CustodyResult};

/// A tenant project. Migration status is not stored here; it is derived from
/// the project's [`MigrationRecord`] ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub api_key: String,
    pub api_secret: String,
    /// Server-held half of the project master key (base64), set once at key registration
    pub stored_part: Option<String>,
    /// Unix timestamp of creation
    pub created_at: u64,
}

impl Project {
    pub fn new(
        name: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("pro_{}", uuid::Uuid::new_v4()),
            name: name.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            stored_part: None,
            created_at: crate::now_epoch(),
        }
    }
}

/// How a share's secret is protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Entropy {
    /// Stored in plaintext
    None,
    /// Pre-encrypted by the client with a user-derived key
    User,
    /// Encrypted by the server under the reconstructed project key
    Project,
    /// Pre-encrypted by the client with a passkey-derived key
    Passkey,
}

/// Client-side key derivation parameters for [`Entropy::User`] shares.
/// Opaque to the server, only stored and handed back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionParameters {
    pub salt: String,
    pub iterations: u32,
    pub length: u32,
    pub digest: String,
}

impl EncryptionParameters {
    fn is_complete(&self) -> bool {
        !self.salt.is_empty() && !self.digest.is_empty() && self.iterations > 0 && self.length > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasskeyReference {
    pub passkey_id: String,
    pub passkey_env: Option<String>,
}

/// A custodied secret share.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    pub id: String,
    pub project_id: String,
    /// Ciphertext for `Project` entropy, plaintext for `None`, client blob otherwise
    pub secret: String,
    pub user_id: Option<String>,
    pub keychain_id: Option<String>,
    pub entropy: Entropy,
    pub encryption_parameters: Option<EncryptionParameters>,
    pub passkey_reference: Option<PasskeyReference>,
    pub created_at: u64,
}

impl Share {
    pub fn new(project_id: impl Into<String>, secret: impl Into<String>, entropy: Entropy) -> Self {
        Self {
            id: format!("sha_{}", uuid::Uuid::new_v4()),
            project_id: project_id.into(),
            secret: secret.into(),
            user_id: None,
            keychain_id: None,
            entropy,
            encryption_parameters: None,
            passkey_reference: None,
            created_at: crate::now_epoch(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_keychain(mut self, keychain_id: impl Into<String>) -> Self {
        self.keychain_id = Some(keychain_id.into());
        self
    }

    pub fn with_encryption_parameters(mut self, params: EncryptionParameters) -> Self {
        self.encryption_parameters = Some(params);
        self
    }

    pub fn with_passkey_reference(mut self, reference: PasskeyReference) -> Self {
        self.passkey_reference = Some(reference);
        self
    }

    /// Check that entropy and encryption parameters agree.
    pub fn validate(&self) -> CustodyResult<()> {
        match (self.entropy, &self.encryption_parameters) {
            (Entropy::User, Some(params)) if params.is_complete() => {}
            (Entropy::User, _) => return Err(CustodyError::MissingEncryptionParameters),
            (_, Some(_)) => return Err(CustodyError::UnexpectedEncryptionParameters),
            (_, None) => {}
        }

        if self.entropy == Entropy::Passkey && self.passkey_reference.is_none() {
            return Err(CustodyError::MissingPasskeyReference);
        }

        Ok(())
    }
}

impl std::fmt::Debug for Share {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Share")
            .field("id", &self.id)
            .field("project_id", &self.project_id)
            .field("secret", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .field("keychain_id", &self.keychain_id)
            .field("entropy", &self.entropy)
            .field("encryption_parameters", &self.encryption_parameters)
            .field("passkey_reference", &self.passkey_reference)
            .finish()
    }
}

/// One row of a project's append-only migration ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub project_id: String,
    /// Unix timestamp of the attempt
    pub timestamp: u64,
    pub success: bool,
}

impl MigrationRecord {
    pub fn new(project_id: impl Into<String>, success: bool) -> Self {
        Self {
            project_id: project_id.into(),
            timestamp: crate::now_epoch(),
            success,
        }
    }
}
