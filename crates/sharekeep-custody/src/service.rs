//! Application use cases over the custody components.

use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use zeroize::Zeroizing;

use sharekeep_core::config::SharekeepConfig;
use sharekeep_core::{
    CustodyError, CustodyResult, Entropy, ProjectRepository, Share, ShareRepository,
};
use sharekeep_crypto::{generate_key, ReconstructionStrategy};

use crate::builder::BuilderKind;
use crate::factory::KeyCustodyFactory;
use crate::keypart::{KeyPartStore, MemoryKeyPartStore};
use crate::memory::{MemoryProjectRepository, MemoryShareRepository};
use crate::migration::{ExclusiveRunner, LocalExclusive, MigrationJob, MigrationOutcome};

/// Where a request's project part comes from.
#[derive(Clone)]
pub enum KeySource {
    /// The project part itself
    Plain(String),
    /// A session id from [`CustodyService::register_encryption_session`]
    Session(String),
}

impl KeySource {
    fn kind(&self) -> BuilderKind {
        match self {
            Self::Plain(_) => BuilderKind::Plain,
            Self::Session(_) => BuilderKind::Session,
        }
    }

    fn value(&self) -> &str {
        match self {
            Self::Plain(part) => part,
            Self::Session(id) => id,
        }
    }
}

impl std::fmt::Debug for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("Plain([REDACTED])"),
            Self::Session(id) => f.debug_tuple("Session").field(id).finish(),
        }
    }
}

pub struct CustodyService {
    projects: Arc<dyn ProjectRepository>,
    shares: Arc<dyn ShareRepository>,
    key_parts: Arc<dyn KeyPartStore>,
    factory: KeyCustodyFactory,
    job: MigrationJob,
    otp_required: bool,
}

impl CustodyService {
    pub fn new(
        projects: Arc<dyn ProjectRepository>,
        shares: Arc<dyn ShareRepository>,
        key_parts: Arc<dyn KeyPartStore>,
        runner: Arc<dyn ExclusiveRunner>,
        otp_required: bool,
    ) -> Self {
        let factory = KeyCustodyFactory::new(projects.clone(), key_parts.clone());
        let job = MigrationJob::new(projects.clone(), shares.clone(), factory.clone(), runner);
        Self {
            projects,
            shares,
            key_parts,
            factory,
            job,
            otp_required,
        }
    }

    /// Service over in-memory repositories and a process-local migration lock.
    pub fn in_memory(config: &SharekeepConfig) -> Self {
        Self::new(
            Arc::new(MemoryProjectRepository::new()),
            Arc::new(MemoryShareRepository::new()),
            Arc::new(MemoryKeyPartStore::new(&config.key_parts)),
            Arc::new(LocalExclusive::new()),
            config.session.otp_required,
        )
    }

    pub fn projects(&self) -> &Arc<dyn ProjectRepository> {
        &self.projects
    }

    pub fn shares(&self) -> &Arc<dyn ShareRepository> {
        &self.shares
    }

    /// Generate a project key, keep the stored part and hand back the
    /// project part. The key is never persisted whole.
    pub async fn register_encryption_key(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
    ) -> CustodyResult<String> {
        self.projects.get(cancel, project_id).await?;
        match self.projects.get_encryption_part(cancel, project_id).await {
            Ok(_) => return Err(CustodyError::EncryptionPartAlreadyExists),
            Err(CustodyError::EncryptionPartNotFound) => {}
            Err(e) => return Err(e),
        }

        // The ledger row must land before the stored part; otherwise a failed
        // append leaves an SSS part that resolves as legacy.
        if !self.projects.has_successful_migration(cancel, project_id).await? {
            self.projects.create_migration(cancel, project_id, true).await?;
        }

        let key = Zeroizing::new(generate_key());
        let parts = ReconstructionStrategy::Sss.split(&key)?;
        self.projects
            .set_encryption_part(cancel, project_id, &parts.stored_part)
            .await?;

        info!(project_id, "encryption key registered");
        Ok(parts.project_part)
    }

    /// Park a project part and return the single-use session id redeeming it.
    pub async fn register_encryption_session(&self, project_part: &str) -> CustodyResult<String> {
        if project_part.is_empty() {
            return Err(CustodyError::ProjectPartRequired);
        }
        let session_id = uuid::Uuid::new_v4().to_string();
        self.key_parts.set(&session_id, project_part).await?;
        debug!(%session_id, "encryption session registered");
        Ok(session_id)
    }

    /// Move a legacy project's shares to its SSS key.
    pub async fn encrypt_project_shares(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        project_part: &str,
    ) -> CustodyResult<MigrationOutcome> {
        if project_part.is_empty() {
            return Err(CustodyError::ProjectPartRequired);
        }
        // SSS-registered parts are not readable by the legacy scheme
        if self.factory.resolve_project_migrated(cancel, project_id).await? {
            return Ok(MigrationOutcome::AlreadyMigrated);
        }

        let stored_part = self.projects.get_encryption_part(cancel, project_id).await?;
        let old_key = Zeroizing::new(
            self.factory
                .create_reconstruction_strategy(false)
                .reconstruct(&stored_part, project_part)?,
        );
        self.job
            .execute(cancel, project_id, &old_key, &stored_part, project_part)
            .await
    }

    /// Store a share, encrypting `Project`-entropy secrets under the project key.
    pub async fn create_share(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        mut share: Share,
        key_source: Option<&KeySource>,
    ) -> CustodyResult<Share> {
        share.validate()?;
        self.projects.get(cancel, project_id).await?;
        share.project_id = project_id.to_string();

        if share.entropy == Entropy::Project {
            let source = key_source.ok_or(CustodyError::ProjectPartRequired)?;
            let key = self.build_key(cancel, project_id, source).await?;
            let cipher = self.factory.create_encryption_strategy(key.expose_secret())?;
            share.secret = cipher.encrypt(&share.secret)?;
        }

        self.shares.create(cancel, share.clone()).await?;
        debug!(project_id, share_id = %share.id, entropy = ?share.entropy, "share created");
        Ok(share)
    }

    pub async fn get_share_by_user(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        user_id: &str,
        key_source: Option<&KeySource>,
    ) -> CustodyResult<Share> {
        let share = self.shares.get_by_user_id(cancel, project_id, user_id).await?;
        self.reveal(cancel, project_id, share, key_source).await
    }

    pub async fn get_share_by_reference(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        passkey_id: &str,
        key_source: Option<&KeySource>,
    ) -> CustodyResult<Share> {
        let share = self.shares.get_by_reference(cancel, project_id, passkey_id).await?;
        self.reveal(cancel, project_id, share, key_source).await
    }

    /// Decrypt a `Project`-entropy secret; other entropies pass through.
    async fn reveal(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        mut share: Share,
        key_source: Option<&KeySource>,
    ) -> CustodyResult<Share> {
        if share.entropy != Entropy::Project {
            return Ok(share);
        }
        let source = key_source.ok_or(CustodyError::ProjectPartRequired)?;
        let key = self.build_key(cancel, project_id, source).await?;
        let cipher = self.factory.create_encryption_strategy(key.expose_secret())?;
        share.secret = cipher.decrypt(&share.secret)?;
        Ok(share)
    }

    async fn build_key(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        source: &KeySource,
    ) -> CustodyResult<SecretString> {
        let migrated = self.factory.resolve_project_migrated(cancel, project_id).await?;
        let mut builder = self
            .factory
            .create_encryption_key_builder(source.kind(), migrated, self.otp_required);
        builder.set_project_part(source.value()).await?;
        builder.set_database_part(cancel, project_id).await?;
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sharekeep_core::{EncryptionParameters, PasskeyReference, Project};
    use sharekeep_crypto::CryptoError;

    async fn service_with_project() -> (CustodyService, String) {
        let service = CustodyService::in_memory(&SharekeepConfig::default());
        let project = Project::new("acme", "ak_1", "as_1");
        let id = project.id.clone();
        service
            .projects()
            .create(&CancellationToken::new(), project)
            .await
            .unwrap();
        (service, id)
    }

    #[tokio::test]
    async fn test_register_key_once() {
        let cancel = CancellationToken::new();
        let (service, id) = service_with_project().await;

        let part = service.register_encryption_key(&cancel, &id).await.unwrap();
        assert!(!part.is_empty());
        assert!(service.projects().has_successful_migration(&cancel, &id).await.unwrap());
        assert!(matches!(
            service.register_encryption_key(&cancel, &id).await,
            Err(CustodyError::EncryptionPartAlreadyExists)
        ));
    }

    #[tokio::test]
    async fn test_register_key_unknown_project() {
        let (service, _) = service_with_project().await;
        assert!(matches!(
            service
                .register_encryption_key(&CancellationToken::new(), "pro_missing")
                .await,
            Err(CustodyError::ProjectNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_project_share_round_trip() {
        let cancel = CancellationToken::new();
        let (service, id) = service_with_project().await;
        let part = service.register_encryption_key(&cancel, &id).await.unwrap();
        let source = KeySource::Plain(part);

        let stored = service
            .create_share(
                &cancel,
                &id,
                Share::new(&id, "hello", Entropy::Project).with_user("usr_1"),
                Some(&source),
            )
            .await
            .unwrap();
        assert_ne!(stored.secret, "hello");

        let fetched = service
            .get_share_by_user(&cancel, &id, "usr_1", Some(&source))
            .await
            .unwrap();
        assert_eq!(fetched.secret, "hello");
    }

    #[tokio::test]
    async fn test_project_share_needs_key_source() {
        let cancel = CancellationToken::new();
        let (service, id) = service_with_project().await;
        service.register_encryption_key(&cancel, &id).await.unwrap();

        assert!(matches!(
            service
                .create_share(&cancel, &id, Share::new(&id, "hello", Entropy::Project), None)
                .await,
            Err(CustodyError::ProjectPartRequired)
        ));
    }

    #[tokio::test]
    async fn test_wrong_project_part_fails_at_decrypt() {
        let cancel = CancellationToken::new();
        let (service, id) = service_with_project().await;
        let part = service.register_encryption_key(&cancel, &id).await.unwrap();
        service
            .create_share(
                &cancel,
                &id,
                Share::new(&id, "hello", Entropy::Project).with_user("usr_1"),
                Some(&KeySource::Plain(part)),
            )
            .await
            .unwrap();

        // a part from another registration is well formed but rebuilds another key
        let (other, other_id) = service_with_project().await;
        let foreign = other.register_encryption_key(&cancel, &other_id).await.unwrap();
        let result = service
            .get_share_by_user(&cancel, &id, "usr_1", Some(&KeySource::Plain(foreign)))
            .await;
        assert!(matches!(
            result,
            Err(CustodyError::Crypto(CryptoError::DecryptionFailed))
        ));
    }

    #[tokio::test]
    async fn test_client_encrypted_shares_pass_through() {
        let cancel = CancellationToken::new();
        let (service, id) = service_with_project().await;

        let user_share = Share::new(&id, "client-blob", Entropy::User)
            .with_user("usr_1")
            .with_encryption_parameters(EncryptionParameters {
                salt: "c2FsdA==".into(),
                iterations: 1000,
                length: 256,
                digest: "SHA-256".into(),
            });
        service.create_share(&cancel, &id, user_share, None).await.unwrap();
        assert_eq!(
            service
                .get_share_by_user(&cancel, &id, "usr_1", None)
                .await
                .unwrap()
                .secret,
            "client-blob"
        );

        let passkey_share =
            Share::new(&id, "pk-blob", Entropy::Passkey).with_passkey_reference(PasskeyReference {
                passkey_id: "pk_1".into(),
                passkey_env: None,
            });
        service.create_share(&cancel, &id, passkey_share, None).await.unwrap();
        assert_eq!(
            service
                .get_share_by_reference(&cancel, &id, "pk_1", None)
                .await
                .unwrap()
                .secret,
            "pk-blob"
        );
    }

    #[tokio::test]
    async fn test_invalid_share_rejected_before_storage() {
        let cancel = CancellationToken::new();
        let (service, id) = service_with_project().await;
        assert!(matches!(
            service
                .create_share(&cancel, &id, Share::new(&id, "blob", Entropy::User), None)
                .await,
            Err(CustodyError::MissingEncryptionParameters)
        ));
    }

    #[tokio::test]
    async fn test_empty_session_part_rejected() {
        let (service, _) = service_with_project().await;
        assert!(matches!(
            service.register_encryption_session("").await,
            Err(CustodyError::ProjectPartRequired)
        ));
    }

    #[tokio::test]
    async fn test_migrating_sss_project_is_a_no_op() {
        let cancel = CancellationToken::new();
        let (service, id) = service_with_project().await;
        let part = service.register_encryption_key(&cancel, &id).await.unwrap();
        assert_eq!(
            service.encrypt_project_shares(&cancel, &id, &part).await.unwrap(),
            MigrationOutcome::AlreadyMigrated
        );
    }
}
