//! Project key builders.
//!
//! A builder collects the two halves of a project key (the tenant's project
//! part and the stored part from the project repository) and rebuilds the
//! key with the strategy the facade chose for the project. Builders are
//! single-use and built fresh for every request.

use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use sharekeep_core::{CustodyError, CustodyResult, ProjectRepository};
use sharekeep_crypto::ReconstructionStrategy;

use crate::keypart::KeyPartStore;

/// How the tenant supplies its project part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderKind {
    /// The part itself travels with the request
    Plain,
    /// The request carries a session id registered earlier
    Session,
}

/// State shared by both builders.
struct KeyAssembly {
    projects: Arc<dyn ProjectRepository>,
    strategy: ReconstructionStrategy,
    project_part: Option<SecretString>,
    database_part: Option<SecretString>,
}

impl KeyAssembly {
    fn new(projects: Arc<dyn ProjectRepository>, strategy: ReconstructionStrategy) -> Self {
        Self {
            projects,
            strategy,
            project_part: None,
            database_part: None,
        }
    }

    async fn set_database_part(
        &mut self,
        cancel: &CancellationToken,
        project_id: &str,
    ) -> CustodyResult<()> {
        let part = self.projects.get_encryption_part(cancel, project_id).await?;
        self.database_part = Some(SecretString::from(part));
        Ok(())
    }

    fn build(&self) -> CustodyResult<SecretString> {
        let project_part = self
            .project_part
            .as_ref()
            .ok_or(CustodyError::ProjectPartRequired)?;
        let database_part = self
            .database_part
            .as_ref()
            .ok_or(CustodyError::DatabasePartRequired)?;

        let key = self
            .strategy
            .reconstruct(database_part.expose_secret(), project_part.expose_secret())?;
        Ok(SecretString::from(key))
    }
}

/// Builder for requests that carry the project part directly.
pub struct PlainBuilder {
    assembly: KeyAssembly,
}

impl PlainBuilder {
    pub fn new(projects: Arc<dyn ProjectRepository>, strategy: ReconstructionStrategy) -> Self {
        Self {
            assembly: KeyAssembly::new(projects, strategy),
        }
    }

    /// The caller already holds its part; it is kept verbatim.
    pub fn set_project_part(&mut self, part: &str) {
        self.assembly.project_part = Some(SecretString::from(part.to_string()));
    }

    pub async fn set_database_part(
        &mut self,
        cancel: &CancellationToken,
        project_id: &str,
    ) -> CustodyResult<()> {
        self.assembly.set_database_part(cancel, project_id).await
    }

    pub fn build(&self) -> CustodyResult<SecretString> {
        self.assembly.build()
    }
}

/// Builder for requests that redeem a previously registered session.
pub struct SessionBuilder {
    assembly: KeyAssembly,
    key_parts: Arc<dyn KeyPartStore>,
    otp_required: bool,
}

impl SessionBuilder {
    pub fn new(
        projects: Arc<dyn ProjectRepository>,
        key_parts: Arc<dyn KeyPartStore>,
        strategy: ReconstructionStrategy,
        otp_required: bool,
    ) -> Self {
        Self {
            assembly: KeyAssembly::new(projects, strategy),
            key_parts,
            otp_required,
        }
    }

    /// Redeem `session_id`. The stored part is consumed, so a session works once.
    pub async fn set_project_part(&mut self, session_id: &str) -> CustodyResult<()> {
        let part = self.key_parts.take(session_id).await.map_err(|e| match e {
            CustodyError::KeyPartNotFound => CustodyError::InvalidEncryptionSession,
            other => other,
        })?;
        self.assembly.project_part = Some(SecretString::from(part));
        Ok(())
    }

    pub async fn set_database_part(
        &mut self,
        cancel: &CancellationToken,
        project_id: &str,
    ) -> CustodyResult<()> {
        self.assembly.set_database_part(cancel, project_id).await
    }

    pub fn build(&self) -> CustodyResult<SecretString> {
        self.assembly.build()
    }
}

/// Either builder, as handed out by the facade.
pub enum KeyBuilder {
    Plain(PlainBuilder),
    Session(SessionBuilder),
}

impl KeyBuilder {
    pub fn kind(&self) -> BuilderKind {
        match self {
            Self::Plain(_) => BuilderKind::Plain,
            Self::Session(_) => BuilderKind::Session,
        }
    }

    pub fn strategy(&self) -> ReconstructionStrategy {
        match self {
            Self::Plain(b) => b.assembly.strategy,
            Self::Session(b) => b.assembly.strategy,
        }
    }

    /// Whether the session flow is gated behind an OTP check done upstream.
    pub fn otp_required(&self) -> bool {
        match self {
            Self::Plain(_) => false,
            Self::Session(b) => b.otp_required,
        }
    }

    /// `id` is the project part for a plain builder, a session id otherwise.
    pub async fn set_project_part(&mut self, id: &str) -> CustodyResult<()> {
        match self {
            Self::Plain(b) => {
                b.set_project_part(id);
                Ok(())
            }
            Self::Session(b) => b.set_project_part(id).await,
        }
    }

    pub async fn set_database_part(
        &mut self,
        cancel: &CancellationToken,
        project_id: &str,
    ) -> CustodyResult<()> {
        match self {
            Self::Plain(b) => b.set_database_part(cancel, project_id).await,
            Self::Session(b) => b.set_database_part(cancel, project_id).await,
        }
    }

    pub fn build(&self) -> CustodyResult<SecretString> {
        match self {
            Self::Plain(b) => b.build(),
            Self::Session(b) => b.build(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypart::MemoryKeyPartStore;
    use crate::memory::MemoryProjectRepository;
    use sharekeep_core::config::KeyPartConfig;
    use sharekeep_core::Project;
    use sharekeep_crypto::{generate_key, CryptoError, SplitKey};

    async fn project_with_key(
        strategy: ReconstructionStrategy,
    ) -> (Arc<MemoryProjectRepository>, String, String, SplitKey) {
        let cancel = CancellationToken::new();
        let projects = Arc::new(MemoryProjectRepository::new());
        let project = Project::new("acme", "ak_1", "as_1");
        let project_id = project.id.clone();
        projects.create(&cancel, project).await.unwrap();

        let key = generate_key();
        let parts = strategy.split(&key).unwrap();
        projects
            .set_encryption_part(&cancel, &project_id, &parts.stored_part)
            .await
            .unwrap();
        (projects, project_id, key, parts)
    }

    #[tokio::test]
    async fn test_plain_builder_rebuilds_key() {
        let cancel = CancellationToken::new();
        let (projects, project_id, key, parts) =
            project_with_key(ReconstructionStrategy::Sss).await;

        let mut builder = PlainBuilder::new(projects, ReconstructionStrategy::Sss);
        builder.set_project_part(&parts.project_part);
        builder.set_database_part(&cancel, &project_id).await.unwrap();

        assert_eq!(builder.build().unwrap().expose_secret(), key);
    }

    #[tokio::test]
    async fn test_missing_parts_reported() {
        let cancel = CancellationToken::new();
        let (projects, project_id, _, parts) = project_with_key(ReconstructionStrategy::Sss).await;

        let mut builder = PlainBuilder::new(projects.clone(), ReconstructionStrategy::Sss);
        assert!(matches!(builder.build(), Err(CustodyError::ProjectPartRequired)));

        builder.set_project_part(&parts.project_part);
        assert!(matches!(builder.build(), Err(CustodyError::DatabasePartRequired)));

        let mut builder = PlainBuilder::new(projects, ReconstructionStrategy::Sss);
        builder.set_database_part(&cancel, &project_id).await.unwrap();
        assert!(matches!(builder.build(), Err(CustodyError::ProjectPartRequired)));
    }

    #[tokio::test]
    async fn test_database_part_not_registered() {
        let cancel = CancellationToken::new();
        let projects = Arc::new(MemoryProjectRepository::new());
        let project = Project::new("acme", "ak_1", "as_1");
        let project_id = project.id.clone();
        projects.create(&cancel, project).await.unwrap();

        let mut builder = PlainBuilder::new(projects, ReconstructionStrategy::Sss);
        assert!(matches!(
            builder.set_database_part(&cancel, &project_id).await,
            Err(CustodyError::EncryptionPartNotFound)
        ));
    }

    #[tokio::test]
    async fn test_session_builder_is_single_use() {
        let cancel = CancellationToken::new();
        let (projects, project_id, key, parts) =
            project_with_key(ReconstructionStrategy::Sss).await;
        let key_parts: Arc<dyn KeyPartStore> =
            Arc::new(MemoryKeyPartStore::new(&KeyPartConfig::default()));
        key_parts.set("sess-1", &parts.project_part).await.unwrap();

        let mut first = SessionBuilder::new(
            projects.clone(),
            key_parts.clone(),
            ReconstructionStrategy::Sss,
            false,
        );
        first.set_project_part("sess-1").await.unwrap();
        first.set_database_part(&cancel, &project_id).await.unwrap();
        assert_eq!(first.build().unwrap().expose_secret(), key);

        let mut second =
            SessionBuilder::new(projects, key_parts, ReconstructionStrategy::Sss, false);
        assert!(matches!(
            second.set_project_part("sess-1").await,
            Err(CustodyError::InvalidEncryptionSession)
        ));
    }

    #[tokio::test]
    async fn test_wrong_strategy_does_not_rebuild_key() {
        let cancel = CancellationToken::new();
        let (projects, project_id, key, parts) =
            project_with_key(ReconstructionStrategy::Sss).await;

        // Versioned parts are 33 bytes; the XOR scheme refuses them outright
        let mut builder = PlainBuilder::new(projects, ReconstructionStrategy::Legacy);
        builder.set_project_part(&parts.project_part);
        builder.set_database_part(&cancel, &project_id).await.unwrap();
        match builder.build() {
            Err(CustodyError::Crypto(CryptoError::InvalidEncryptionPart(_))) => {}
            Ok(rebuilt) => assert_ne!(rebuilt.expose_secret(), key),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_key_builder_dispatch() {
        let cancel = CancellationToken::new();
        let (projects, project_id, key, parts) =
            project_with_key(ReconstructionStrategy::Legacy).await;

        let mut builder =
            KeyBuilder::Plain(PlainBuilder::new(projects, ReconstructionStrategy::Legacy));
        assert_eq!(builder.kind(), BuilderKind::Plain);
        assert_eq!(builder.strategy(), ReconstructionStrategy::Legacy);
        assert!(!builder.otp_required());

        builder.set_project_part(&parts.project_part).await.unwrap();
        builder.set_database_part(&cancel, &project_id).await.unwrap();
        assert_eq!(builder.build().unwrap().expose_secret(), key);
    }
}
