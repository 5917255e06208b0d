//! Key-custody facade: picks builders, strategies and ciphers per project.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use sharekeep_core::{CustodyResult, ProjectRepository};
use sharekeep_crypto::{Cipher, ReconstructionStrategy};

use crate::builder::{BuilderKind, KeyBuilder, PlainBuilder, SessionBuilder};
use crate::keypart::KeyPartStore;

#[derive(Clone)]
pub struct KeyCustodyFactory {
    projects: Arc<dyn ProjectRepository>,
    key_parts: Arc<dyn KeyPartStore>,
}

impl KeyCustodyFactory {
    pub fn new(projects: Arc<dyn ProjectRepository>, key_parts: Arc<dyn KeyPartStore>) -> Self {
        Self { projects, key_parts }
    }

    /// A fresh builder of `kind`, reconstructing with the scheme matching
    /// the project's migration state.
    pub fn create_encryption_key_builder(
        &self,
        kind: BuilderKind,
        project_migrated: bool,
        otp_required: bool,
    ) -> KeyBuilder {
        let strategy = self.create_reconstruction_strategy(project_migrated);
        debug!(?kind, strategy = strategy.name(), otp_required, "key builder created");
        match kind {
            BuilderKind::Plain => {
                KeyBuilder::Plain(PlainBuilder::new(self.projects.clone(), strategy))
            }
            BuilderKind::Session => KeyBuilder::Session(SessionBuilder::new(
                self.projects.clone(),
                self.key_parts.clone(),
                strategy,
                otp_required,
            )),
        }
    }

    pub fn create_reconstruction_strategy(&self, project_migrated: bool) -> ReconstructionStrategy {
        if project_migrated {
            ReconstructionStrategy::Sss
        } else {
            ReconstructionStrategy::Legacy
        }
    }

    pub fn create_encryption_strategy(&self, key: &str) -> CustodyResult<Cipher> {
        Ok(Cipher::new(key)?)
    }

    /// Migration state as recorded in the project's ledger.
    pub async fn resolve_project_migrated(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
    ) -> CustodyResult<bool> {
        self.projects.has_successful_migration(cancel, project_id).await
    }
}
