//! Persistence seams consumed by the custody subsystem.
//!
//! Implementations may block on external storage. Every call carries the
//! caller's cancellation token; implementations decide how to honour it and
//! report a cancelled call as [`CustodyError::Cancelled`](crate::CustodyError::Cancelled).

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::CustodyResult;
use crate::types::{Entropy, MigrationRecord, Project, Share};

#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn create(&self, cancel: &CancellationToken, project: Project) -> CustodyResult<()>;

    /// `ProjectNotFound` when absent.
    async fn get(&self, cancel: &CancellationToken, project_id: &str) -> CustodyResult<Project>;

    async fn get_by_api_key(
        &self,
        cancel: &CancellationToken,
        api_key: &str,
    ) -> CustodyResult<Project>;

    /// The project's stored key part, `EncryptionPartNotFound` when none is registered.
    async fn get_encryption_part(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
    ) -> CustodyResult<String>;

    /// Persist the stored key part, `EncryptionPartAlreadyExists` when one is registered.
    async fn set_encryption_part(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        part: &str,
    ) -> CustodyResult<()>;

    async fn has_successful_migration(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
    ) -> CustodyResult<bool>;

    /// Append one ledger row.
    async fn create_migration(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        success: bool,
    ) -> CustodyResult<()>;

    async fn list_migrations(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
    ) -> CustodyResult<Vec<MigrationRecord>>;
}

#[async_trait]
pub trait ShareRepository: Send + Sync {
    /// `ShareAlreadyExists` on a duplicate id.
    async fn create(&self, cancel: &CancellationToken, share: Share) -> CustodyResult<()>;

    /// `ShareNotFound` when the id is unknown.
    async fn update(&self, cancel: &CancellationToken, share: Share) -> CustodyResult<()>;

    async fn get_by_user_id(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        user_id: &str,
    ) -> CustodyResult<Share>;

    async fn get_by_reference(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        passkey_id: &str,
    ) -> CustodyResult<Share>;

    async fn list_by_project_and_entropy(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        entropy: Entropy,
    ) -> CustodyResult<Vec<Share>>;

    /// Replace every given share in one write; either all are stored or none.
    async fn bulk_update(
        &self,
        cancel: &CancellationToken,
        shares: Vec<Share>,
    ) -> CustodyResult<()>;
}
