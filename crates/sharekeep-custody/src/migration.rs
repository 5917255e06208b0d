//! Legacy-to-SSS migration of project-entropy shares.
//!
//! A project's shares are re-encrypted from the key its legacy XOR parts
//! yield to the key the same parts yield under the SSS scheme. The job is
//! idempotent: the ledger decides whether anything is left to do, and all
//! shares are written in one bulk update so a failed run leaves no partial
//! state behind.

use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use sharekeep_core::{
    CustodyError, CustodyResult, Entropy, ProjectRepository, Share, ShareRepository,
};
use sharekeep_crypto::Cipher;

use crate::factory::KeyCustodyFactory;

/// Holds a runner's lock until dropped.
pub struct ExclusiveGuard {
    _inner: Box<dyn Any + Send + Sync>,
}

impl ExclusiveGuard {
    pub fn new<T: Send + Sync + 'static>(inner: T) -> Self {
        Self {
            _inner: Box::new(inner),
        }
    }
}

/// Mutual exclusion for migration runs. A distributed lock plugs in here.
#[async_trait]
pub trait ExclusiveRunner: Send + Sync {
    async fn acquire(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
    ) -> CustodyResult<ExclusiveGuard>;
}

/// One process-local lock shared by every project.
#[derive(Clone, Default)]
pub struct LocalExclusive {
    lock: Arc<Mutex<()>>,
}

impl LocalExclusive {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExclusiveRunner for LocalExclusive {
    async fn acquire(
        &self,
        cancel: &CancellationToken,
        _project_id: &str,
    ) -> CustodyResult<ExclusiveGuard> {
        tokio::select! {
            _ = cancel.cancelled() => Err(CustodyError::Cancelled),
            guard = self.lock.clone().lock_owned() => Ok(ExclusiveGuard::new(guard)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The ledger already holds a successful run; nothing was touched
    AlreadyMigrated,
    /// `shares` project-entropy shares were re-encrypted
    Migrated { shares: usize },
}

pub struct MigrationJob {
    projects: Arc<dyn ProjectRepository>,
    shares: Arc<dyn ShareRepository>,
    factory: KeyCustodyFactory,
    runner: Arc<dyn ExclusiveRunner>,
}

impl MigrationJob {
    pub fn new(
        projects: Arc<dyn ProjectRepository>,
        shares: Arc<dyn ShareRepository>,
        factory: KeyCustodyFactory,
        runner: Arc<dyn ExclusiveRunner>,
    ) -> Self {
        Self {
            projects,
            shares,
            factory,
            runner,
        }
    }

    /// Move `project_id`'s shares from `old_key` to the SSS key of
    /// (`stored_part`, `project_part`).
    ///
    /// The runner's guard is held for the whole call. A failure before the
    /// bulk update commits appends a failed ledger row and returns the
    /// original error; a failure to append the success row after the commit
    /// is reported as [`CustodyError::MigrationNotRecorded`].
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        old_key: &str,
        stored_part: &str,
        project_part: &str,
    ) -> CustodyResult<MigrationOutcome> {
        let _guard = self.runner.acquire(cancel, project_id).await?;

        if self.projects.has_successful_migration(cancel, project_id).await? {
            info!(project_id, "project already migrated, skipping");
            return Ok(MigrationOutcome::AlreadyMigrated);
        }

        let migrated = match self
            .reencrypt_all(cancel, project_id, old_key, stored_part, project_part)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                warn!(project_id, "migration failed: {e}");
                if let Err(ledger_err) =
                    self.projects.create_migration(cancel, project_id, false).await
                {
                    error!(project_id, "failed to record failed migration: {ledger_err}");
                }
                return Err(e);
            }
        };

        if let Err(e) = self.projects.create_migration(cancel, project_id, true).await {
            error!(
                project_id,
                shares = migrated,
                "shares re-encrypted but migration was not recorded: {e}"
            );
            return Err(CustodyError::MigrationNotRecorded {
                project_id: project_id.to_string(),
                source: Box::new(e),
            });
        }

        info!(project_id, shares = migrated, "project migrated to sss");
        Ok(MigrationOutcome::Migrated { shares: migrated })
    }

    async fn reencrypt_all(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        old_key: &str,
        stored_part: &str,
        project_part: &str,
    ) -> CustodyResult<usize> {
        let new_key = Zeroizing::new(
            self.factory
                .create_reconstruction_strategy(true)
                .reconstruct(stored_part, project_part)?,
        );
        let old_cipher = self.factory.create_encryption_strategy(old_key)?;
        let new_cipher = self.factory.create_encryption_strategy(&new_key)?;

        let shares = self
            .shares
            .list_by_project_and_entropy(cancel, project_id, Entropy::Project)
            .await?;
        debug!(project_id, shares = shares.len(), "re-encrypting project shares");

        let rewritten = shares
            .into_iter()
            .map(|share| reencrypt(share, &old_cipher, &new_cipher))
            .collect::<CustodyResult<Vec<_>>>()?;

        let count = rewritten.len();
        if count > 0 {
            self.shares.bulk_update(cancel, rewritten).await?;
        }
        Ok(count)
    }
}

fn reencrypt(mut share: Share, old: &Cipher, new: &Cipher) -> CustodyResult<Share> {
    let plaintext = Zeroizing::new(old.decrypt(&share.secret).inspect_err(|_| {
        debug!(share_id = %share.id, "share does not decrypt under the legacy key");
    })?);
    share.secret = new.encrypt(&plaintext)?;
    Ok(share)
}
