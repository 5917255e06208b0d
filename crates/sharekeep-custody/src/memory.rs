//! In-memory repositories.
//!
//! Backing for tests, the CLI and single-process deployments. Each table sits
//! behind one `tokio::sync::RwLock`; a cancelled token is checked before the
//! lock is taken.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use sharekeep_core::{
    CustodyError, CustodyResult, Entropy, MigrationRecord, Project, ProjectRepository, Share,
    ShareRepository,
};

fn ensure_live(cancel: &CancellationToken) -> CustodyResult<()> {
    if cancel.is_cancelled() {
        return Err(CustodyError::Cancelled);
    }
    Ok(())
}

#[derive(Default)]
struct ProjectTables {
    projects: HashMap<String, Project>,
    /// project id -> ledger rows in append order
    migrations: HashMap<String, Vec<MigrationRecord>>,
}

#[derive(Default)]
pub struct MemoryProjectRepository {
    tables: RwLock<ProjectTables>,
}

impl MemoryProjectRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectRepository for MemoryProjectRepository {
    async fn create(&self, cancel: &CancellationToken, project: Project) -> CustodyResult<()> {
        ensure_live(cancel)?;
        let mut tables = self.tables.write().await;
        if tables.projects.contains_key(&project.id) {
            return Err(CustodyError::Repository(format!(
                "project already exists: {}",
                project.id
            )));
        }
        tables.projects.insert(project.id.clone(), project);
        Ok(())
    }

    async fn get(&self, cancel: &CancellationToken, project_id: &str) -> CustodyResult<Project> {
        ensure_live(cancel)?;
        self.tables
            .read()
            .await
            .projects
            .get(project_id)
            .cloned()
            .ok_or_else(|| CustodyError::ProjectNotFound(project_id.to_string()))
    }

    async fn get_by_api_key(
        &self,
        cancel: &CancellationToken,
        api_key: &str,
    ) -> CustodyResult<Project> {
        ensure_live(cancel)?;
        self.tables
            .read()
            .await
            .projects
            .values()
            .find(|p| p.api_key == api_key)
            .cloned()
            .ok_or_else(|| CustodyError::ProjectNotFound(format!("api key {api_key}")))
    }

    async fn get_encryption_part(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
    ) -> CustodyResult<String> {
        ensure_live(cancel)?;
        let tables = self.tables.read().await;
        let project = tables
            .projects
            .get(project_id)
            .ok_or_else(|| CustodyError::ProjectNotFound(project_id.to_string()))?;
        project
            .stored_part
            .clone()
            .filter(|part| !part.is_empty())
            .ok_or(CustodyError::EncryptionPartNotFound)
    }

    async fn set_encryption_part(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        part: &str,
    ) -> CustodyResult<()> {
        ensure_live(cancel)?;
        let mut tables = self.tables.write().await;
        let project = tables
            .projects
            .get_mut(project_id)
            .ok_or_else(|| CustodyError::ProjectNotFound(project_id.to_string()))?;
        if project.stored_part.is_some() {
            return Err(CustodyError::EncryptionPartAlreadyExists);
        }
        project.stored_part = Some(part.to_string());
        Ok(())
    }

    async fn has_successful_migration(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
    ) -> CustodyResult<bool> {
        ensure_live(cancel)?;
        Ok(self
            .tables
            .read()
            .await
            .migrations
            .get(project_id)
            .is_some_and(|rows| rows.iter().any(|r| r.success)))
    }

    async fn create_migration(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        success: bool,
    ) -> CustodyResult<()> {
        ensure_live(cancel)?;
        let mut tables = self.tables.write().await;
        if !tables.projects.contains_key(project_id) {
            return Err(CustodyError::ProjectNotFound(project_id.to_string()));
        }
        tables
            .migrations
            .entry(project_id.to_string())
            .or_default()
            .push(MigrationRecord::new(project_id, success));
        Ok(())
    }

    async fn list_migrations(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
    ) -> CustodyResult<Vec<MigrationRecord>> {
        ensure_live(cancel)?;
        Ok(self
            .tables
            .read()
            .await
            .migrations
            .get(project_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct MemoryShareRepository {
    shares: RwLock<HashMap<String, Share>>,
}

impl MemoryShareRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn find(&self, predicate: impl Fn(&Share) -> bool) -> CustodyResult<Share> {
        self.shares
            .read()
            .await
            .values()
            .find(|s| predicate(s))
            .cloned()
            .ok_or(CustodyError::ShareNotFound)
    }
}

#[async_trait]
impl ShareRepository for MemoryShareRepository {
    async fn create(&self, cancel: &CancellationToken, share: Share) -> CustodyResult<()> {
        ensure_live(cancel)?;
        let mut shares = self.shares.write().await;
        if shares.contains_key(&share.id) {
            return Err(CustodyError::ShareAlreadyExists(share.id));
        }
        shares.insert(share.id.clone(), share);
        Ok(())
    }

    async fn update(&self, cancel: &CancellationToken, share: Share) -> CustodyResult<()> {
        ensure_live(cancel)?;
        let mut shares = self.shares.write().await;
        match shares.get_mut(&share.id) {
            Some(existing) => {
                *existing = share;
                Ok(())
            }
            None => Err(CustodyError::ShareNotFound),
        }
    }

    async fn get_by_user_id(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        user_id: &str,
    ) -> CustodyResult<Share> {
        ensure_live(cancel)?;
        self.find(|s| s.project_id == project_id && s.user_id.as_deref() == Some(user_id))
            .await
    }

    async fn get_by_reference(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        passkey_id: &str,
    ) -> CustodyResult<Share> {
        ensure_live(cancel)?;
        self.find(|s| {
            s.project_id == project_id
                && s.passkey_reference
                    .as_ref()
                    .is_some_and(|r| r.passkey_id == passkey_id)
        })
        .await
    }

    async fn list_by_project_and_entropy(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        entropy: Entropy,
    ) -> CustodyResult<Vec<Share>> {
        ensure_live(cancel)?;
        let mut found: Vec<Share> = self
            .shares
            .read()
            .await
            .values()
            .filter(|s| s.project_id == project_id && s.entropy == entropy)
            .cloned()
            .collect();
        found.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(found)
    }

    async fn bulk_update(
        &self,
        cancel: &CancellationToken,
        updated: Vec<Share>,
    ) -> CustodyResult<()> {
        ensure_live(cancel)?;
        let mut shares = self.shares.write().await;
        if let Some(missing) = updated.iter().find(|s| !shares.contains_key(&s.id)) {
            return Err(CustodyError::Repository(format!(
                "bulk update references unknown share {}",
                missing.id
            )));
        }
        for share in updated {
            shares.insert(share.id.clone(), share);
        }
        Ok(())
    }
}
