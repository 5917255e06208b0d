//! Ephemeral session key-part store.
//!
//! A tenant registers its project part once and receives an opaque session
//! id; the session key builder redeems that id exactly once. Nothing here is
//! durable: a restart drops every pending session.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use sharekeep_core::config::KeyPartConfig;
use sharekeep_core::{CustodyError, CustodyResult};

#[async_trait]
pub trait KeyPartStore: Send + Sync {
    /// Register a part under `session_id`; `KeyPartAlreadyExists` if taken.
    async fn set(&self, session_id: &str, part: &str) -> CustodyResult<()>;

    /// Read a part without consuming it; `KeyPartNotFound` if absent, empty or expired.
    async fn get(&self, session_id: &str) -> CustodyResult<String>;

    async fn delete(&self, session_id: &str) -> CustodyResult<()>;

    /// Read and delete in one step. A second `take` of the same id fails.
    async fn take(&self, session_id: &str) -> CustodyResult<String>;
}

struct PendingPart {
    part: SecretString,
    registered_at: Instant,
}

/// In-process [`KeyPartStore`] guarded by a single mutex.
pub struct MemoryKeyPartStore {
    entries: Mutex<HashMap<String, PendingPart>>,
    /// `None` = entries never expire
    ttl: Option<Duration>,
    max_entries: usize,
}

impl MemoryKeyPartStore {
    pub fn new(config: &KeyPartConfig) -> Self {
        let ttl = (config.ttl_secs > 0).then(|| Duration::from_secs(config.ttl_secs));
        Self::with_limits(ttl, config.max_entries)
    }

    pub fn with_limits(ttl: Option<Duration>, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Number of pending (possibly expired, not yet purged) sessions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingPart>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("key-part store mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn is_expired(&self, pending: &PendingPart, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.duration_since(pending.registered_at) >= ttl)
    }

    fn purge_expired(&self, entries: &mut HashMap<String, PendingPart>, now: Instant) {
        if self.ttl.is_none() {
            return;
        }
        let before = entries.len();
        entries.retain(|_, pending| !self.is_expired(pending, now));
        let purged = before - entries.len();
        if purged > 0 {
            tracing::debug!(purged, "expired key parts purged");
        }
    }

    fn evict_oldest(entries: &mut HashMap<String, PendingPart>) {
        let oldest = entries
            .iter()
            .min_by_key(|(_, pending)| pending.registered_at)
            .map(|(id, _)| id.clone());
        if let Some(id) = oldest {
            entries.remove(&id);
            tracing::warn!("key-part store full, evicted oldest pending session");
        }
    }
}

#[async_trait]
impl KeyPartStore for MemoryKeyPartStore {
    async fn set(&self, session_id: &str, part: &str) -> CustodyResult<()> {
        let now = Instant::now();
        let mut entries = self.lock();
        self.purge_expired(&mut entries, now);

        if entries.contains_key(session_id) {
            return Err(CustodyError::KeyPartAlreadyExists);
        }
        while entries.len() >= self.max_entries {
            Self::evict_oldest(&mut entries);
        }

        entries.insert(
            session_id.to_string(),
            PendingPart {
                part: SecretString::from(part.to_string()),
                registered_at: now,
            },
        );
        Ok(())
    }

    async fn get(&self, session_id: &str) -> CustodyResult<String> {
        let now = Instant::now();
        let entries = self.lock();
        match entries.get(session_id) {
            Some(pending)
                if !self.is_expired(pending, now) && !pending.part.expose_secret().is_empty() =>
            {
                Ok(pending.part.expose_secret().to_string())
            }
            _ => Err(CustodyError::KeyPartNotFound),
        }
    }

    async fn delete(&self, session_id: &str) -> CustodyResult<()> {
        self.lock().remove(session_id);
        Ok(())
    }

    async fn take(&self, session_id: &str) -> CustodyResult<String> {
        let now = Instant::now();
        let mut entries = self.lock();
        let pending = entries
            .remove(session_id)
            .ok_or(CustodyError::KeyPartNotFound)?;

        if self.is_expired(&pending, now) || pending.part.expose_secret().is_empty() {
            return Err(CustodyError::KeyPartNotFound);
        }
        Ok(pending.part.expose_secret().to_string())
    }
}
