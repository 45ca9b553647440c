//! In-memory recurring-task store for scheduled audits.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::database::{
    domain::{ResourceKey, ScheduledAudit},
    ports::{AuditScheduler, AuditSchedulerError, AuditSchedulerResult},
};

/// Thread-safe in-memory audit scheduler.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditScheduler {
    audits: Arc<RwLock<BTreeMap<ResourceKey, ScheduledAudit>>>,
}

impl InMemoryAuditScheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes the audit owned by `owner`; returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns [`AuditSchedulerError::Backend`] if the lock is poisoned.
    pub fn remove_owned(&self, owner: &ResourceKey) -> AuditSchedulerResult<bool> {
        let mut audits = self
            .audits
            .write()
            .map_err(|err| AuditSchedulerError::backend(std::io::Error::other(err.to_string())))?;
        Ok(audits.remove(owner).is_some())
    }

    /// Returns every scheduled audit ordered by owner.
    ///
    /// # Errors
    ///
    /// Returns [`AuditSchedulerError::Backend`] if the lock is poisoned.
    pub fn all(&self) -> AuditSchedulerResult<Vec<ScheduledAudit>> {
        let audits = self
            .audits
            .read()
            .map_err(|err| AuditSchedulerError::backend(std::io::Error::other(err.to_string())))?;
        Ok(audits.values().cloned().collect())
    }
}

#[async_trait]
impl AuditScheduler for InMemoryAuditScheduler {
    async fn find(&self, owner: &ResourceKey) -> AuditSchedulerResult<Option<ScheduledAudit>> {
        let audits = self
            .audits
            .read()
            .map_err(|err| AuditSchedulerError::backend(std::io::Error::other(err.to_string())))?;
        Ok(audits.get(owner).cloned())
    }

    async fn create(&self, audit: &ScheduledAudit) -> AuditSchedulerResult<()> {
        let mut audits = self
            .audits
            .write()
            .map_err(|err| AuditSchedulerError::backend(std::io::Error::other(err.to_string())))?;
        if audits.contains_key(&audit.owner) {
            return Err(AuditSchedulerError::AlreadyExists(audit.owner.clone()));
        }
        audits.insert(audit.owner.clone(), audit.clone());
        Ok(())
    }

    async fn update(&self, audit: &ScheduledAudit) -> AuditSchedulerResult<()> {
        let mut audits = self
            .audits
            .write()
            .map_err(|err| AuditSchedulerError::backend(std::io::Error::other(err.to_string())))?;
        let Some(existing) = audits.get_mut(&audit.owner) else {
            return Err(AuditSchedulerError::NotFound(audit.owner.clone()));
        };
        existing.clone_from(audit);
        Ok(())
    }
}
