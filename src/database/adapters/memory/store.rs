//! In-memory resource store.
//!
//! Besides the port operations used by the reconciler, the store exposes the
//! author-side writes that a cluster API would accept: applying a spec and
//! requesting deletion. Spec updates are validated against the stored spec,
//! and removing a resource also removes the audit it owns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use super::InMemoryAuditScheduler;
use crate::database::{
    domain::{DatabaseResource, DesiredConfig, ResourceKey},
    ports::{DatabaseResourceStore, ResourceStoreError, ResourceStoreResult},
};

/// Thread-safe in-memory resource store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryResourceStore {
    state: Arc<RwLock<StoreState>>,
    owned_audits: Option<InMemoryAuditScheduler>,
}

#[derive(Debug, Default)]
struct StoreState {
    resources: BTreeMap<ResourceKey, DatabaseResource>,
    last_version: u64,
}

impl StoreState {
    const fn next_version(&mut self) -> u64 {
        self.last_version += 1;
        self.last_version
    }

    fn stored_for_write(
        &mut self,
        resource: &DatabaseResource,
    ) -> ResourceStoreResult<&mut DatabaseResource> {
        let key = resource.key();
        let stored = self
            .resources
            .get_mut(key)
            .ok_or_else(|| ResourceStoreError::NotFound(key.clone()))?;
        if stored.resource_version() != resource.resource_version() {
            return Err(ResourceStoreError::Conflict {
                key: key.clone(),
                expected: resource.resource_version(),
                actual: stored.resource_version(),
            });
        }
        Ok(stored)
    }
}

fn persistence_error(err: &impl std::fmt::Display) -> ResourceStoreError {
    ResourceStoreError::persistence(std::io::Error::other(err.to_string()))
}

impl InMemoryResourceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store that removes owned audits from `scheduler`
    /// when a resource is removed.
    #[must_use]
    pub fn with_owned_audits(scheduler: InMemoryAuditScheduler) -> Self {
        Self {
            state: Arc::default(),
            owned_audits: Some(scheduler),
        }
    }

    /// Creates the resource or replaces its spec.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceStoreError::Rejected`] when the update changes an
    /// immutable field.
    pub fn apply(
        &self,
        key: &ResourceKey,
        spec: DesiredConfig,
    ) -> ResourceStoreResult<DatabaseResource> {
        let mut state = self.state.write().map_err(|err| persistence_error(&err))?;
        let version = state.next_version();
        if let Some(stored) = state.resources.get_mut(key) {
            stored.spec().validate_update(&spec)?;
            stored.set_spec(spec);
            stored.set_resource_version(version);
            return Ok(stored.clone());
        }
        let mut resource = DatabaseResource::new(key.clone(), spec);
        resource.set_resource_version(version);
        state.resources.insert(key.clone(), resource.clone());
        Ok(resource)
    }

    /// Requests deletion of a resource.
    ///
    /// A resource without delete-guards is removed immediately; otherwise it
    /// stays until the last guard is removed. Requesting deletion of an
    /// absent resource is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceStoreError::Persistence`] if the store is
    /// unavailable.
    pub fn request_deletion(&self, key: &ResourceKey, at: DateTime<Utc>) -> ResourceStoreResult<()> {
        let removed = {
            let mut state = self.state.write().map_err(|err| persistence_error(&err))?;
            let version = state.next_version();
            let Some(stored) = state.resources.get_mut(key) else {
                return Ok(());
            };
            stored.mark_deletion_requested(at);
            stored.set_resource_version(version);
            if stored.delete_guards().is_empty() {
                state.resources.remove(key);
                true
            } else {
                false
            }
        };
        if removed {
            self.collect_owned(key)?;
        }
        Ok(())
    }

    /// Returns whether the resource exists.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceStoreError::Persistence`] if the store is
    /// unavailable.
    pub fn contains(&self, key: &ResourceKey) -> ResourceStoreResult<bool> {
        let state = self.state.read().map_err(|err| persistence_error(&err))?;
        Ok(state.resources.contains_key(key))
    }

    fn collect_owned(&self, owner: &ResourceKey) -> ResourceStoreResult<()> {
        if let Some(scheduler) = &self.owned_audits {
            scheduler
                .remove_owned(owner)
                .map_err(ResourceStoreError::persistence)?;
        }
        Ok(())
    }
}

#[async_trait]
impl DatabaseResourceStore for InMemoryResourceStore {
    async fn get(&self, key: &ResourceKey) -> ResourceStoreResult<Option<DatabaseResource>> {
        let state = self.state.read().map_err(|err| persistence_error(&err))?;
        Ok(state.resources.get(key).cloned())
    }

    async fn list(&self) -> ResourceStoreResult<Vec<DatabaseResource>> {
        let state = self.state.read().map_err(|err| persistence_error(&err))?;
        Ok(state.resources.values().cloned().collect())
    }

    async fn update(&self, resource: &DatabaseResource) -> ResourceStoreResult<DatabaseResource> {
        let (updated, removed) = {
            let mut state = self.state.write().map_err(|err| persistence_error(&err))?;
            let version = state.next_version();
            let stored = state.stored_for_write(resource)?;
            for guard in stored.delete_guards().to_vec() {
                if !resource.has_delete_guard(&guard) {
                    stored.remove_delete_guard(&guard);
                }
            }
            for guard in resource.delete_guards() {
                stored.add_delete_guard(guard);
            }
            stored.set_resource_version(version);
            let snapshot = stored.clone();
            let released = snapshot.is_deletion_requested() && snapshot.delete_guards().is_empty();
            if released {
                state.resources.remove(resource.key());
            }
            (snapshot, released)
        };
        if removed {
            self.collect_owned(resource.key())?;
        }
        Ok(updated)
    }

    async fn update_status(
        &self,
        resource: &DatabaseResource,
    ) -> ResourceStoreResult<DatabaseResource> {
        let mut state = self.state.write().map_err(|err| persistence_error(&err))?;
        let version = state.next_version();
        let stored = state.stored_for_write(resource)?;
        stored.set_status(resource.status().clone());
        stored.set_resource_version(version);
        Ok(stored.clone())
    }
}
