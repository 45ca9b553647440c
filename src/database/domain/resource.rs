//! Database resource envelope as held by the resource store.

use super::{DesiredConfig, ObservedStatus, ResourceKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Delete-guard placed on every managed resource until the database is
/// dropped.
pub const DATABASE_CLEANUP_GUARD: &str = "sqlmi-operator/database-cleanup";

/// Managed database resource: desired configuration plus observed status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseResource {
    key: ResourceKey,
    #[serde(default)]
    resource_version: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    delete_guards: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    deletion_requested_at: Option<DateTime<Utc>>,
    spec: DesiredConfig,
    #[serde(default)]
    status: ObservedStatus,
}

impl DatabaseResource {
    /// Creates a resource with pending status and no delete-guards.
    #[must_use]
    pub fn new(key: ResourceKey, spec: DesiredConfig) -> Self {
        Self {
            key,
            resource_version: 0,
            delete_guards: Vec::new(),
            deletion_requested_at: None,
            spec,
            status: ObservedStatus::default(),
        }
    }

    /// Returns the resource key.
    #[must_use]
    pub const fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// Returns the optimistic-concurrency version.
    #[must_use]
    pub const fn resource_version(&self) -> u64 {
        self.resource_version
    }

    /// Returns the desired configuration.
    #[must_use]
    pub const fn spec(&self) -> &DesiredConfig {
        &self.spec
    }

    /// Returns the observed status.
    #[must_use]
    pub const fn status(&self) -> &ObservedStatus {
        &self.status
    }

    /// Returns the observed status for mutation.
    pub const fn status_mut(&mut self) -> &mut ObservedStatus {
        &mut self.status
    }

    /// Replaces the observed status.
    pub fn set_status(&mut self, status: ObservedStatus) {
        self.status = status;
    }

    /// Replaces the desired configuration.
    pub fn set_spec(&mut self, spec: DesiredConfig) {
        self.spec = spec;
    }

    /// Sets the resource version; used by stores after a write.
    pub const fn set_resource_version(&mut self, version: u64) {
        self.resource_version = version;
    }

    /// Returns the delete-guards in insertion order.
    #[must_use]
    pub fn delete_guards(&self) -> &[String] {
        &self.delete_guards
    }

    /// Returns whether `guard` is present.
    #[must_use]
    pub fn has_delete_guard(&self, guard: &str) -> bool {
        self.delete_guards.iter().any(|current| current == guard)
    }

    /// Adds `guard`; returns whether it was absent.
    pub fn add_delete_guard(&mut self, guard: &str) -> bool {
        if self.has_delete_guard(guard) {
            return false;
        }
        self.delete_guards.push(guard.to_owned());
        true
    }

    /// Removes `guard`; returns whether it was present.
    pub fn remove_delete_guard(&mut self, guard: &str) -> bool {
        let before = self.delete_guards.len();
        self.delete_guards.retain(|current| current != guard);
        before != self.delete_guards.len()
    }

    /// Returns when deletion was requested, if it was.
    #[must_use]
    pub const fn deletion_requested_at(&self) -> Option<DateTime<Utc>> {
        self.deletion_requested_at
    }

    /// Returns whether deletion was requested.
    #[must_use]
    pub const fn is_deletion_requested(&self) -> bool {
        self.deletion_requested_at.is_some()
    }

    /// Marks the resource for deletion; an earlier request is kept.
    pub fn mark_deletion_requested(&mut self, at: DateTime<Utc>) {
        self.deletion_requested_at.get_or_insert(at);
    }
}
