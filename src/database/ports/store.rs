//! Resource store port for database resources.

use crate::database::domain::{DatabaseDomainError, DatabaseResource, ResourceKey};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for resource store operations.
pub type ResourceStoreResult<T> = Result<T, ResourceStoreError>;

/// Access to database resources and their status subresource.
///
/// Writes are guarded by the resource version: a write carrying a stale
/// version fails with [`ResourceStoreError::Conflict`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DatabaseResourceStore: Send + Sync {
    /// Fetches a resource.
    ///
    /// Returns `None` when the resource does not exist.
    async fn get(&self, key: &ResourceKey) -> ResourceStoreResult<Option<DatabaseResource>>;

    /// Lists every resource.
    async fn list(&self) -> ResourceStoreResult<Vec<DatabaseResource>>;

    /// Persists metadata changes (delete-guards) and returns the stored
    /// resource with its new version.
    ///
    /// The stored spec and status are kept. A resource whose deletion was
    /// requested is removed once its last delete-guard is gone.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceStoreError::NotFound`] or
    /// [`ResourceStoreError::Conflict`].
    async fn update(&self, resource: &DatabaseResource) -> ResourceStoreResult<DatabaseResource>;

    /// Persists the status subresource and returns the stored resource with
    /// its new version.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceStoreError::NotFound`] or
    /// [`ResourceStoreError::Conflict`].
    async fn update_status(
        &self,
        resource: &DatabaseResource,
    ) -> ResourceStoreResult<DatabaseResource>;
}

/// Errors returned by resource store implementations.
#[derive(Debug, Clone, Error)]
pub enum ResourceStoreError {
    /// The resource does not exist.
    #[error("resource not found: {0}")]
    NotFound(ResourceKey),

    /// The write carried a stale resource version.
    #[error("resource {key} was modified concurrently (expected version {expected}, found {actual})")]
    Conflict {
        /// Resource key.
        key: ResourceKey,
        /// Version carried by the write.
        expected: u64,
        /// Version currently stored.
        actual: u64,
    },

    /// The store refused the write as invalid.
    #[error(transparent)]
    Rejected(#[from] DatabaseDomainError),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl ResourceStoreError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
