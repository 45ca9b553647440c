//! Scheduled-task port for the periodic drift audit.

use crate::database::domain::{ResourceKey, ScheduledAudit};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for audit scheduler operations.
pub type AuditSchedulerResult<T> = Result<T, AuditSchedulerError>;

/// Recurring-task primitive keyed by the owning resource.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuditScheduler: Send + Sync {
    /// Finds the audit owned by `owner`.
    async fn find(&self, owner: &ResourceKey) -> AuditSchedulerResult<Option<ScheduledAudit>>;

    /// Creates an audit.
    ///
    /// # Errors
    ///
    /// Returns [`AuditSchedulerError::AlreadyExists`] when the owner already
    /// has one.
    async fn create(&self, audit: &ScheduledAudit) -> AuditSchedulerResult<()>;

    /// Replaces the audit of the same owner.
    ///
    /// # Errors
    ///
    /// Returns [`AuditSchedulerError::NotFound`] when the owner has none.
    async fn update(&self, audit: &ScheduledAudit) -> AuditSchedulerResult<()>;
}

/// Errors returned by audit scheduler implementations.
#[derive(Debug, Clone, Error)]
pub enum AuditSchedulerError {
    /// An audit for the owner already exists.
    #[error("scheduled audit already exists for {0}")]
    AlreadyExists(ResourceKey),

    /// No audit exists for the owner.
    #[error("no scheduled audit for {0}")]
    NotFound(ResourceKey),

    /// Scheduler backend failure.
    #[error("scheduler backend error: {0}")]
    Backend(Arc<dyn std::error::Error + Send + Sync>),
}

impl AuditSchedulerError {
    /// Wraps a backend error.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Arc::new(err))
    }
}
