//! Managed-instance lookup port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Result type for instance lookups.
pub type InstanceResult<T> = Result<T, InstanceError>;

/// Namespaced reference to a secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRef {
    /// Secret namespace.
    pub namespace: String,
    /// Secret name.
    pub name: String,
}

/// Readiness and connection details of a managed instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedInstance {
    /// Reported state, for example `Ready`.
    pub state: String,
    /// Externally reachable primary endpoint, if published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_endpoint: Option<String>,
    /// Secret holding the instance administrator login.
    pub login_ref: SecretRef,
}

impl ManagedInstance {
    /// Returns whether the instance accepts connections.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state.eq_ignore_ascii_case("ready")
    }
}

/// Directory of managed instances.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InstanceDirectory: Send + Sync {
    /// Looks up the instance `namespace/name`.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceError::NotFound`] when the instance does not exist.
    async fn lookup(&self, namespace: &str, name: &str) -> InstanceResult<ManagedInstance>;
}

/// Errors returned by instance directories.
#[derive(Debug, Clone, Error)]
pub enum InstanceError {
    /// The instance does not exist.
    #[error("managed instance {namespace}/{name} not found")]
    NotFound {
        /// Instance namespace.
        namespace: String,
        /// Instance name.
        name: String,
    },

    /// Directory backend failure.
    #[error("instance directory error: {0}")]
    Backend(Arc<dyn std::error::Error + Send + Sync>),
}

impl InstanceError {
    /// Wraps a backend error.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Arc::new(err))
    }
}
